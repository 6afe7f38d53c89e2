//! Tecla Engine - audio-core voice engine for the tecla firmware
//!
//! This crate is the half of tecla that runs inside the periodic audio-timer
//! interrupt on the second core: a fixed bank of oscillator + envelope voice
//! slots, mixed to one 8-bit duty-cycle value per tick.
//!
//! # Core Components
//!
//! ## Voice slots
//!
//! - [`Oscillator`] - 32-bit phase accumulator with closed-form waveforms
//! - [`Waveform`] - the fixed waveform set (sine, triangle, saw, square, pulse)
//! - [`Envelope`] / [`EnvelopeStage`] / [`EnvelopeTiming`] - tick-exact ADSR
//!
//! ## Cross-core hand-off
//!
//! - [`EngineShared`] - command cells, needs-free flags, and parameter cells
//! - [`VoiceCommand`] - StartAttack / StartRelease / Reset
//!
//! The control core never touches voice slots directly; it writes parameters
//! and a one-byte command per slot, and the audio core consumes each command
//! with a single atomic exchange at the top of its tick. See the concurrency
//! notes on [`EngineShared`].
//!
//! ## Output
//!
//! - [`Engine`] - applies commands, advances every slot, mixes, and writes
//! - [`AudioSink`] - the "set level" seam to the PWM peripheral(s)
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible. Disable the default `std` feature:
//!
//! ```toml
//! [dependencies]
//! tecla-engine = { version = "0.1", default-features = false }
//! ```
//!
//! # Example
//!
//! ```rust
//! use tecla_engine::{Engine, EngineShared, VoiceCommand, Waveform};
//!
//! // Control core side: pick a sound and start voice 0 at 440 Hz.
//! let shared: EngineShared<8> = EngineShared::new();
//! shared.set_waveform(Waveform::Saw);
//! shared.set_frequency(0, 440.0);
//! shared.send_command(0, VoiceCommand::StartAttack);
//!
//! // Audio core side: one interrupt tick.
//! let mut engine: Engine<8> = Engine::new(31_250.0);
//! let duty = engine.tick(&shared);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

mod engine;
mod envelope;
mod loudness;
mod oscillator;
mod shared;
mod sink;

pub use engine::Engine;
pub use envelope::{Envelope, EnvelopeStage, EnvelopeTiming, LEVEL_MAX};
pub use loudness::loudness_weight;
pub use oscillator::{Oscillator, Waveform};
pub use shared::{EngineShared, VoiceCommand};
pub use sink::{AudioSink, DualSink, NullSink};

#[cfg(feature = "std")]
pub use sink::BufferSink;
