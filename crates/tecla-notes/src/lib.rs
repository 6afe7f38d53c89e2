//! Tecla Notes - control-core note engine for the tecla firmware
//!
//! This crate is the half of tecla that runs in the main control loop: it
//! turns key-press edges into sounding notes on two outputs at once — the
//! external MIDI interface (via `tecla-midi`) and the internal synthesizer
//! (via `tecla-engine` command cells).
//!
//! # Core Components
//!
//! ## Allocation
//!
//! - [`VoiceAllocator`] - fixed voice pool with oldest-generation stealing
//! - [`ChannelAllocator`] - MPE member-channel pool with two disciplines
//! - [`BendPolicy`] - whether per-note pitch bend is needed, and why
//!
//! The two allocators fail differently on purpose: an exhausted voice pool
//! steals its oldest voice (audio continuity beats allocation fairness), an
//! exhausted channel pool drops the note (stealing would audibly retune a
//! note the external receiver is already sustaining).
//!
//! ## Dispatch
//!
//! - [`Dispatcher`] - the single entry point per key transition
//! - [`HeldStack`] - currently-held notes, newest on top
//! - [`Tuning`] / [`Layout`] - collaborator data for the pitch math
//! - [`just_correction`] - low-integer ratio search for just intonation
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible. Disable the default `std` feature.
//! The `tracing` feature gates the channel-starvation log line.
//!
//! # Example
//!
//! ```rust
//! use tecla_engine::EngineShared;
//! use tecla_midi::transport::BufferTransport;
//! use tecla_notes::{Dispatcher, DispatcherConfig, Layout};
//!
//! let shared: EngineShared<8> = EngineShared::new();
//! let mut midi = BufferTransport::new();
//! let mut dispatcher: Dispatcher<61, 8> = Dispatcher::new(Layout::linear(-12), 31_250.0);
//! dispatcher.apply_settings(DispatcherConfig::default(), &shared, &mut midi);
//!
//! dispatcher.key_pressed(12, &shared, &mut midi); // middle C
//! dispatcher.key_released(12, &shared, &mut midi);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

mod channels;
mod dispatcher;
mod held;
mod tuning;
mod voices;

pub use channels::{Assignment, BendPolicy, ChannelAllocator, ChannelRange, PoolDiscipline};
pub use dispatcher::{Dispatcher, DispatcherConfig, KeyRecord};
pub use held::HeldStack;
pub use tuning::{
    JUST_RATIOS, JustRatio, Layout, PitchData, RetuneMatch, Tuning, just_correction,
};
pub use voices::{MONO_SLOT, PlaybackMode, VoiceAllocator, VoiceOn};
