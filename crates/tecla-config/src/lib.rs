//! Tecla Config - settings persistence for the tecla firmware core
//!
//! The settings store collaborator: a TOML-backed [`Settings`] model with
//! clamp-don't-fail validation and a flattening conversion into the plain
//! parameter struct the control core consumes.
//!
//! # Components
//!
//! - [`Settings`] - the file format (synth / midi / tuning / arp tables)
//! - [`validate`] - clamps out-of-range values in place, reports adjustments
//! - [`ConfigError`] - error taxonomy for I/O, parsing, and validation
//!
//! # Example
//!
//! ```rust
//! use tecla_config::{Settings, validate};
//!
//! let mut settings = Settings::from_toml(
//!     r#"
//!     [midi]
//!     mpe = true
//!     channel_low = 9
//!     channel_high = 4
//!     "#,
//! )
//! .unwrap();
//!
//! // The collapsed range is clamped, not rejected.
//! let adjustments = validate(&mut settings).unwrap();
//! assert_eq!(adjustments.len(), 1);
//! assert_eq!(settings.midi.channel_high, 9);
//!
//! let config = settings.dispatcher_config();
//! assert!(config.mpe_forced);
//! ```

mod error;
mod settings;
pub mod validation;

pub use error::ConfigError;
pub use settings::{
    ArpSettings, Discipline, MidiSettings, Mode, Settings, SynthSettings, TuningSettings,
    WaveformSetting,
};
pub use validation::{Adjustment, ValidationError, validate};
