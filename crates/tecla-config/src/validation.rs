//! Settings validation.
//!
//! The core never fails on a bad setting — a stuck controller is worse than
//! a clamped knob — so validation clamps everything clampable and reports
//! what it changed. Only non-finite numbers, which have no sensible clamp,
//! are hard errors.

use thiserror::Error;

use crate::settings::Settings;
use tecla_notes::ChannelRange;

/// A value that cannot be repaired by clamping.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A numeric field is NaN or infinite
    #[error("'{field}' is not a finite number")]
    NotFinite {
        /// The offending field, dotted path.
        field: &'static str,
    },
}

/// One clamp applied during validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    /// The adjusted field, dotted path.
    pub field: &'static str,
    /// Human-readable description of what happened.
    pub message: String,
}

/// Clamp every out-of-range setting in place.
///
/// Returns the list of adjustments made (empty when the settings were
/// already valid). Non-finite floats are returned as an error instead.
pub fn validate(settings: &mut Settings) -> Result<Vec<Adjustment>, ValidationError> {
    let mut adjustments = Vec::new();

    for (field, value) in [
        ("synth.attack_ms", settings.synth.attack_ms),
        ("synth.decay_ms", settings.synth.decay_ms),
        ("synth.sustain_percent", settings.synth.sustain_percent),
        ("synth.release_ms", settings.synth.release_ms),
        ("synth.pulse_width", settings.synth.pulse_width),
        ("tuning.step_cents", settings.tuning.step_cents),
        ("tuning.anchor_hz", settings.tuning.anchor_hz),
        ("arp.tempo_bpm", settings.arp.tempo_bpm),
    ] {
        if !value.is_finite() {
            return Err(ValidationError::NotFinite { field });
        }
    }

    let mut clamp_f32 = |field: &'static str, value: &mut f32, low: f32, high: f32| {
        let clamped = value.clamp(low, high);
        if clamped != *value {
            adjustments.push(Adjustment {
                field,
                message: format!("{value} clamped to {clamped}"),
            });
            *value = clamped;
        }
    };

    clamp_f32("synth.attack_ms", &mut settings.synth.attack_ms, 0.0, 10_000.0);
    clamp_f32("synth.decay_ms", &mut settings.synth.decay_ms, 0.0, 10_000.0);
    clamp_f32(
        "synth.sustain_percent",
        &mut settings.synth.sustain_percent,
        0.0,
        100.0,
    );
    clamp_f32(
        "synth.release_ms",
        &mut settings.synth.release_ms,
        0.0,
        10_000.0,
    );
    clamp_f32("synth.pulse_width", &mut settings.synth.pulse_width, 0.01, 0.99);
    clamp_f32("tuning.step_cents", &mut settings.tuning.step_cents, 1.0, 1200.0);
    clamp_f32("tuning.anchor_hz", &mut settings.tuning.anchor_hz, 8.0, 12_000.0);
    clamp_f32("arp.tempo_bpm", &mut settings.arp.tempo_bpm, 20.0, 400.0);

    if settings.synth.velocity > 127 {
        adjustments.push(Adjustment {
            field: "synth.velocity",
            message: format!("{} clamped to 127", settings.synth.velocity),
        });
        settings.synth.velocity = 127;
    }
    if settings.tuning.anchor_note > 127 {
        adjustments.push(Adjustment {
            field: "tuning.anchor_note",
            message: format!("{} clamped to 127", settings.tuning.anchor_note),
        });
        settings.tuning.anchor_note = 127;
    }
    if !(1..=96).contains(&settings.midi.pitch_bend_range) {
        let clamped = settings.midi.pitch_bend_range.clamp(1, 96);
        adjustments.push(Adjustment {
            field: "midi.pitch_bend_range",
            message: format!("{} clamped to {clamped}", settings.midi.pitch_bend_range),
        });
        settings.midi.pitch_bend_range = clamped;
    }
    if settings.arp.division == 0 {
        adjustments.push(Adjustment {
            field: "arp.division",
            message: "0 raised to 1".to_string(),
        });
        settings.arp.division = 1;
    }
    if !(-120..=120).contains(&settings.tuning.transpose) {
        let clamped = settings.tuning.transpose.clamp(-120, 120);
        adjustments.push(Adjustment {
            field: "tuning.transpose",
            message: format!("{} clamped to {clamped}", settings.tuning.transpose),
        });
        settings.tuning.transpose = clamped;
    }

    // A collapsed MPE range degrades to the minimal valid zone, never to an
    // error: the allocator needs at least one member channel to exist.
    let requested = ChannelRange {
        low: settings.midi.channel_low,
        high: settings.midi.channel_high,
    };
    let clamped = requested.clamped();
    if clamped.low != requested.low || clamped.high != requested.high {
        adjustments.push(Adjustment {
            field: "midi.channel_range",
            message: format!(
                "[{}, {}] clamped to [{}, {}]",
                requested.low, requested.high, clamped.low, clamped.high
            ),
        });
        settings.midi.channel_low = clamped.low;
        settings.midi.channel_high = clamped.high;
    }

    Ok(adjustments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_need_no_adjustment() {
        let mut settings = Settings::default();
        let adjustments = validate(&mut settings).unwrap();
        assert!(adjustments.is_empty(), "{adjustments:?}");
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let mut settings = Settings::default();
        settings.synth.velocity = 200;
        settings.synth.sustain_percent = 150.0;
        settings.midi.pitch_bend_range = 0;
        let adjustments = validate(&mut settings).unwrap();
        assert_eq!(settings.synth.velocity, 127);
        assert_eq!(settings.synth.sustain_percent, 100.0);
        assert_eq!(settings.midi.pitch_bend_range, 1);
        assert_eq!(adjustments.len(), 3);
    }

    #[test]
    fn collapsed_channel_range_becomes_minimal_zone() {
        let mut settings = Settings::default();
        settings.midi.channel_low = 12;
        settings.midi.channel_high = 3;
        let adjustments = validate(&mut settings).unwrap();
        assert_eq!(settings.midi.channel_low, 12);
        assert_eq!(settings.midi.channel_high, 12);
        assert!(adjustments.iter().any(|a| a.field == "midi.channel_range"));
    }

    #[test]
    fn channel_one_is_reserved_for_the_zone_master() {
        let mut settings = Settings::default();
        settings.midi.channel_low = 1;
        validate(&mut settings).unwrap();
        assert_eq!(settings.midi.channel_low, 2);
    }

    #[test]
    fn nan_is_a_hard_error() {
        let mut settings = Settings::default();
        settings.synth.attack_ms = f32::NAN;
        assert_eq!(
            validate(&mut settings),
            Err(ValidationError::NotFinite {
                field: "synth.attack_ms"
            })
        );
    }

    #[test]
    fn zero_division_is_raised_to_one() {
        let mut settings = Settings::default();
        settings.arp.division = 0;
        validate(&mut settings).unwrap();
        assert_eq!(settings.arp.division, 1);
    }
}
