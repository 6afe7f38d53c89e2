//! Pitch and retune math.
//!
//! Converts a key's musical-step position into the triple the dispatcher
//! needs — MIDI note number, 14-bit pitch bend, floating-point frequency —
//! and, when just intonation is on, finds the low-integer frequency ratio
//! that best matches the interval against the reference note.
//!
//! The tuning and layout tables themselves are collaborator data: immutable
//! structs the caller selects by index and passes in.

use libm::{log2f, powf, roundf};
use tecla_midi::{BEND_MAX, BEND_MIN};

/// One tuning system: step size plus the anchor that pins step 0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tuning {
    /// Size of one musical step in cents (100.0 = twelve-tone equal).
    pub step_cents: f32,
    /// MIDI note number sounding at step 0.
    pub anchor_note: u8,
    /// Frequency of step 0 in Hz.
    pub anchor_hz: f32,
    /// Pitch-bend sensitivity in semitones, advertised per channel via RPN 0.
    pub bend_range: u8,
}

impl Default for Tuning {
    fn default() -> Self {
        // Twelve-tone equal, anchored at middle C, MPE-conventional ±48 range
        Self {
            step_cents: 100.0,
            anchor_note: 60,
            anchor_hz: 261.6256,
            bend_range: 48,
        }
    }
}

/// Computed pitch data for one key.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PitchData {
    /// Nearest MIDI note number.
    pub note: u8,
    /// Bend offset covering the residual between the note and the true pitch.
    pub bend: i16,
    /// True pitch in Hz.
    pub freq_hz: f32,
}

impl Tuning {
    /// True when every step lands on an exact equal-tempered semitone, so no
    /// per-note pitch bend is ever needed.
    pub fn is_semitone_multiple(&self) -> bool {
        let rem = self.step_cents % 100.0;
        rem.abs() < 1e-3 || (100.0 - rem.abs()) < 1e-3
    }

    /// Convert a semitone offset to 14-bit bend units under this tuning's
    /// bend range, clamped to the wire limits.
    pub fn bend_units(&self, semitones: f32) -> i16 {
        let range = f32::from(self.bend_range.max(1));
        let units = roundf(semitones / range * 8192.0) as i32;
        units.clamp(i32::from(BEND_MIN), i32::from(BEND_MAX)) as i16
    }

    /// Note number, bend, and frequency for a musical-step offset.
    pub fn pitch_for_step(&self, step: i32) -> PitchData {
        let semitones = step as f32 * self.step_cents / 100.0;
        let exact = f32::from(self.anchor_note) + semitones;
        let note = roundf(exact).clamp(0.0, 127.0);
        let residual = exact - note;
        PitchData {
            note: note as u8,
            bend: self.bend_units(residual),
            freq_hz: self.anchor_hz * powf(2.0, semitones / 12.0),
        }
    }
}

/// Per-key step offsets, recomputed by the layout collaborator whenever the
/// grid layout, mirroring, or octave shift changes.
#[derive(Clone, Copy, Debug)]
pub struct Layout<const K: usize> {
    /// Musical-step offset per key index.
    pub steps: [i32; K],
}

impl<const K: usize> Layout<K> {
    /// A chromatic run: key `i` sits at `first_step + i`.
    pub fn linear(first_step: i32) -> Self {
        Self {
            steps: core::array::from_fn(|i| first_step + i as i32),
        }
    }
}

impl<const K: usize> Default for Layout<K> {
    fn default() -> Self {
        Self::linear(0)
    }
}

/// A low-integer frequency ratio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JustRatio {
    /// Numerator.
    pub num: u16,
    /// Denominator.
    pub den: u16,
}

impl JustRatio {
    /// Interval size in cents.
    pub fn cents(&self) -> f32 {
        1200.0 * log2f(f32::from(self.num) / f32::from(self.den))
    }
}

/// Candidate ratios within one octave, ordered simplest first (ascending
/// `num + den`). The linear scan accepts the first entry within tolerance,
/// so a simple exact match always beats a complex near match.
pub const JUST_RATIOS: [JustRatio; 16] = [
    JustRatio { num: 1, den: 1 },
    JustRatio { num: 3, den: 2 },
    JustRatio { num: 4, den: 3 },
    JustRatio { num: 5, den: 3 },
    JustRatio { num: 5, den: 4 },
    JustRatio { num: 6, den: 5 },
    JustRatio { num: 7, den: 4 },
    JustRatio { num: 7, den: 5 },
    JustRatio { num: 7, den: 6 },
    JustRatio { num: 8, den: 5 },
    JustRatio { num: 9, den: 5 },
    JustRatio { num: 9, den: 8 },
    JustRatio { num: 10, den: 7 },
    JustRatio { num: 15, den: 8 },
    JustRatio { num: 16, den: 9 },
    JustRatio { num: 16, den: 15 },
];

/// Result of a ratio search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetuneMatch {
    /// The matched table entry.
    pub ratio: JustRatio,
    /// Whole octaves removed before the search.
    pub octaves: i32,
    /// Signed error of the equal-tempered interval against the just one, in
    /// cents (just minus equal).
    pub cents_delta: f32,
    /// The reference frequency times the just interval.
    pub corrected_hz: f32,
}

/// Find the just ratio best matching `target_hz / reference_hz`.
///
/// The interval is octave-reduced into `[1, 2)` first; the table is scanned
/// in order and the first entry within `tolerance_cents` wins, otherwise the
/// closest candidate found (the octave itself counts as a candidate via the
/// reduction remainder).
pub fn just_correction(reference_hz: f32, target_hz: f32, tolerance_cents: f32) -> RetuneMatch {
    let interval = target_hz / reference_hz;
    let total_cents = 1200.0 * log2f(interval);
    let octaves = libm::floorf(total_cents / 1200.0) as i32;
    let reduced_cents = total_cents - 1200.0 * octaves as f32;

    let mut best = JUST_RATIOS[0];
    let mut best_err = f32::MAX;
    let mut best_octaves = octaves;
    for ratio in JUST_RATIOS {
        let err = ratio.cents() - reduced_cents;
        if err.abs() <= tolerance_cents {
            best = ratio;
            best_err = err;
            break;
        }
        if err.abs() < best_err.abs() {
            best = ratio;
            best_err = err;
        }
    }
    // The top of the reduced octave is the unison of the next octave up.
    let octave_err = 1200.0 - reduced_cents;
    if octave_err.abs() < best_err.abs() {
        best = JUST_RATIOS[0];
        best_err = octave_err;
        best_octaves = octaves + 1;
    }

    let corrected_hz = reference_hz
        * powf(2.0, best_octaves as f32)
        * (f32::from(best.num) / f32::from(best.den));
    RetuneMatch {
        ratio: best,
        octaves: best_octaves,
        cents_delta: best_err,
        corrected_hz,
    }
}
