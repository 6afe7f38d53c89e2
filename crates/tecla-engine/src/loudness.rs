//! Per-frequency loudness equalization.
//!
//! A raw oscillator at constant amplitude sounds much louder around 2–4 kHz
//! than at the extremes of the keyboard range. The mixer scales each voice by
//! a weight read off a coarse equal-loudness contour so chords spanning
//! octaves balance.

use libm::log2f;

/// Contour breakpoints: (frequency Hz, linear weight). Interpolated in
/// log-frequency between neighbors, clamped at the ends.
const CONTOUR: [(f32, f32); 10] = [
    (31.0, 1.00),
    (63.0, 1.00),
    (125.0, 0.95),
    (250.0, 0.86),
    (500.0, 0.76),
    (1000.0, 0.70),
    (2000.0, 0.62),
    (4000.0, 0.54),
    (8000.0, 0.60),
    (16000.0, 0.72),
];

/// Loudness-equalization weight for a voice at `freq_hz`.
#[inline]
pub fn loudness_weight(freq_hz: f32) -> f32 {
    let (first_hz, first_w) = CONTOUR[0];
    let (last_hz, last_w) = CONTOUR[CONTOUR.len() - 1];
    if freq_hz <= first_hz {
        return first_w;
    }
    if freq_hz >= last_hz {
        return last_w;
    }
    for window in CONTOUR.windows(2) {
        let (lo_hz, lo_w) = window[0];
        let (hi_hz, hi_w) = window[1];
        if freq_hz <= hi_hz {
            let t = log2f(freq_hz / lo_hz) / log2f(hi_hz / lo_hz);
            return lo_w + (hi_w - lo_w) * t;
        }
    }
    last_w
}
