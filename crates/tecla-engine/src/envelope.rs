//! Tick-exact ADSR envelope for the audio-core voice engine.
//!
//! Levels are 24-bit fixed point (`0..=LEVEL_MAX`) and every stage advances
//! by a precomputed integer step, so a stage configured to last `n` ticks
//! lasts exactly `n` ticks. Zero-length stages collapse inside the call that
//! applies them, which is what lets a zero-attack, zero-decay patch reach
//! Sustain within the same tick its StartAttack command arrives.

/// Full-scale envelope level (24-bit fixed point).
pub const LEVEL_MAX: u32 = 1 << 24;

/// Envelope stages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnvelopeStage {
    /// Envelope is inactive — the voice slot is free.
    #[default]
    Idle,
    /// Level ramps up toward [`LEVEL_MAX`].
    Attack,
    /// Level falls from full scale toward the sustain level.
    Decay,
    /// Level holds at the sustain level while the key is down.
    Sustain,
    /// Level falls toward zero after note-off.
    Release,
}

/// Envelope timing expressed in audio ticks.
///
/// Converted from millisecond settings on the control core; the audio core
/// only ever sees tick counts and a fixed-point sustain level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnvelopeTiming {
    /// Ticks to ramp from zero to full scale.
    pub attack_ticks: u32,
    /// Ticks to fall from full scale to the sustain level.
    pub decay_ticks: u32,
    /// Hold level, `0..=LEVEL_MAX`.
    pub sustain_level: u32,
    /// Ticks to fall from the current level to zero.
    pub release_ticks: u32,
}

impl Default for EnvelopeTiming {
    fn default() -> Self {
        // 10ms/100ms/70%/200ms at a 31.25 kHz tick rate
        Self {
            attack_ticks: 312,
            decay_ticks: 3125,
            sustain_level: (LEVEL_MAX / 10) * 7,
            release_ticks: 6250,
        }
    }
}

impl EnvelopeTiming {
    /// Convert millisecond settings to tick counts at the given tick rate.
    ///
    /// `sustain` is a fraction in `0.0..=1.0`.
    pub fn from_millis(
        attack_ms: f32,
        decay_ms: f32,
        sustain: f32,
        release_ms: f32,
        tick_hz: f32,
    ) -> Self {
        let ticks = |ms: f32| (ms.max(0.0) * tick_hz / 1000.0) as u32;
        Self {
            attack_ticks: ticks(attack_ms),
            decay_ticks: ticks(decay_ms),
            sustain_level: (sustain.clamp(0.0, 1.0) * LEVEL_MAX as f32) as u32,
            release_ticks: ticks(release_ms),
        }
    }

    /// Per-tick attack step so the ramp completes in exactly `attack_ticks`.
    #[inline]
    fn attack_step(&self) -> u32 {
        if self.attack_ticks == 0 {
            LEVEL_MAX
        } else {
            LEVEL_MAX.div_ceil(self.attack_ticks)
        }
    }

    /// Per-tick decay step toward the sustain level.
    #[inline]
    fn decay_step(&self) -> u32 {
        let span = LEVEL_MAX - self.sustain_level;
        if self.decay_ticks == 0 {
            span
        } else {
            span.div_ceil(self.decay_ticks).max(1)
        }
    }
}

/// Per-voice ADSR state machine.
///
/// The release step is computed from the level at the moment of release, so
/// convergence to exactly zero takes at most `release_ticks` ticks from any
/// starting level.
#[derive(Clone, Copy, Debug, Default)]
pub struct Envelope {
    stage: EnvelopeStage,
    level: u32,
    release_step: u32,
}

impl Envelope {
    /// Create an idle envelope.
    pub const fn new() -> Self {
        Self {
            stage: EnvelopeStage::Idle,
            level: 0,
            release_step: 0,
        }
    }

    /// Current stage.
    #[inline]
    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Current level, `0..=LEVEL_MAX`.
    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// True while the stage is anything but Idle.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeStage::Idle
    }

    /// Apply a StartAttack command.
    ///
    /// The level restarts from zero (a second trigger before any tick has
    /// elapsed is therefore indistinguishable from the first). Zero-length
    /// attack and decay stages are skipped immediately.
    pub fn trigger(&mut self, timing: &EnvelopeTiming) {
        self.release_step = 0;
        if timing.attack_ticks == 0 {
            if timing.decay_ticks == 0 {
                self.level = timing.sustain_level;
                self.stage = EnvelopeStage::Sustain;
            } else {
                self.level = LEVEL_MAX;
                self.stage = if timing.sustain_level == LEVEL_MAX {
                    EnvelopeStage::Sustain
                } else {
                    EnvelopeStage::Decay
                };
            }
        } else {
            self.level = 0;
            self.stage = EnvelopeStage::Attack;
        }
    }

    /// Apply a StartRelease command.
    ///
    /// Returns `true` when the slot freed immediately (level already zero or
    /// release time configured to zero); the caller raises needs-free and
    /// silences the oscillator in that case. An Idle slot frees immediately
    /// too — its level is zero. That closes the window where a release
    /// overwrites a not-yet-consumed attack: the control core still gets its
    /// needs-free hand-back and the slot returns to the free list.
    pub fn release(&mut self, timing: &EnvelopeTiming) -> bool {
        if self.level == 0 || timing.release_ticks == 0 {
            self.level = 0;
            self.stage = EnvelopeStage::Idle;
            return true;
        }
        self.release_step = self.level.div_ceil(timing.release_ticks);
        self.stage = EnvelopeStage::Release;
        false
    }

    /// Apply a Reset command: back to Idle, level zero.
    pub fn reset(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.level = 0;
        self.release_step = 0;
    }

    /// Advance one tick.
    ///
    /// Returns `true` on the tick the release reaches zero — the slot is done
    /// and must be reported back to the control core.
    #[inline]
    pub fn advance(&mut self, timing: &EnvelopeTiming) -> bool {
        match self.stage {
            EnvelopeStage::Idle => {}
            EnvelopeStage::Attack => {
                self.level = self.level.saturating_add(timing.attack_step()).min(LEVEL_MAX);
                if self.level == LEVEL_MAX {
                    if timing.decay_ticks == 0 {
                        self.level = timing.sustain_level;
                        self.stage = EnvelopeStage::Sustain;
                    } else if timing.sustain_level == LEVEL_MAX {
                        self.stage = EnvelopeStage::Sustain;
                    } else {
                        self.stage = EnvelopeStage::Decay;
                    }
                }
            }
            EnvelopeStage::Decay => {
                self.level = self.level.saturating_sub(timing.decay_step());
                if self.level <= timing.sustain_level {
                    self.level = timing.sustain_level;
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => {
                self.level = timing.sustain_level;
            }
            EnvelopeStage::Release => {
                self.level = self.level.saturating_sub(self.release_step);
                if self.level == 0 {
                    self.stage = EnvelopeStage::Idle;
                    self.release_step = 0;
                    return true;
                }
            }
        }
        false
    }
}
