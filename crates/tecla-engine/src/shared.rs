//! Lock-free state shared between the control core and the audio core.
//!
//! The only mutable state crossing the core boundary is held here:
//!
//! - one command cell per voice (control writes, audio consumes-and-clears
//!   with a single atomic exchange);
//! - one needs-free flag per voice traveling the opposite way;
//! - parameter cells (per-voice frequency, global bend factor, waveform,
//!   velocity, pulse width, envelope timing) written only by the control
//!   core and read by the audio core.
//!
//! Parameter cells use relaxed ordering: every per-voice parameter write is
//! followed by a release store to that voice's command cell, and the audio
//! core's acquire exchange on the same cell makes the parameters visible
//! before the command is applied. Overwriting a still-pending command is an
//! accepted race — commands are idempotent for the stage they force, so the
//! last write wins.

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use crate::envelope::{EnvelopeTiming, LEVEL_MAX};
use crate::oscillator::Waveform;

/// Commands the control core may issue to a voice slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceCommand {
    /// Begin (or restart) the attack stage at the slot's target frequency.
    StartAttack,
    /// Begin the release stage, or free immediately at zero level.
    StartRelease,
    /// Clear the slot completely (panic path).
    Reset,
}

const CMD_NONE: u8 = 0;
const CMD_ATTACK: u8 = 1;
const CMD_RELEASE: u8 = 2;
const CMD_RESET: u8 = 3;

impl VoiceCommand {
    #[inline]
    fn encode(self) -> u8 {
        match self {
            VoiceCommand::StartAttack => CMD_ATTACK,
            VoiceCommand::StartRelease => CMD_RELEASE,
            VoiceCommand::Reset => CMD_RESET,
        }
    }

    #[inline]
    fn decode(raw: u8) -> Option<Self> {
        match raw {
            CMD_ATTACK => Some(VoiceCommand::StartAttack),
            CMD_RELEASE => Some(VoiceCommand::StartRelease),
            CMD_RESET => Some(VoiceCommand::Reset),
            _ => None,
        }
    }
}

/// Per-voice cross-core cells.
struct VoiceCell {
    command: AtomicU8,
    needs_free: AtomicBool,
    frequency_bits: AtomicU32,
}

impl VoiceCell {
    fn new() -> Self {
        Self {
            command: AtomicU8::new(CMD_NONE),
            needs_free: AtomicBool::new(false),
            frequency_bits: AtomicU32::new(0),
        }
    }
}

/// All state shared across the core boundary, `N` = polyphony limit.
///
/// The struct is `Sync`; on firmware it lives in a `static`, in tests and
/// the host CLI behind an `Arc`. Neither side ever blocks on it.
pub struct EngineShared<const N: usize> {
    voices: [VoiceCell; N],
    bend_factor_bits: AtomicU32,
    pulse_width_bits: AtomicU32,
    waveform: AtomicU8,
    velocity: AtomicU8,
    attack_ticks: AtomicU32,
    decay_ticks: AtomicU32,
    sustain_level: AtomicU32,
    release_ticks: AtomicU32,
}

impl<const N: usize> Default for EngineShared<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> EngineShared<N> {
    /// Create with neutral parameters: unity bend, sine, velocity 100.
    pub fn new() -> Self {
        let timing = EnvelopeTiming::default();
        Self {
            voices: core::array::from_fn(|_| VoiceCell::new()),
            bend_factor_bits: AtomicU32::new(1.0f32.to_bits()),
            pulse_width_bits: AtomicU32::new(0.5f32.to_bits()),
            waveform: AtomicU8::new(Waveform::Sine.to_index()),
            velocity: AtomicU8::new(100),
            attack_ticks: AtomicU32::new(timing.attack_ticks),
            decay_ticks: AtomicU32::new(timing.decay_ticks),
            sustain_level: AtomicU32::new(timing.sustain_level),
            release_ticks: AtomicU32::new(timing.release_ticks),
        }
    }

    /// Polyphony limit.
    #[inline]
    pub const fn voice_count(&self) -> usize {
        N
    }

    // --- control-core side ---

    /// Queue a command for a voice slot (last write wins).
    #[inline]
    pub fn send_command(&self, slot: usize, command: VoiceCommand) {
        self.voices[slot].command.store(command.encode(), Ordering::Release);
    }

    /// Set a voice slot's target frequency in Hz.
    ///
    /// Publish with [`send_command`](Self::send_command) afterwards.
    #[inline]
    pub fn set_frequency(&self, slot: usize, freq_hz: f32) {
        self.voices[slot]
            .frequency_bits
            .store(freq_hz.to_bits(), Ordering::Relaxed);
    }

    /// Consume a voice slot's needs-free flag.
    #[inline]
    pub fn take_needs_free(&self, slot: usize) -> bool {
        self.voices[slot].needs_free.swap(false, Ordering::Acquire)
    }

    /// True while a command sits unconsumed in the slot's cell.
    #[inline]
    pub fn command_pending(&self, slot: usize) -> bool {
        self.voices[slot].command.load(Ordering::Acquire) != CMD_NONE
    }

    /// Set the global pitch-bend factor (frequency multiplier, 1.0 = none).
    #[inline]
    pub fn set_bend_factor(&self, factor: f32) {
        self.bend_factor_bits.store(factor.to_bits(), Ordering::Relaxed);
    }

    /// Select the waveform for all voices.
    #[inline]
    pub fn set_waveform(&self, waveform: Waveform) {
        self.waveform.store(waveform.to_index(), Ordering::Relaxed);
    }

    /// Set the pulse duty cycle used by [`Waveform::Pulse`].
    #[inline]
    pub fn set_pulse_width(&self, width: f32) {
        self.pulse_width_bits.store(width.to_bits(), Ordering::Relaxed);
    }

    /// Set the global velocity scalar (0–127).
    #[inline]
    pub fn set_velocity(&self, velocity: u8) {
        self.velocity.store(velocity.min(127), Ordering::Relaxed);
    }

    /// Replace the envelope timing for subsequent stage transitions.
    pub fn set_envelope(&self, timing: EnvelopeTiming) {
        self.attack_ticks.store(timing.attack_ticks, Ordering::Relaxed);
        self.decay_ticks.store(timing.decay_ticks, Ordering::Relaxed);
        self.sustain_level
            .store(timing.sustain_level.min(LEVEL_MAX), Ordering::Relaxed);
        self.release_ticks.store(timing.release_ticks, Ordering::Relaxed);
    }

    // --- audio-core side ---

    /// Consume and clear a slot's pending command in one exchange.
    #[inline]
    pub fn take_command(&self, slot: usize) -> Option<VoiceCommand> {
        VoiceCommand::decode(self.voices[slot].command.swap(CMD_NONE, Ordering::AcqRel))
    }

    /// A slot's target frequency in Hz.
    #[inline]
    pub fn frequency(&self, slot: usize) -> f32 {
        f32::from_bits(self.voices[slot].frequency_bits.load(Ordering::Relaxed))
    }

    /// Report that a released slot has reached zero level.
    #[inline]
    pub fn raise_needs_free(&self, slot: usize) {
        self.voices[slot].needs_free.store(true, Ordering::Release);
    }

    /// Drop an unobserved needs-free flag (applied with Reset, so a stale
    /// pre-panic release cannot free a slot the panic already recycled).
    #[inline]
    pub fn clear_needs_free(&self, slot: usize) {
        self.voices[slot].needs_free.store(false, Ordering::Relaxed);
    }

    /// Current global pitch-bend factor.
    #[inline]
    pub fn bend_factor(&self) -> f32 {
        f32::from_bits(self.bend_factor_bits.load(Ordering::Relaxed))
    }

    /// Currently selected waveform.
    #[inline]
    pub fn waveform(&self) -> Waveform {
        Waveform::from_index(self.waveform.load(Ordering::Relaxed))
    }

    /// Current pulse duty cycle.
    #[inline]
    pub fn pulse_width(&self) -> f32 {
        f32::from_bits(self.pulse_width_bits.load(Ordering::Relaxed))
    }

    /// Current global velocity (0–127).
    #[inline]
    pub fn velocity(&self) -> u8 {
        self.velocity.load(Ordering::Relaxed)
    }

    /// Current envelope timing.
    pub fn envelope_timing(&self) -> EnvelopeTiming {
        EnvelopeTiming {
            attack_ticks: self.attack_ticks.load(Ordering::Relaxed),
            decay_ticks: self.decay_ticks.load(Ordering::Relaxed),
            sustain_level: self.sustain_level.load(Ordering::Relaxed),
            release_ticks: self.release_ticks.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_consumed_exactly_once() {
        let shared: EngineShared<4> = EngineShared::new();
        shared.send_command(2, VoiceCommand::StartAttack);
        assert_eq!(shared.take_command(2), Some(VoiceCommand::StartAttack));
        assert_eq!(shared.take_command(2), None);
    }

    #[test]
    fn last_command_wins() {
        let shared: EngineShared<4> = EngineShared::new();
        shared.send_command(0, VoiceCommand::StartAttack);
        shared.send_command(0, VoiceCommand::StartRelease);
        assert_eq!(shared.take_command(0), Some(VoiceCommand::StartRelease));
        assert_eq!(shared.take_command(0), None);
    }

    #[test]
    fn needs_free_round_trip() {
        let shared: EngineShared<4> = EngineShared::new();
        assert!(!shared.take_needs_free(1));
        shared.raise_needs_free(1);
        assert!(shared.take_needs_free(1));
        assert!(!shared.take_needs_free(1));
    }

    #[test]
    fn frequency_cells_are_per_slot() {
        let shared: EngineShared<4> = EngineShared::new();
        shared.set_frequency(0, 440.0);
        shared.set_frequency(3, 660.0);
        assert_eq!(shared.frequency(0), 440.0);
        assert_eq!(shared.frequency(3), 660.0);
        assert_eq!(shared.frequency(1), 0.0);
    }

    #[test]
    fn parameters_default_to_neutral() {
        let shared: EngineShared<2> = EngineShared::new();
        assert_eq!(shared.bend_factor(), 1.0);
        assert_eq!(shared.waveform(), Waveform::Sine);
        assert_eq!(shared.velocity(), 100);
        assert_eq!(shared.envelope_timing(), EnvelopeTiming::default());
    }

    #[test]
    fn velocity_is_clamped_to_midi_range() {
        let shared: EngineShared<2> = EngineShared::new();
        shared.set_velocity(200);
        assert_eq!(shared.velocity(), 127);
    }

    #[test]
    fn command_pending_tracks_the_cell() {
        let shared: EngineShared<2> = EngineShared::new();
        assert!(!shared.command_pending(0));
        shared.send_command(0, VoiceCommand::Reset);
        assert!(shared.command_pending(0));
        shared.take_command(0);
        assert!(!shared.command_pending(0));
    }
}
