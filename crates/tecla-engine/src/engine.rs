//! The per-tick voice engine: command apply, envelope advance, oscillator
//! advance, mix, write.
//!
//! [`Engine::tick`] is the body of the audio-core timer interrupt. It
//! performs no allocation, takes no locks, and does a bounded amount of work
//! per voice slot; everything it needs from the control core comes out of
//! [`EngineShared`].

use libm::sqrtf;

use crate::envelope::{Envelope, LEVEL_MAX};
use crate::loudness::loudness_weight;
use crate::oscillator::Oscillator;
use crate::shared::{EngineShared, VoiceCommand};
use crate::sink::AudioSink;
use crate::EnvelopeStage;

/// Audio-core state for one voice slot.
#[derive(Clone, Copy, Debug, Default)]
struct VoiceUnit {
    envelope: Envelope,
    oscillator: Oscillator,
    freq_hz: f32,
}

/// The audio-core engine, `N` = polyphony limit.
pub struct Engine<const N: usize> {
    voices: [VoiceUnit; N],
    /// Mix gain per active-voice count (`attenuation[n - 1]` for n voices).
    attenuation: [f32; N],
    tick_hz: f32,
}

impl<const N: usize> Engine<N> {
    /// Create an engine running at the given tick (interrupt) rate.
    pub fn new(tick_hz: f32) -> Self {
        Self {
            voices: [VoiceUnit::default(); N],
            attenuation: core::array::from_fn(|n| 1.0 / sqrtf((n + 1) as f32)),
            tick_hz,
        }
    }

    /// Tick rate in Hz.
    #[inline]
    pub fn tick_hz(&self) -> f32 {
        self.tick_hz
    }

    /// Number of slots whose envelope is not Idle.
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.envelope.is_active()).count()
    }

    /// A slot's envelope stage (test observability).
    pub fn stage(&self, slot: usize) -> EnvelopeStage {
        self.voices[slot].envelope.stage()
    }

    /// A slot's envelope level (test observability).
    pub fn level(&self, slot: usize) -> u32 {
        self.voices[slot].envelope.level()
    }

    /// Run one audio tick and return the 8-bit duty value.
    ///
    /// Per slot: exchange-and-clear the pending command, apply it, advance
    /// the envelope, then the oscillator; active voices are weighted by
    /// envelope level and the loudness contour, summed, scaled by the
    /// polyphony attenuation table and the velocity scalar.
    pub fn tick(&mut self, shared: &EngineShared<N>) -> u8 {
        let timing = shared.envelope_timing();
        let waveform = shared.waveform();
        let pulse_width = shared.pulse_width();
        let bend = shared.bend_factor();
        let velocity = shared.velocity() as f32 / 127.0;

        let mut mix = 0.0f32;
        let mut active = 0usize;

        for (slot, voice) in self.voices.iter_mut().enumerate() {
            match shared.take_command(slot) {
                Some(VoiceCommand::StartAttack) => {
                    voice.freq_hz = shared.frequency(slot);
                    voice.oscillator.sync();
                    voice.envelope.trigger(&timing);
                }
                Some(VoiceCommand::StartRelease) => {
                    if voice.envelope.release(&timing) {
                        voice.oscillator.silence();
                        shared.raise_needs_free(slot);
                    }
                }
                Some(VoiceCommand::Reset) => {
                    voice.envelope.reset();
                    voice.oscillator.reset();
                    voice.freq_hz = 0.0;
                    shared.clear_needs_free(slot);
                }
                None => {}
            }

            if voice.envelope.advance(&timing) {
                voice.oscillator.silence();
                shared.raise_needs_free(slot);
            }

            if voice.envelope.is_active() {
                voice
                    .oscillator
                    .set_increment(Oscillator::increment_for(voice.freq_hz * bend, self.tick_hz));
                voice.oscillator.advance();
                let raw = voice.oscillator.sample(waveform, pulse_width);
                let gain = voice.envelope.level() as f32 / LEVEL_MAX as f32;
                mix += raw * gain * loudness_weight(voice.freq_hz);
                active += 1;
            }
        }

        let out = if active > 0 {
            (mix * self.attenuation[active - 1] * velocity).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        ((out + 1.0) * 127.5) as u8
    }

    /// Run one tick and latch the result into the output sink(s).
    #[inline]
    pub fn tick_into(&mut self, shared: &EngineShared<N>, sink: &mut impl AudioSink) {
        let duty = self.tick(shared);
        sink.write(duty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeTiming;
    use crate::oscillator::Waveform;
    use crate::sink::BufferSink;

    const TICK_HZ: f32 = 31_250.0;

    fn fast_envelope(shared: &EngineShared<4>) {
        shared.set_envelope(EnvelopeTiming {
            attack_ticks: 0,
            decay_ticks: 0,
            sustain_level: LEVEL_MAX,
            release_ticks: 8,
        });
    }

    #[test]
    fn silent_engine_outputs_center_duty() {
        let mut engine: Engine<4> = Engine::new(TICK_HZ);
        let shared = EngineShared::new();
        for _ in 0..16 {
            assert_eq!(engine.tick(&shared), 127);
        }
    }

    #[test]
    fn start_attack_sounds_within_one_tick() {
        let mut engine: Engine<4> = Engine::new(TICK_HZ);
        let shared = EngineShared::new();
        fast_envelope(&shared);
        shared.set_waveform(Waveform::Square);
        shared.set_frequency(0, 440.0);
        shared.send_command(0, VoiceCommand::StartAttack);

        let duty = engine.tick(&shared);
        assert_eq!(engine.stage(0), EnvelopeStage::Sustain);
        assert_ne!(duty, 127, "voice should move the output off center");
    }

    #[test]
    fn zero_time_stages_land_in_sustain_same_tick() {
        let mut engine: Engine<4> = Engine::new(TICK_HZ);
        let shared = EngineShared::new();
        fast_envelope(&shared);
        shared.set_frequency(2, 220.0);
        shared.send_command(2, VoiceCommand::StartAttack);
        engine.tick(&shared);
        assert_eq!(engine.stage(2), EnvelopeStage::Sustain);
        assert_eq!(engine.level(2), LEVEL_MAX);
    }

    #[test]
    fn release_raises_needs_free_when_done() {
        let mut engine: Engine<4> = Engine::new(TICK_HZ);
        let shared = EngineShared::new();
        fast_envelope(&shared);
        shared.set_frequency(1, 330.0);
        shared.send_command(1, VoiceCommand::StartAttack);
        engine.tick(&shared);

        shared.send_command(1, VoiceCommand::StartRelease);
        let mut freed_after = None;
        for n in 0..16 {
            engine.tick(&shared);
            if shared.take_needs_free(1) {
                freed_after = Some(n);
                break;
            }
        }
        let ticks = freed_after.expect("release never freed the slot");
        assert!(ticks < 8, "took {ticks} ticks");
        assert_eq!(engine.stage(1), EnvelopeStage::Idle);
    }

    #[test]
    fn release_on_idle_slot_still_hands_it_back() {
        // Covers the overwrite race: a StartRelease that clobbered its own
        // StartAttack finds the slot idle and must still report needs-free.
        let mut engine: Engine<4> = Engine::new(TICK_HZ);
        let shared = EngineShared::new();
        shared.send_command(3, VoiceCommand::StartRelease);
        engine.tick(&shared);
        assert!(shared.take_needs_free(3));
        assert_eq!(engine.stage(3), EnvelopeStage::Idle);
    }

    #[test]
    fn reset_clears_voice_and_stale_flag() {
        let mut engine: Engine<4> = Engine::new(TICK_HZ);
        let shared = EngineShared::new();
        fast_envelope(&shared);
        shared.set_frequency(0, 440.0);
        shared.send_command(0, VoiceCommand::StartAttack);
        engine.tick(&shared);
        shared.raise_needs_free(0);
        shared.send_command(0, VoiceCommand::Reset);
        engine.tick(&shared);
        assert_eq!(engine.stage(0), EnvelopeStage::Idle);
        assert!(!shared.take_needs_free(0));
    }

    #[test]
    fn more_voices_do_not_clip() {
        let mut engine: Engine<4> = Engine::new(TICK_HZ);
        let shared = EngineShared::new();
        fast_envelope(&shared);
        shared.set_velocity(127);
        for (slot, freq) in [220.0, 277.2, 329.6, 415.3].into_iter().enumerate() {
            shared.set_frequency(slot, freq);
            shared.send_command(slot, VoiceCommand::StartAttack);
        }
        let mut railed = 0usize;
        for _ in 0..10_000 {
            let duty = engine.tick(&shared);
            if duty == 0 || duty == 255 {
                railed += 1;
            }
        }
        assert_eq!(engine.active_count(), 4);
        // Four full-velocity sines; the attenuation table should keep the
        // mix off the rails almost always.
        assert!(railed < 500, "output railed on {railed}/10000 ticks");
    }

    #[test]
    fn velocity_zero_is_silent() {
        let mut engine: Engine<4> = Engine::new(TICK_HZ);
        let shared = EngineShared::new();
        fast_envelope(&shared);
        shared.set_velocity(0);
        shared.set_frequency(0, 440.0);
        shared.send_command(0, VoiceCommand::StartAttack);
        for _ in 0..100 {
            assert_eq!(engine.tick(&shared), 127);
        }
    }

    #[test]
    fn tick_into_writes_the_sink() {
        let mut engine: Engine<4> = Engine::new(TICK_HZ);
        let shared = EngineShared::new();
        let mut sink = BufferSink::new();
        for _ in 0..10 {
            engine.tick_into(&shared, &mut sink);
        }
        assert_eq!(sink.samples().len(), 10);
    }

    #[test]
    fn bend_factor_shifts_pitch() {
        let mut engine: Engine<4> = Engine::new(TICK_HZ);
        let shared = EngineShared::new();
        fast_envelope(&shared);
        shared.set_waveform(Waveform::Square);
        shared.set_frequency(0, 440.0);
        shared.send_command(0, VoiceCommand::StartAttack);

        let count_crossings = |engine: &mut Engine<4>| {
            let mut prev = 0u8;
            let mut crossings = 0u32;
            for _ in 0..31_250 {
                let s = engine.tick(&shared);
                if prev < 128 && s >= 128 {
                    crossings += 1;
                }
                prev = s;
            }
            crossings
        };

        let base = count_crossings(&mut engine);
        shared.set_bend_factor(2.0);
        let bent = count_crossings(&mut engine);
        assert!(
            bent > base + base / 2,
            "doubling bend should roughly double cycles: {base} -> {bent}"
        );
    }
}
