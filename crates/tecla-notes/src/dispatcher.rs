//! The note dispatcher: single entry point for every key transition.
//!
//! A press computes pitch data, allocates a MIDI channel and a synth voice,
//! and emits the wire messages; a release unwinds all of it. The dispatcher
//! also owns the pieces that cut across both allocators — the held-notes
//! stack, the arpeggiator clock, settings application (with the forced
//! release that precedes a channel-pool rebuild), and the panic path.

use crate::channels::{Assignment, BendPolicy, ChannelAllocator, ChannelRange, PoolDiscipline};
use crate::held::HeldStack;
use crate::tuning::{Layout, Tuning, just_correction};
use crate::voices::{PlaybackMode, VoiceAllocator};
use tecla_engine::{EngineShared, EnvelopeTiming, Waveform};
use tecla_midi::{
    BEND_MAX, BEND_MIN, Message, MidiTransport, cc, send_channel_reset, send_mpe_zone,
    send_pitch_bend_range,
};

/// Everything the dispatcher consumes from the settings store, flattened to
/// plain values (the TOML/serde layer lives in `tecla-config`).
#[derive(Clone, Copy, Debug)]
pub struct DispatcherConfig {
    /// Voice allocation mode.
    pub mode: PlaybackMode,
    /// Oscillator waveform.
    pub waveform: Waveform,
    /// Pulse duty cycle for [`Waveform::Pulse`].
    pub pulse_width: f32,
    /// Note-on velocity and engine velocity scalar (0–127).
    pub velocity: u8,
    /// Envelope attack in milliseconds.
    pub attack_ms: f32,
    /// Envelope decay in milliseconds.
    pub decay_ms: f32,
    /// Envelope sustain fraction, `0.0..=1.0`.
    pub sustain: f32,
    /// Envelope release in milliseconds.
    pub release_ms: f32,
    /// Active tuning system.
    pub tuning: Tuning,
    /// Just-intonation retune against the most recent held note.
    pub just_intonation: bool,
    /// Steps added to every key.
    pub transpose: i32,
    /// User-forced MPE, independent of what the tuning implies.
    pub mpe_forced: bool,
    /// MPE member-channel range.
    pub range: ChannelRange,
    /// Channel pool discipline.
    pub discipline: PoolDiscipline,
    /// Arpeggiator step period in microseconds (0 disables stepping).
    pub arp_period_us: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            mode: PlaybackMode::Poly,
            waveform: Waveform::Sine,
            pulse_width: 0.5,
            velocity: 100,
            attack_ms: 10.0,
            decay_ms: 100.0,
            sustain: 0.7,
            release_ms: 200.0,
            tuning: Tuning::default(),
            just_intonation: false,
            transpose: 0,
            mpe_forced: false,
            range: ChannelRange::default(),
            discipline: PoolDiscipline::RoundRobin,
            arp_period_us: 125_000,
        }
    }
}

/// Per-key state, created at startup for every physical key.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyRecord {
    /// Level state from the last scan.
    pub pressed: bool,
    /// Assigned MIDI channel, 0 when silent.
    pub channel: u8,
    /// Whether the channel must return to the pool on release.
    pub exclusive_channel: bool,
    /// Assigned voice slot, if sounding internally.
    pub voice: Option<usize>,
    /// Musical step offset (layout plus transpose).
    pub step: i32,
    /// Computed MIDI note number.
    pub note: u8,
    /// Computed pitch bend.
    pub bend: i16,
    /// Computed frequency in Hz.
    pub freq_hz: f32,
}

/// Arpeggiator clock and cursor.
#[derive(Clone, Copy, Debug, Default)]
struct Arpeggiator {
    next_at_us: u64,
    position: usize,
    playing: Option<usize>,
}

/// The control-core note dispatcher over `K` keys and `N` voice slots.
pub struct Dispatcher<const K: usize, const N: usize> {
    keys: [KeyRecord; K],
    layout: Layout<K>,
    held: HeldStack<K>,
    voices: VoiceAllocator<N>,
    channels: ChannelAllocator,
    config: DispatcherConfig,
    tick_hz: f32,
    arp: Arpeggiator,
}

impl<const K: usize, const N: usize> Dispatcher<K, N> {
    /// Create a dispatcher; call [`apply_settings`](Self::apply_settings)
    /// before the first scan to push parameters to the engine and advertise
    /// the MPE zone.
    pub fn new(layout: Layout<K>, tick_hz: f32) -> Self {
        let config = DispatcherConfig::default();
        let policy = BendPolicy::decide(&config.tuning, config.just_intonation, config.mpe_forced);
        let mut dispatcher = Self {
            keys: [KeyRecord::default(); K],
            layout,
            held: HeldStack::new(),
            voices: VoiceAllocator::new(config.mode),
            channels: ChannelAllocator::new(policy, config.discipline, config.range),
            config,
            tick_hz,
            arp: Arpeggiator::default(),
        };
        dispatcher.retune_all();
        dispatcher
    }

    /// A key's current record.
    pub fn key(&self, key: usize) -> &KeyRecord {
        &self.keys[key]
    }

    /// Number of keys currently held.
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// The voice allocator (test observability).
    pub fn voices(&self) -> &VoiceAllocator<N> {
        &self.voices
    }

    /// The channel allocator (test observability).
    pub fn channels(&self) -> &ChannelAllocator {
        &self.channels
    }

    /// Active configuration.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Edge-detect a full scan of key levels and dispatch the transitions.
    pub fn scan(
        &mut self,
        levels: &[bool; K],
        shared: &EngineShared<N>,
        midi: &mut impl MidiTransport,
    ) {
        for key in 0..K {
            if levels[key] && !self.keys[key].pressed {
                self.key_pressed(key, shared, midi);
            } else if !levels[key] && self.keys[key].pressed {
                self.key_released(key, shared, midi);
            }
        }
    }

    /// Handle a new press of `key`.
    pub fn key_pressed(
        &mut self,
        key: usize,
        shared: &EngineShared<N>,
        midi: &mut impl MidiTransport,
    ) {
        if key >= K || self.keys[key].pressed {
            return;
        }

        let step = self.layout.steps[key] + self.config.transpose;
        let pitch = self.config.tuning.pitch_for_step(step);
        let mut bend = pitch.bend;
        let mut freq_hz = pitch.freq_hz;

        if self.config.just_intonation
            && let Some(reference) = self.held.top()
        {
            let reference_hz = self.keys[reference].freq_hz;
            if reference_hz > 0.0 && freq_hz > 0.0 {
                let tolerance = self.config.tuning.step_cents * 0.25;
                let retune = just_correction(reference_hz, freq_hz, tolerance);
                let correction = self.config.tuning.bend_units(retune.cents_delta / 100.0);
                bend = (i32::from(bend) + i32::from(correction))
                    .clamp(i32::from(BEND_MIN), i32::from(BEND_MAX)) as i16;
                freq_hz = retune.corrected_hz;
            }
        }

        let Some(assignment) = self.channels.assign(step) else {
            // Starvation: the whole note is dropped so the external receiver
            // and the internal synth never disagree about what sounds. The
            // key is still marked pressed (silent) so the scan edge detector
            // does not re-attempt it every iteration.
            self.keys[key] = KeyRecord {
                pressed: true,
                channel: 0,
                exclusive_channel: false,
                voice: None,
                step,
                note: pitch.note,
                bend,
                freq_hz,
            };
            return;
        };

        self.keys[key] = KeyRecord {
            pressed: true,
            channel: assignment.channel,
            exclusive_channel: assignment.exclusive,
            voice: None,
            step,
            note: pitch.note,
            bend,
            freq_hz,
        };
        self.held.push(key);

        if self.config.mode == PlaybackMode::Arpeggio {
            // The arpeggiator clock sends the wire messages and drives the
            // voice; the press only registers the key.
            return;
        }

        self.sound_key(key, shared, midi);
    }

    /// Handle a release of `key`.
    pub fn key_released(
        &mut self,
        key: usize,
        shared: &EngineShared<N>,
        midi: &mut impl MidiTransport,
    ) {
        if key >= K || !self.keys[key].pressed {
            return;
        }
        let record = self.keys[key];
        self.keys[key].pressed = false;

        let audible = match self.config.mode {
            PlaybackMode::Arpeggio => self.arp.playing == Some(key),
            _ => true,
        };
        if audible && record.channel != 0 {
            Message::NoteOff {
                channel: record.channel,
                note: record.note,
                velocity: 0,
            }
            .send(midi);
        }
        if self.arp.playing == Some(key) {
            self.arp.playing = None;
        }

        self.held.remove(key);
        if record.channel != 0 {
            self.channels.release(Assignment {
                channel: record.channel,
                exclusive: record.exclusive_channel,
            });
        }
        self.keys[key].channel = 0;
        self.keys[key].exclusive_channel = false;

        match self.config.mode {
            PlaybackMode::Poly => {
                self.voices.note_off(key, shared);
                self.keys[key].voice = None;
            }
            PlaybackMode::Mono => {
                if self.keys[key].voice.take().is_some() {
                    // Redirect the single voice to the newest key still held.
                    if let Some(next) = self.held.top() {
                        let outcome = self.voices.note_on(next, self.keys[next].freq_hz, shared);
                        self.keys[next].voice = Some(outcome.slot);
                    } else {
                        self.voices.note_off(key, shared);
                    }
                }
            }
            PlaybackMode::Arpeggio => {
                if self.keys[key].voice.take().is_some() {
                    self.voices.note_off(key, shared);
                }
            }
        }
    }

    /// Once-per-control-loop housekeeping: drain freed voices and step the
    /// arpeggiator. `now_us` comes from the free-running microsecond timer.
    pub fn control_tick(
        &mut self,
        now_us: u64,
        shared: &EngineShared<N>,
        midi: &mut impl MidiTransport,
    ) {
        self.voices.drain(shared);

        if self.config.mode != PlaybackMode::Arpeggio
            || self.config.arp_period_us == 0
            || self.held.is_empty()
            || now_us < self.arp.next_at_us
        {
            return;
        }
        self.arp.next_at_us = now_us + self.config.arp_period_us;

        if let Some(previous) = self.arp.playing.take() {
            let record = self.keys[previous];
            if record.pressed && record.channel != 0 {
                Message::NoteOff {
                    channel: record.channel,
                    note: record.note,
                    velocity: 0,
                }
                .send(midi);
            }
            self.keys[previous].voice = None;
        }

        let position = self.arp.position % self.held.len();
        self.arp.position = position + 1;
        if let Some(key) = self.held.get(position) {
            self.sound_key(key, shared, midi);
            self.arp.playing = Some(key);
        }
    }

    /// Send bend + note-on for a registered key and start its voice.
    fn sound_key(&mut self, key: usize, shared: &EngineShared<N>, midi: &mut impl MidiTransport) {
        let record = self.keys[key];
        if self.channels.policy().needs_zone() {
            Message::PitchBend {
                channel: record.channel,
                bend: record.bend,
            }
            .send(midi);
        }
        Message::NoteOn {
            channel: record.channel,
            note: record.note,
            velocity: self.config.velocity,
        }
        .send(midi);

        let outcome = self.voices.note_on(key, record.freq_hz, shared);
        if let Some(stolen) = outcome.stolen_from
            && stolen != key
        {
            self.keys[stolen].voice = None;
        }
        self.keys[key].voice = Some(outcome.slot);
    }

    /// Recompute every key's pitch data after a tuning/layout/transpose
    /// change. Channel and voice assignments of held keys are untouched.
    pub fn retune_all(&mut self) {
        for key in 0..K {
            let step = self.layout.steps[key] + self.config.transpose;
            let pitch = self.config.tuning.pitch_for_step(step);
            let record = &mut self.keys[key];
            record.step = step;
            record.note = pitch.note;
            record.bend = pitch.bend;
            record.freq_hz = pitch.freq_hz;
        }
    }

    /// Replace the layout table and recompute pitch data.
    pub fn set_layout(&mut self, layout: Layout<K>) {
        self.layout = layout;
        self.retune_all();
    }

    /// Apply a new settings snapshot.
    ///
    /// All held notes are force-released first (the channel pool cannot be
    /// rebuilt under live assignments), then engine parameters are pushed,
    /// the pool is rebuilt, pitch data recomputed, and the MPE zone and
    /// per-channel bend ranges advertised.
    pub fn apply_settings(
        &mut self,
        config: DispatcherConfig,
        shared: &EngineShared<N>,
        midi: &mut impl MidiTransport,
    ) {
        self.release_all(shared, midi);
        self.config = config;

        shared.set_waveform(config.waveform);
        shared.set_pulse_width(config.pulse_width);
        shared.set_velocity(config.velocity);
        shared.set_envelope(EnvelopeTiming::from_millis(
            config.attack_ms,
            config.decay_ms,
            config.sustain,
            config.release_ms,
            self.tick_hz,
        ));

        let policy = BendPolicy::decide(&config.tuning, config.just_intonation, config.mpe_forced);
        let range = config.range.clamped();
        self.channels.rebuild(policy, config.discipline, range);
        self.voices.set_mode(config.mode, shared);
        self.retune_all();
        self.arp = Arpeggiator::default();

        if policy.needs_zone() {
            send_mpe_zone(midi, range.master(), range.member_count());
            for channel in range.low..=range.high {
                send_pitch_bend_range(midi, channel, config.tuning.bend_range);
            }
        } else {
            send_pitch_bend_range(midi, self.channels.fixed_channel(), config.tuning.bend_range);
        }
    }

    /// Release every pressed key through the normal path.
    pub fn release_all(&mut self, shared: &EngineShared<N>, midi: &mut impl MidiTransport) {
        for key in 0..K {
            if self.keys[key].pressed {
                self.key_released(key, shared, midi);
            }
        }
    }

    /// The designed escape hatch after protocol or hardware error: reset all
    /// sixteen channels on the wire, clear every key, channel, and voice,
    /// and force every slot to Reset.
    pub fn panic_reset(&mut self, shared: &EngineShared<N>, midi: &mut impl MidiTransport) {
        for channel in tecla_midi::MIN_CHANNEL..=tecla_midi::MAX_CHANNEL {
            send_channel_reset(midi, channel);
        }
        for key in 0..K {
            self.keys[key].pressed = false;
            self.keys[key].channel = 0;
            self.keys[key].exclusive_channel = false;
            self.keys[key].voice = None;
        }
        self.held.clear();
        self.arp = Arpeggiator::default();
        self.channels.rebuild(
            self.channels.policy(),
            self.channels.discipline(),
            self.channels.range(),
        );
        self.voices.reset(shared);
    }

    /// Channel for global (non-per-note) messages: the zone master when MPE
    /// is active, else the fixed channel.
    fn global_channel(&self) -> u8 {
        if self.channels.policy().needs_zone() {
            self.channels.range().master()
        } else {
            self.channels.fixed_channel()
        }
    }

    /// Forward a program change.
    pub fn send_program_change(&self, program: u8, midi: &mut impl MidiTransport) {
        Message::ProgramChange {
            channel: self.global_channel(),
            program,
        }
        .send(midi);
    }

    /// Forward a modulation-wheel value (CC 1).
    pub fn send_modulation(&self, value: u8, midi: &mut impl MidiTransport) {
        Message::ControlChange {
            channel: self.global_channel(),
            controller: cc::MODULATION,
            value,
        }
        .send(midi);
    }

    /// Forward a timbre value (CC 74).
    pub fn send_timbre(&self, value: u8, midi: &mut impl MidiTransport) {
        Message::ControlChange {
            channel: self.global_channel(),
            controller: cc::TIMBRE,
            value,
        }
        .send(midi);
    }

    /// Forward channel pressure.
    pub fn send_pressure(&self, pressure: u8, midi: &mut impl MidiTransport) {
        Message::ChannelPressure {
            channel: self.global_channel(),
            pressure,
        }
        .send(midi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tecla_engine::Engine;
    use tecla_midi::transport::BufferTransport;

    const TICK_HZ: f32 = 31_250.0;

    fn setup<const K: usize, const N: usize>(
        config: DispatcherConfig,
    ) -> (Dispatcher<K, N>, EngineShared<N>, BufferTransport) {
        let shared = EngineShared::new();
        let mut midi = BufferTransport::new();
        let mut dispatcher: Dispatcher<K, N> = Dispatcher::new(Layout::linear(0), TICK_HZ);
        dispatcher.apply_settings(config, &shared, &mut midi);
        midi.take();
        (dispatcher, shared, midi)
    }

    #[test]
    fn press_sends_note_on_and_starts_a_voice() {
        let (mut d, shared, mut midi) = setup::<8, 4>(DispatcherConfig::default());
        d.key_pressed(0, &shared, &mut midi);
        assert_eq!(midi.len(), 1);
        assert_eq!(midi.messages()[0], [0x90, 60, 100]);
        assert_eq!(d.key(0).voice, Some(0));
        assert_eq!(d.held_count(), 1);
    }

    #[test]
    fn fixed_channel_mode_never_changes_channel() {
        let (mut d, shared, mut midi) = setup::<8, 4>(DispatcherConfig::default());
        for key in 0..3 {
            d.key_pressed(key, &shared, &mut midi);
            d.key_released(key, &shared, &mut midi);
        }
        for message in midi.messages() {
            assert_eq!(message[0] & 0x0F, 0, "all traffic on channel 1");
        }
    }

    #[test]
    fn level_scan_reacts_to_edges_only() {
        let (mut d, shared, mut midi) = setup::<4, 4>(DispatcherConfig::default());
        let mut levels = [false; 4];
        levels[2] = true;
        d.scan(&levels, &shared, &mut midi);
        d.scan(&levels, &shared, &mut midi);
        d.scan(&levels, &shared, &mut midi);
        assert_eq!(midi.with_status(0x90).count(), 1);
        levels[2] = false;
        d.scan(&levels, &shared, &mut midi);
        assert_eq!(midi.with_status(0x80).count(), 1);
    }

    #[test]
    fn release_returns_channel_and_restores_free_list() {
        let config = DispatcherConfig {
            mpe_forced: true,
            ..DispatcherConfig::default()
        };
        let (mut d, shared, mut midi) = setup::<8, 4>(config);
        let mut engine: Engine<4> = Engine::new(TICK_HZ);

        let pool_before = d.channels().pool_len();
        let free_before = d.voices().free_len();

        d.key_pressed(0, &shared, &mut midi);
        assert_eq!(d.channels().pool_len(), pool_before - 1);
        d.key_released(0, &shared, &mut midi);

        // Voice frees once the audio core has run the release out.
        for _ in 0..20_000 {
            engine.tick(&shared);
        }
        d.control_tick(0, &shared, &mut midi);

        assert_eq!(d.channels().pool_len(), pool_before);
        assert_eq!(d.voices().free_len(), free_before);
    }

    #[test]
    fn mpe_press_sends_bend_before_note_on() {
        let config = DispatcherConfig {
            mpe_forced: true,
            ..DispatcherConfig::default()
        };
        let (mut d, shared, mut midi) = setup::<8, 4>(config);
        d.key_pressed(0, &shared, &mut midi);
        let msgs = midi.messages();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0][0] & 0xF0, 0xE0);
        assert_eq!(msgs[1][0] & 0xF0, 0x90);
        assert_eq!(msgs[0][0] & 0x0F, msgs[1][0] & 0x0F, "same member channel");
    }

    #[test]
    fn apply_settings_advertises_zone_and_bend_range() {
        let shared: EngineShared<4> = EngineShared::new();
        let mut midi = BufferTransport::new();
        let mut d: Dispatcher<8, 4> = Dispatcher::new(Layout::linear(0), TICK_HZ);
        let config = DispatcherConfig {
            mpe_forced: true,
            range: ChannelRange { low: 2, high: 16 },
            ..DispatcherConfig::default()
        };
        d.apply_settings(config, &shared, &mut midi);

        // RPN 6 = 15 members on master channel 1, then RPN 0 per member.
        let msgs = midi.messages();
        assert_eq!(msgs[0], [0xB0, cc::RPN_MSB, 0]);
        assert_eq!(msgs[1], [0xB0, cc::RPN_LSB, tecla_midi::rpn::MPE_ZONE]);
        assert_eq!(msgs[2], [0xB0, cc::DATA_ENTRY_MSB, 15]);
        // 4 messages per RPN sequence: zone + 15 member ranges
        assert_eq!(msgs.len(), 4 * 16);
    }

    #[test]
    fn just_intonation_corrects_against_most_recent_note() {
        let config = DispatcherConfig {
            just_intonation: true,
            ..DispatcherConfig::default()
        };
        let (mut d, shared, mut midi) = setup::<12, 4>(config);
        d.key_pressed(0, &shared, &mut midi);
        d.key_pressed(7, &shared, &mut midi); // equal-tempered fifth above

        let root = d.key(0).freq_hz;
        let fifth = d.key(7).freq_hz;
        assert!(
            (fifth / root - 1.5).abs() < 1e-4,
            "fifth retuned to 3:2, got {}",
            fifth / root
        );
        assert_ne!(d.key(7).bend, 0, "bend carries the retune correction");
    }

    #[test]
    fn out_of_order_release_keeps_reference_valid() {
        let config = DispatcherConfig {
            just_intonation: true,
            ..DispatcherConfig::default()
        };
        let (mut d, shared, mut midi) = setup::<12, 8>(config);
        d.key_pressed(0, &shared, &mut midi);
        d.key_pressed(4, &shared, &mut midi);
        d.key_pressed(7, &shared, &mut midi);
        // Release the middle key: the top of the stack (key 7) must remain
        // the reference for the next press.
        d.key_released(4, &shared, &mut midi);
        let reference = d.key(7).freq_hz;
        d.key_pressed(12, &shared, &mut midi); // a fourth above key 7
        let ratio = d.key(12).freq_hz / reference;
        assert!((ratio - 4.0 / 3.0).abs() < 1e-4, "got {ratio}");
    }

    #[test]
    fn mono_release_falls_back_to_previous_held_key() {
        let config = DispatcherConfig {
            mode: PlaybackMode::Mono,
            ..DispatcherConfig::default()
        };
        let (mut d, shared, mut midi) = setup::<8, 4>(config);
        d.key_pressed(0, &shared, &mut midi);
        d.key_pressed(4, &shared, &mut midi);
        assert_eq!(shared.frequency(0), d.key(4).freq_hz);

        d.key_released(4, &shared, &mut midi);
        // The single voice snaps back to key 0's pitch.
        assert_eq!(shared.frequency(0), d.key(0).freq_hz);
        assert_eq!(d.key(0).voice, Some(0));
    }

    #[test]
    fn arpeggiator_cycles_held_keys() {
        let config = DispatcherConfig {
            mode: PlaybackMode::Arpeggio,
            arp_period_us: 1000,
            ..DispatcherConfig::default()
        };
        let (mut d, shared, mut midi) = setup::<8, 4>(config);
        d.key_pressed(0, &shared, &mut midi);
        d.key_pressed(4, &shared, &mut midi);
        assert!(midi.is_empty(), "presses alone make no sound in arp mode");

        d.control_tick(0, &shared, &mut midi);
        assert_eq!(midi.with_status(0x90).count(), 1);
        d.control_tick(1000, &shared, &mut midi);
        d.control_tick(2000, &shared, &mut midi);
        let ons: Vec<u8> = midi.with_status(0x90).map(|m| m[1]).collect();
        assert_eq!(ons, vec![60, 64, 60], "cycles through held keys");
        // Every step but the last also closed the previous note.
        assert_eq!(midi.with_status(0x80).count(), 2);
    }

    #[test]
    fn arp_step_waits_for_the_period() {
        let config = DispatcherConfig {
            mode: PlaybackMode::Arpeggio,
            arp_period_us: 1000,
            ..DispatcherConfig::default()
        };
        let (mut d, shared, mut midi) = setup::<8, 4>(config);
        d.key_pressed(0, &shared, &mut midi);
        d.control_tick(0, &shared, &mut midi);
        d.control_tick(10, &shared, &mut midi);
        d.control_tick(999, &shared, &mut midi);
        assert_eq!(midi.with_status(0x90).count(), 1, "period not yet elapsed");
    }

    #[test]
    fn panic_resets_wire_and_state() {
        let config = DispatcherConfig {
            mpe_forced: true,
            ..DispatcherConfig::default()
        };
        let (mut d, shared, mut midi) = setup::<8, 4>(config);
        d.key_pressed(0, &shared, &mut midi);
        d.key_pressed(1, &shared, &mut midi);
        midi.take();

        d.panic_reset(&shared, &mut midi);

        // CC 120 + CC 123 + bend center on all sixteen channels.
        assert_eq!(midi.len(), 3 * 16);
        assert_eq!(d.held_count(), 0);
        assert_eq!(d.voices().in_use_count(), 0);
        assert_eq!(d.channels().pool_len(), 15);
        for key in 0..8 {
            assert_eq!(d.key(key).channel, 0);
            assert_eq!(d.key(key).voice, None);
        }
    }

    #[test]
    fn retune_preserves_held_assignments() {
        let (mut d, shared, mut midi) = setup::<8, 4>(DispatcherConfig::default());
        d.key_pressed(3, &shared, &mut midi);
        let channel = d.key(3).channel;
        let voice = d.key(3).voice;

        let mut config = *d.config();
        config.transpose = 12;
        // Direct retune (not apply_settings): the path for layout and
        // transpose changes that do not touch the channel decision.
        d.config = config;
        d.retune_all();

        assert_eq!(d.key(3).channel, channel);
        assert_eq!(d.key(3).voice, voice);
        assert_eq!(i32::from(d.key(3).note), 60 + 3 + 12);
    }

    #[test]
    fn global_messages_use_master_channel_under_mpe() {
        let config = DispatcherConfig {
            mpe_forced: true,
            ..DispatcherConfig::default()
        };
        let (d, _shared, mut midi) = setup::<8, 4>(config);
        d.send_modulation(64, &mut midi);
        d.send_program_change(5, &mut midi);
        assert_eq!(midi.messages()[0], [0xB0, cc::MODULATION, 64]);
        assert_eq!(midi.messages()[1], [0xC0, 5]);
    }
}
