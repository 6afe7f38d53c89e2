//! The settings file format and its conversion to dispatcher parameters.
//!
//! Settings are stored as TOML with one table per concern. Every field has a
//! serde default, so a partial file — or an empty one — loads cleanly.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use tecla_engine::Waveform;
use tecla_notes::{ChannelRange, DispatcherConfig, PlaybackMode, PoolDiscipline, Tuning};

/// Complete user settings for the instrument core.
///
/// # TOML Format
///
/// ```toml
/// [synth]
/// mode = "poly"
/// waveform = "saw"
/// velocity = 100
/// attack_ms = 10.0
/// decay_ms = 100.0
/// sustain_percent = 70.0
/// release_ms = 200.0
///
/// [midi]
/// mpe = true
/// channel_low = 2
/// channel_high = 16
/// pitch_bend_range = 48
/// discipline = "round-robin"
///
/// [tuning]
/// step_cents = 100.0
/// transpose = 0
/// just_intonation = false
///
/// [arp]
/// tempo_bpm = 120.0
/// division = 4
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Synthesizer voice settings.
    #[serde(default)]
    pub synth: SynthSettings,
    /// MIDI output settings.
    #[serde(default)]
    pub midi: MidiSettings,
    /// Tuning system settings.
    #[serde(default)]
    pub tuning: TuningSettings,
    /// Arpeggiator settings.
    #[serde(default)]
    pub arp: ArpSettings,
}

/// Playback mode, as spelled in the settings file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Polyphonic with voice stealing.
    #[default]
    Poly,
    /// Monophonic, last note priority.
    Mono,
    /// Arpeggiated.
    Arpeggio,
}

impl From<Mode> for PlaybackMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Poly => PlaybackMode::Poly,
            Mode::Mono => PlaybackMode::Mono,
            Mode::Arpeggio => PlaybackMode::Arpeggio,
        }
    }
}

/// Waveform selection, as spelled in the settings file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WaveformSetting {
    /// Sine wave.
    #[default]
    Sine,
    /// Triangle wave.
    Triangle,
    /// Sawtooth wave.
    Saw,
    /// Square wave.
    Square,
    /// Variable-duty pulse wave.
    Pulse,
}

impl From<WaveformSetting> for Waveform {
    fn from(waveform: WaveformSetting) -> Self {
        match waveform {
            WaveformSetting::Sine => Waveform::Sine,
            WaveformSetting::Triangle => Waveform::Triangle,
            WaveformSetting::Saw => Waveform::Saw,
            WaveformSetting::Square => Waveform::Square,
            WaveformSetting::Pulse => Waveform::Pulse,
        }
    }
}

/// Channel pool discipline, as spelled in the settings file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Discipline {
    /// Rotate channels in insertion order.
    #[default]
    RoundRobin,
    /// Always hand out the lowest free channel.
    LowestFirst,
}

impl From<Discipline> for PoolDiscipline {
    fn from(discipline: Discipline) -> Self {
        match discipline {
            Discipline::RoundRobin => PoolDiscipline::RoundRobin,
            Discipline::LowestFirst => PoolDiscipline::LowestFirst,
        }
    }
}

/// Synthesizer voice settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthSettings {
    /// Playback mode.
    #[serde(default)]
    pub mode: Mode,
    /// Oscillator waveform.
    #[serde(default)]
    pub waveform: WaveformSetting,
    /// Note velocity, 0–127.
    #[serde(default = "default_velocity")]
    pub velocity: u8,
    /// Envelope attack in milliseconds.
    #[serde(default = "default_attack_ms")]
    pub attack_ms: f32,
    /// Envelope decay in milliseconds.
    #[serde(default = "default_decay_ms")]
    pub decay_ms: f32,
    /// Envelope sustain, percent of full level.
    #[serde(default = "default_sustain_percent")]
    pub sustain_percent: f32,
    /// Envelope release in milliseconds.
    #[serde(default = "default_release_ms")]
    pub release_ms: f32,
    /// Pulse duty cycle for the pulse waveform.
    #[serde(default = "default_pulse_width")]
    pub pulse_width: f32,
}

fn default_velocity() -> u8 {
    100
}
fn default_attack_ms() -> f32 {
    10.0
}
fn default_decay_ms() -> f32 {
    100.0
}
fn default_sustain_percent() -> f32 {
    70.0
}
fn default_release_ms() -> f32 {
    200.0
}
fn default_pulse_width() -> f32 {
    0.5
}

impl Default for SynthSettings {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            waveform: WaveformSetting::default(),
            velocity: default_velocity(),
            attack_ms: default_attack_ms(),
            decay_ms: default_decay_ms(),
            sustain_percent: default_sustain_percent(),
            release_ms: default_release_ms(),
            pulse_width: default_pulse_width(),
        }
    }
}

/// MIDI output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MidiSettings {
    /// Force MPE on even when the tuning does not require it.
    #[serde(default)]
    pub mpe: bool,
    /// Lowest MPE member channel.
    #[serde(default = "default_channel_low")]
    pub channel_low: u8,
    /// Highest MPE member channel.
    #[serde(default = "default_channel_high")]
    pub channel_high: u8,
    /// Pitch-bend sensitivity advertised per channel, in semitones.
    #[serde(default = "default_pitch_bend_range")]
    pub pitch_bend_range: u8,
    /// Channel pool discipline.
    #[serde(default)]
    pub discipline: Discipline,
}

fn default_channel_low() -> u8 {
    2
}
fn default_channel_high() -> u8 {
    16
}
fn default_pitch_bend_range() -> u8 {
    48
}

impl Default for MidiSettings {
    fn default() -> Self {
        Self {
            mpe: false,
            channel_low: default_channel_low(),
            channel_high: default_channel_high(),
            pitch_bend_range: default_pitch_bend_range(),
            discipline: Discipline::default(),
        }
    }
}

/// Tuning system settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TuningSettings {
    /// Size of one musical step in cents.
    #[serde(default = "default_step_cents")]
    pub step_cents: f32,
    /// MIDI note number at step 0.
    #[serde(default = "default_anchor_note")]
    pub anchor_note: u8,
    /// Frequency at step 0 in Hz.
    #[serde(default = "default_anchor_hz")]
    pub anchor_hz: f32,
    /// Steps added to every key.
    #[serde(default)]
    pub transpose: i32,
    /// Retune intervals to low-integer ratios against the reference note.
    #[serde(default)]
    pub just_intonation: bool,
}

fn default_step_cents() -> f32 {
    100.0
}
fn default_anchor_note() -> u8 {
    60
}
fn default_anchor_hz() -> f32 {
    261.6256
}

impl Default for TuningSettings {
    fn default() -> Self {
        Self {
            step_cents: default_step_cents(),
            anchor_note: default_anchor_note(),
            anchor_hz: default_anchor_hz(),
            transpose: 0,
            just_intonation: false,
        }
    }
}

/// Arpeggiator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArpSettings {
    /// Tempo in beats per minute.
    #[serde(default = "default_tempo_bpm")]
    pub tempo_bpm: f32,
    /// Steps per beat.
    #[serde(default = "default_division")]
    pub division: u32,
}

fn default_tempo_bpm() -> f32 {
    120.0
}
fn default_division() -> u32 {
    4
}

impl Default for ArpSettings {
    fn default() -> Self {
        Self {
            tempo_bpm: default_tempo_bpm(),
            division: default_division(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Ok(toml::from_str(&content)?)
    }

    /// Load settings from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the settings to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Arpeggiator step period in microseconds.
    pub fn arp_period_us(&self) -> u64 {
        let steps_per_second = self.tempo_steps_per_second();
        if steps_per_second <= 0.0 {
            return 0;
        }
        (1_000_000.0 / steps_per_second) as u64
    }

    fn tempo_steps_per_second(&self) -> f32 {
        self.arp.tempo_bpm / 60.0 * self.arp.division.max(1) as f32
    }

    /// Flatten into the dispatcher's plain parameter struct.
    ///
    /// Run [`validate`](crate::validation::validate) first; this conversion
    /// assumes in-range values and only performs unit changes.
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            mode: self.synth.mode.into(),
            waveform: self.synth.waveform.into(),
            pulse_width: self.synth.pulse_width,
            velocity: self.synth.velocity,
            attack_ms: self.synth.attack_ms,
            decay_ms: self.synth.decay_ms,
            sustain: self.synth.sustain_percent / 100.0,
            release_ms: self.synth.release_ms,
            tuning: Tuning {
                step_cents: self.tuning.step_cents,
                anchor_note: self.tuning.anchor_note,
                anchor_hz: self.tuning.anchor_hz,
                bend_range: self.midi.pitch_bend_range,
            },
            just_intonation: self.tuning.just_intonation,
            transpose: self.tuning.transpose,
            mpe_forced: self.midi.mpe,
            range: ChannelRange {
                low: self.midi.channel_low,
                high: self.midi.channel_high,
            },
            discipline: self.midi.discipline.into(),
            arp_period_us: self.arp_period_us(),
        }
    }
}
