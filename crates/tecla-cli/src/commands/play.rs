//! Live playback: the engine ticks inside the cpal output callback (standing
//! in for the audio-core interrupt) while the control loop runs on the main
//! thread, exactly the two-context split of the device.

use anyhow::{Context, anyhow};
use clap::Args;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::script::{self, ScriptEvent};
use crate::{FIRST_STEP, KEYS, VOICES};
use tecla_engine::{Engine, EngineShared};
use tecla_midi::transport::{BufferTransport, MidiTransport};
use tecla_notes::{Dispatcher, Layout};

#[derive(Args)]
pub struct PlayArgs {
    /// Key script file (the built-in demo when omitted)
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Settings TOML file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Print MIDI messages as they are sent
    #[arg(long)]
    midi_log: bool,
}

/// Prints each message as hex when enabled, buffers otherwise.
struct LoggingTransport {
    inner: BufferTransport,
    echo: bool,
}

impl MidiTransport for LoggingTransport {
    fn send(&mut self, bytes: &[u8]) {
        if self.echo {
            let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
            println!("midi: {}", hex.join(" "));
        }
        self.inner.send(bytes);
    }
}

pub fn run(args: PlayArgs) -> anyhow::Result<()> {
    let events = match &args.script {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading script {}", path.display()))?;
            script::parse(&text)?
        }
        None => script::demo(),
    };
    let config = super::load_dispatcher_config(args.settings.as_deref())?;

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("no default audio output device"))?;
    let stream_config = device.default_output_config()?;
    let sample_rate = stream_config.sample_rate();
    let channels = stream_config.channels() as usize;
    tracing::info!(
        device = device.name().unwrap_or_else(|_| "unknown".into()),
        sample_rate,
        "audio output ready"
    );

    let shared: Arc<EngineShared<VOICES>> = Arc::new(EngineShared::new());
    let mut engine: Engine<VOICES> = Engine::new(sample_rate as f32);
    let audio_shared = Arc::clone(&shared);

    let stream = device.build_output_stream(
        &stream_config.into(),
        move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
            for frame in data.chunks_mut(channels) {
                let duty = engine.tick(&audio_shared);
                let sample = (f32::from(duty) - 128.0) / 128.0;
                frame.fill(sample);
            }
        },
        |err| tracing::error!("audio stream error: {err}"),
        None,
    )?;
    stream.play()?;

    let mut dispatcher: Dispatcher<KEYS, VOICES> =
        Dispatcher::new(Layout::linear(FIRST_STEP), sample_rate as f32);
    let mut midi = LoggingTransport {
        inner: BufferTransport::new(),
        echo: args.midi_log,
    };
    dispatcher.apply_settings(config, &shared, &mut midi);

    let started = Instant::now();
    let mut pending: &[ScriptEvent] = &events;
    let end_ms = events.last().map_or(0, |e| e.at_ms) + 1000;

    // The host control loop: ~1 kHz, like the device's scan cadence.
    while started.elapsed() < Duration::from_millis(end_ms) {
        let now_us = started.elapsed().as_micros() as u64;
        while let Some(event) = pending.first() {
            if u128::from(event.at_ms) * 1000 > u128::from(now_us) {
                break;
            }
            if event.down {
                dispatcher.key_pressed(event.key, &shared, &mut midi);
            } else {
                dispatcher.key_released(event.key, &shared, &mut midi);
            }
            pending = &pending[1..];
        }
        dispatcher.control_tick(now_us, &shared, &mut midi);
        std::thread::sleep(Duration::from_millis(1));
    }

    dispatcher.release_all(&shared, &mut midi);
    std::thread::sleep(Duration::from_millis(300));
    drop(stream);
    tracing::info!(messages = midi.inner.len(), "playback complete");
    Ok(())
}
