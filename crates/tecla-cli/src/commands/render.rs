//! Offline rendering: run the control loop and engine tick-by-tick and write
//! the PWM output to a WAV file.

use anyhow::Context;
use clap::Args;
use std::path::PathBuf;

use crate::script::{self, ScriptEvent};
use crate::{FIRST_STEP, KEYS, VOICES};
use tecla_engine::{BufferSink, Engine, EngineShared};
use tecla_midi::transport::BufferTransport;
use tecla_notes::{Dispatcher, Layout};

#[derive(Args)]
pub struct RenderArgs {
    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Key script file (the built-in demo when omitted)
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Settings TOML file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Audio tick rate in Hz (doubles as the WAV sample rate)
    #[arg(long, default_value = "31250")]
    tick_rate: u32,

    /// Extra tail after the last event, in milliseconds
    #[arg(long, default_value = "500")]
    tail_ms: u64,

    /// Print every MIDI message the run produced
    #[arg(long)]
    midi_log: bool,
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    let events = match &args.script {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading script {}", path.display()))?;
            script::parse(&text)?
        }
        None => script::demo(),
    };
    let config = super::load_dispatcher_config(args.settings.as_deref())?;

    let tick_hz = args.tick_rate as f32;
    let shared: EngineShared<VOICES> = EngineShared::new();
    let mut engine: Engine<VOICES> = Engine::new(tick_hz);
    let mut dispatcher: Dispatcher<KEYS, VOICES> =
        Dispatcher::new(Layout::linear(FIRST_STEP), tick_hz);
    let mut midi = BufferTransport::new();
    let mut sink = BufferSink::new();

    dispatcher.apply_settings(config, &shared, &mut midi);

    let end_ms = events.last().map_or(0, |e| e.at_ms) + args.tail_ms;
    let total_ticks = (end_ms * u64::from(args.tick_rate)).div_ceil(1000);
    let mut pending: &[ScriptEvent] = &events;

    for tick in 0..total_ticks {
        let now_us = tick * 1_000_000 / u64::from(args.tick_rate);
        while let Some(event) = pending.first() {
            if event.at_ms * 1000 > now_us {
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
        engine.tick_into(&shared, &mut sink);
    }

    write_wav(&args.output, sink.samples(), args.tick_rate)?;
    tracing::info!(
        path = %args.output.display(),
        ticks = total_ticks,
        messages = midi.len(),
        "render complete"
    );

    if args.midi_log {
        for message in midi.messages() {
            let hex: Vec<String> = message.iter().map(|b| format!("{b:02X}")).collect();
            println!("{}", hex.join(" "));
        }
    }
    Ok(())
}

/// Write the 8-bit duty samples as a 16-bit mono WAV.
fn write_wav(path: &PathBuf, samples: &[u8], sample_rate: u32) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    for &duty in samples {
        writer.write_sample((i16::from(duty) - 128) << 8)?;
    }
    writer.finalize()?;
    Ok(())
}
