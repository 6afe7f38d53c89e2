//! Tecla CLI - host-side harness for the tecla firmware core.
//!
//! Runs the control loop and audio engine on a desktop machine: render key
//! scripts offline to WAV, play them live through the system output, and
//! inspect settings files.

mod commands;
mod script;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Keys the simulated instrument exposes (a 61-key chromatic field).
pub const KEYS: usize = 61;
/// Polyphony limit of the simulated engine.
pub const VOICES: usize = 8;
/// Key index of the layout's first step, placed two octaves below middle C.
pub const FIRST_STEP: i32 = -24;

#[derive(Parser)]
#[command(name = "tecla")]
#[command(author, version, about = "Tecla firmware core host CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a key script offline to a WAV file
    Render(commands::render::RenderArgs),

    /// Play a key script live through the default audio output
    Play(commands::play::PlayArgs),

    /// Inspect, validate, or create settings files
    Settings(commands::settings::SettingsArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Render(args) => commands::render::run(args),
        Commands::Play(args) => commands::play::run(args),
        Commands::Settings(args) => commands::settings::run(args),
    }
}
