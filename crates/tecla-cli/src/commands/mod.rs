//! CLI subcommands.

pub mod play;
pub mod render;
pub mod settings;

use anyhow::Context;
use std::path::Path;
use tecla_config::Settings;
use tecla_notes::DispatcherConfig;

/// Load, validate, and flatten a settings file (or the defaults).
pub fn load_dispatcher_config(path: Option<&Path>) -> anyhow::Result<DispatcherConfig> {
    let mut settings = match path {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    let adjustments = tecla_config::validate(&mut settings)?;
    for adjustment in &adjustments {
        tracing::warn!(field = adjustment.field, "{}", adjustment.message);
    }
    Ok(settings.dispatcher_config())
}
