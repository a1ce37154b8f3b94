//! Tracing subscriber setup for the CLI.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{prelude::*, EnvFilter};

pub const DEFAULT_LEVEL: &str = "warn";

/// Pick the filter directive: command-line flag, then `RUST_LOG`, then config.
pub fn resolve_filter(flag: Option<&str>, env: Option<&str>, config: Option<&str>) -> String {
    [flag, env, config]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(DEFAULT_LEVEL)
        .to_string()
}

/// Install the global subscriber. Logs go to stderr so stdout stays
/// parseable, or are appended to `file` without colour.
pub fn init(filter: &str, file: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_new(filter)
        .with_context(|| format!("invalid log filter '{}'", filter))?;

    match file {
        Some(path) => {
            let f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Mutex::new(f))
                        .with_ansi(false)
                        .with_target(false),
                )
                .try_init()?;
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false),
                )
                .try_init()?;
        }
    }
    Ok(())
}
