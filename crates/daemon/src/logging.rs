//! Tracing setup for the daemon
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: `agentwatch=info`)
//! - `AGENTWATCH_LOG_FORMAT`: `json` for structured output, anything else for pretty
//! - `AGENTWATCH_LOG_DIR`: also write JSON lines to a daily-rotated file in this directory

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

const DEFAULT_FILTER: &str = "agentwatch=info";
const LOG_FILE_PREFIX: &str = "agentwatchd.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber. Keep the returned guard alive until exit
/// so buffered file output is flushed.
pub fn init() -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Failed to create env filter")?;

    let log_format = std::env::var("AGENTWATCH_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let mut layers: Vec<BoxedLayer> = Vec::new();
    match log_format.as_str() {
        // Production: JSON structured logging
        "json" => layers.push(fmt::layer().json().boxed()),
        // Development: Pretty formatting with colors
        _ => layers.push(fmt::layer().pretty().boxed()),
    }

    let mut guard = None;
    if let Some(dir) = std::env::var_os("AGENTWATCH_LOG_DIR").map(PathBuf::from) {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
        let (writer, worker_guard) = tracing_appender::non_blocking(appender);
        layers.push(fmt::layer().json().with_ansi(false).with_writer(writer).boxed());
        guard = Some(worker_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
