//! tracing subscriber setup.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

use crate::config::{LogFormat, LoggingSection, resolve};

const VERBOSE_FILTER: &str = "scrapechat=debug,tower_http=debug";

/// Pick the filter directive. Precedence: `--log-level`, `--verbose`,
/// `RUST_LOG`, then `[logging] level`.
pub fn filter_directive(
    logging: &LoggingSection,
    level_override: Option<&str>,
    verbose: bool,
    rust_log: Option<&str>,
) -> String {
    if let Some(level) = level_override.filter(|l| !l.trim().is_empty()) {
        return level.to_string();
    }
    if verbose {
        return VERBOSE_FILTER.to_string();
    }
    match rust_log {
        Some(env) if !env.trim().is_empty() => env.to_string(),
        _ => logging.level.clone(),
    }
}

/// Install the global subscriber. Hold the returned guard for the life of
/// the process when a log file is configured, or buffered lines are lost.
pub fn init(
    logging: &LoggingSection,
    base_dir: &Path,
    level_override: Option<&str>,
    verbose: bool,
) -> Result<Option<WorkerGuard>> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(logging, level_override, verbose, rust_log.as_deref());
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("Invalid log filter: {}", directive))?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(match logging.format {
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        LogFormat::Pretty => fmt::layer().with_writer(std::io::stderr).boxed(),
    });

    let mut guard = None;
    if let Some(file) = &logging.file {
        let path = resolve(base_dir, file);
        let dir = path.parent().unwrap_or(base_dir);
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "scrapechat.log".to_string());

        let appender = tracing_appender::rolling::daily(dir, name);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        layers.push(match logging.format {
            LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
            LogFormat::Pretty => fmt::layer().with_ansi(false).with_writer(writer).boxed(),
        });
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
