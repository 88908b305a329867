use std::fs::OpenOptions;
use std::path::Path;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;

use crate::cli::LogLevel;
use crate::error::{ConfigError, Result};

/// Installs the global `tracing` subscriber per `--log`/`--log_level` (§4.0 Logging):
/// a file sink when `--log` is given, stderr otherwise.
pub fn install(log: Option<&Path>, level: LogLevel, verbose: bool) -> Result<()> {
    let directive = if verbose { "mecctl=trace,debug".to_string() } else { format!("mecctl={level},info") };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if let Some(path) = log {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::Tracing(format!("creating log dir: {e}")))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ConfigError::Tracing(format!("opening log file: {e}")))?;

        let file_layer =
            tracing_subscriber::fmt::layer().with_writer(file).with_ansi(false).with_span_events(FmtSpan::CLOSE);

        tracing_subscriber::registry().with(filter).with(file_layer).init();
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}
