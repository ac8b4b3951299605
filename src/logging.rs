//! Tracing setup: stderr for the operator, a daily file for the record.

use anyhow::Result;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "assistant-relay.log";

/// Install the global subscriber described by `config`.
///
/// `RUST_LOG` overrides `config.filter`. Keep the returned guard alive for
/// the whole process; dropping it flushes and closes the file writer.
pub fn init(config: &LoggingConfig) -> Result<(WorkerGuard, PathBuf)> {
    let log_dir = config.resolved_dir()?;
    std::fs::create_dir_all(&log_dir)?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX));

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.filter))?;

    // Exactly one of these is installed.
    let json_file = config.json.then(|| {
        fmt::layer()
            .json()
            .with_writer(writer.clone())
            .with_current_span(false)
    });
    let text_file = (!config.json).then(|| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_thread_ids(true)
            .with_line_number(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_file)
        .with(text_file)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();

    tracing::debug!("Writing logs to {}", log_dir.display());
    Ok((guard, log_dir))
}
