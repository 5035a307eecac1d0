//! Logging setup for bisync
//!
//! Console output always goes to stderr. With `--log-file`, a second,
//! more detailed layer writes plain text to that file through a
//! non-blocking appender.

use std::path::Path;

use color_eyre::Result;
use color_eyre::eyre::{WrapErr as _, eyre};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::Layer as _;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// File log guard - keeps the background writer alive and flushes on drop
pub struct LogGuard {
    _guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Initialize console logging and, if requested, the file layer.
///
/// The guard must be kept alive for the duration of the program.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<LogGuard> {
    let console_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_level);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| eyre!("invalid log file path {}", path.display()))?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));

            let appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(file_name)
                .build(dir)
                .wrap_err_with(|| format!("failed to open log file {}", path.display()))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);

            // File filter: everything from our crates unless RUST_LOG says otherwise
            let file_filter = tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("warn,bisync=trace,bisync_core=trace")
                });
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_filter(file_filter);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .wrap_err("failed to install the tracing subscriber")?;

    Ok(LogGuard { _guard: guard })
}
