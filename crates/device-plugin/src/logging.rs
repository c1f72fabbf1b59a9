//! provides logging helpers

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;
use tracing_subscriber::Registry;

/// initiate the global tracing subscriber
///
/// Logs always go to stderr; with `log_file` they are also written to a
/// daily rotated file whose writer lives as long as the returned guard.
pub fn init<P: AsRef<Path>>(log_file: Option<P>) -> anyhow::Result<Option<WorkerGuard>> {
    let fmt_layer = utils::logging::get_fmt_layer::<Registry>();

    let Some(log_file) = log_file else {
        registry().with(fmt_layer).try_init()?;
        return Ok(None);
    };

    let log_file = log_file.as_ref();
    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let prefix = log_file
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow::anyhow!("invalid log file name: {}", log_file.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(3)
        .build(dir)?;
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);

    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy();
    let file_layer = layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_filter(env_filter);

    registry().with(fmt_layer).with(file_layer).try_init()?;
    Ok(Some(file_guard))
}
