use std::{fs::File, path::Path, sync::OnceLock};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs the file logger once; later calls are no-ops.
pub fn setup_logger(
    log_dir: &Path,
    level: &str,
    _endpoint: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    let file = File::create(log_dir.join("accountsync.log"))?;
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file);
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer()
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(non_blocking_writer)
        .with_filter(filter);

    LOG_GUARD.set(guard).ok();

    tracing_subscriber::registry().with(file_layer).try_init().ok();

    Ok(())
}

/// The file writer flushes on its own worker; nothing to export.
pub fn shutdown() {}
