//! Logging initialization using the `tracing` ecosystem.
//!
//! Console output is always on. When a log directory is configured, a second
//! layer writes plain-text lines to a daily-rotating file through a
//! non-blocking writer, so WebSocket receive loops never stall on disk I/O.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `log_level`. Files are named
/// `<gateway_name>.<date>` inside `log_dir`.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// lifetime of the process.
pub fn init_logging(
    log_level: &str,
    log_dir: Option<&str>,
    gateway_name: &str,
) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = fmt::layer().with_target(true).with_thread_ids(true).with_ansi(true);

    let Some(dir) = log_dir else {
        tracing_subscriber::registry().with(env_filter).with(console_layer).init();
        return None;
    };

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, gateway_name));
    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    tracing_subscriber::registry().with(env_filter).with(console_layer).with(file_layer).init();
    Some(guard)
}
