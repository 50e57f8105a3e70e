use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

pub const DEFAULT_FILTER: &str = "app_kernel=debug,tower_http=info,axum=info";

/// Installs the global subscriber: console output filtered by `RUST_LOG`
/// and, when `logs_dir` is given, a daily rolling `kernel.<date>.log` file.
///
/// Keep the returned guard alive for as long as file logging should flush.
pub fn init(logs_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let mut layers = vec![fmt::layer().compact().boxed()];
    let guard = match logs_dir {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("kernel")
                .filename_suffix("log")
                .max_log_files(10)
                .build(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(fmt::layer().with_writer(writer).with_ansi(false).boxed());
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()?;
    Ok(guard)
}
