//! GPU-accelerated terminal workspace core.

pub mod card;
pub mod config;
pub mod error;
pub mod event;
pub mod gpu;
pub mod host;
pub mod object;
pub mod shader;
pub mod tile;
pub mod widget;
pub mod window;
pub mod wire;

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;

/// Installs the global `tracing` subscriber, writing to a rolling log file beside
/// the executable. Returns the worker guard — the caller must hold it for the
/// lifetime of the process, or buffered log lines are dropped on exit.
///
/// Safe to call more than once; only the first call installs the subscriber, later
/// calls log and return `None`.
pub fn init_logging(log_dir: &Path) -> Option<WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(log_dir, "yetty.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(writer)
        .try_init()
    {
        Ok(()) => Some(guard),
        Err(_) => {
            tracing::warn!(target: "yetty.startup", "tracing subscriber already installed");
            None
        }
    }
}
