//! Logging setup: stderr plus a daily rolling file under the state dir.
//!
//! `CK_DEBUG_LOG=1` forces debug level; otherwise `RUST_LOG` applies, falling
//! back to `info`.

use std::env;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "ck-settings.log";

fn filter() -> EnvFilter {
    let debug_enabled = env::var("CK_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// `logs_dir` must already exist. Keep the returned guard alive for the life
/// of the process; dropping it flushes the file writer.
pub fn init(logs_dir: Option<&Path>) -> Option<WorkerGuard> {
    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let Some(dir) = logs_dir else {
        let _ = tracing_subscriber::registry()
            .with(filter())
            .with(stderr)
            .try_init();
        return None;
    };

    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = fmt::layer().with_writer(writer).with_ansi(false);

    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(stderr)
        .with(file)
        .try_init();
    Some(guard)
}
