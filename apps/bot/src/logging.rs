use std::{
    env::var_os,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FILE: &str = "bot.log";
const DEFAULT_LOG_DIR: &str = "logs";

/// `LOG_DIR`, or `logs` next to the working directory.
pub fn log_dir() -> PathBuf {
    var_os("LOG_DIR")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR))
}

/// Non-blocking writer appending to `{dir}/bot.log`.
/// Lines still queued are written when the guard drops.
pub fn file_writer(dir: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(dir)
        .with_context(|| format!("cannot create log directory {}", dir.display()))?;

    Ok(tracing_appender::non_blocking(
        tracing_appender::rolling::never(dir, LOG_FILE),
    ))
}

/// Console output plus a plain-text copy in the log file, both filtered by
/// `RUST_LOG` (default `info`). Keep the guard alive for the whole run.
pub fn init(dir: &Path) -> Result<WorkerGuard> {
    let (writer, guard) = file_writer(dir)?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::info;

    #[test]
    fn events_are_appended_to_the_log_file() {
        let dir = std::env::temp_dir().join(format!("stockbot-logs-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let (writer, guard) = file_writer(&dir).unwrap();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(writer)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            info!(user_id = 42u64, "notification sent");
        });
        drop(guard);

        let written = fs::read_to_string(dir.join(LOG_FILE)).unwrap();
        assert!(written.contains("notification sent"));
        assert!(written.contains("user_id=42"));
        assert!(!written.contains('\u{1b}'));

        fs::remove_dir_all(&dir).unwrap();
    }
}
