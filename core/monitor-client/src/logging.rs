//! Logging setup.
//!
//! Stdout carries the status line, so diagnostics go to a daily log file under
//! `~/.blinkrise/logs`, or to stderr when that directory is unusable.

use std::env;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEBUG_ENV: &str = "BLINKRISE_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "blinkrise.log";

pub fn init() -> Option<WorkerGuard> {
    let filter = env_filter();

    match log_dir() {
        Some(dir) if fs_err::create_dir_all(&dir).is_ok() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

fn env_filter() -> EnvFilter {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn log_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".blinkrise").join("logs"))
}
