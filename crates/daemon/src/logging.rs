// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::lifecycle::{Config, DaemonError};

/// File name prefix of the daily rolling log
const LOG_FILE: &str = "plexusd.log";

/// Install the global subscriber. With a log directory, lines go through a
/// non-blocking writer whose guard must be held until exit.
pub fn init(config: &Config) -> Result<Option<WorkerGuard>, DaemonError> {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| DaemonError::LogDir(dir.clone(), e))?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|e| DaemonError::Logging(e.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| DaemonError::Logging(e.to_string()))?;
            Ok(None)
        }
    }
}
