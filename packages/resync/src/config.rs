use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use dotenvy::dotenv;

use crate::error::SyncError;

/// Default quiet period before a burst of push events is delivered.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Default number of queued push events above which the bus starts warning.
pub const DEFAULT_BACKLOG_WARNING: usize = 1024;

/// Synchronization core configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quiet period that must follow the last push event before delivery.
    pub debounce: Duration,
    /// Buffered push events above which a burst is logged at `warn`.
    ///
    /// Only a logging threshold: the bus never drops events. 0 disables it.
    pub backlog_warning: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            backlog_warning: DEFAULT_BACKLOG_WARNING,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables
    ///
    /// - `RESYNC_DEBOUNCE_MS` (default 100)
    /// - `RESYNC_BACKLOG_WARNING` (default 1024, 0 disables)
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let debounce_ms: u64 = var_or("RESYNC_DEBOUNCE_MS", DEFAULT_DEBOUNCE.as_millis() as u64)?;
        let backlog_warning: usize = var_or("RESYNC_BACKLOG_WARNING", DEFAULT_BACKLOG_WARNING)?;

        Ok(Self::default()
            .with_debounce(Duration::from_millis(debounce_ms))
            .with_backlog_warning(backlog_warning))
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_backlog_warning(mut self, backlog_warning: usize) -> Self {
        self.backlog_warning = backlog_warning;
        self
    }
}

fn var_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => parse_setting(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_setting<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| {
        SyncError::Config {
            message: format!("{name}={raw:?}: {e}"),
        }
        .into()
    })
}
