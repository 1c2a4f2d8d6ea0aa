//! # Structured Logging
//!
//! Provides structured logging macros and utilities using the tracing ecosystem.
//!
//! Engine verbosity is an explicit [`LogSeverity`] value carried by the
//! engine rather than process-wide state: [`engine_log!`](crate::engine_log)
//! drops events below the engine's severity before they reach the
//! subscriber, so two engines in one process can log at different levels.

use std::fmt;
use std::str::FromStr;

use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;
use crate::errors::{Error, Result};

/// Minimum level of engine events that are emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSeverity(LevelFilter);

impl LogSeverity {
    pub const OFF: LogSeverity = LogSeverity(LevelFilter::OFF);
    pub const ERROR: LogSeverity = LogSeverity(LevelFilter::ERROR);
    pub const WARN: LogSeverity = LogSeverity(LevelFilter::WARN);
    pub const INFO: LogSeverity = LogSeverity(LevelFilter::INFO);
    pub const DEBUG: LogSeverity = LogSeverity(LevelFilter::DEBUG);
    pub const TRACE: LogSeverity = LogSeverity(LevelFilter::TRACE);

    pub fn new(filter: LevelFilter) -> Self {
        Self(filter)
    }

    /// True when events at `level` pass this severity
    pub fn enabled(&self, level: Level) -> bool {
        self.0 >= level
    }

    pub fn filter(&self) -> LevelFilter {
        self.0
    }
}

impl Default for LogSeverity {
    fn default() -> Self {
        Self::INFO
    }
}

impl fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for LogSeverity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<LevelFilter>()
            .map(LogSeverity)
            .map_err(|_| Error::config(format!("Invalid log level '{}'", s)))
    }
}

/// Emit a tracing event only when the given [`LogSeverity`] allows its level.
///
/// ```rust,ignore
/// engine_log!(self.severity, WARN, key = %key, "Skipping malformed record");
/// ```
#[macro_export]
macro_rules! engine_log {
    ($severity:expr, ERROR, $($arg:tt)+) => {
        if $severity.enabled(tracing::Level::ERROR) { tracing::error!($($arg)+); }
    };
    ($severity:expr, WARN, $($arg:tt)+) => {
        if $severity.enabled(tracing::Level::WARN) { tracing::warn!($($arg)+); }
    };
    ($severity:expr, INFO, $($arg:tt)+) => {
        if $severity.enabled(tracing::Level::INFO) { tracing::info!($($arg)+); }
    };
    ($severity:expr, DEBUG, $($arg:tt)+) => {
        if $severity.enabled(tracing::Level::DEBUG) { tracing::debug!($($arg)+); }
    };
    ($severity:expr, TRACE, $($arg:tt)+) => {
        if $severity.enabled(tracing::Level::TRACE) { tracing::trace!($($arg)+); }
    };
}

/// Create a tracing span for one watch session
#[macro_export]
macro_rules! watch_span {
    ($prefix:expr, $from_revision:expr) => {
        tracing::info_span!(
            "watch",
            prefix = %$prefix,
            from_revision = $from_revision,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($prefix:expr, $from_revision:expr, $($field:tt)*) => {
        tracing::info_span!(
            "watch",
            prefix = %$prefix,
            from_revision = $from_revision,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for store operations
#[macro_export]
macro_rules! store_span {
    ($operation:expr) => {
        tracing::debug_span!(
            "store_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "store_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install a global subscriber for embedding binaries.
///
/// `RUST_LOG` takes precedence over `config.level` when set. Fails when a
/// global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let severity: LogSeverity = config.level.parse()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(severity.to_string()));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| {
        Error::config_with_source("Failed to install tracing subscriber", Box::new(e))
    })
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::EngineConfig) {
    tracing::info!(
        root_key = %config.root_key,
        consistency = ?config.consistency,
        channel_capacity = config.watch.channel_capacity,
        vanished_policy = ?config.vanished_policy,
        sealing_enabled = config.seal_key.is_some(),
        "routeplane engine configuration"
    );
}
