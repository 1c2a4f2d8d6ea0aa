//! # Observability Infrastructure
//!
//! Structured logging with an explicit engine severity, span macros for
//! watch sessions and store calls, and engine metrics.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_config_info, LogSeverity};
pub use metrics::MetricsRecorder;
