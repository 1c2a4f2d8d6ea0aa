//! # Configuration Management
//!
//! Engine configuration with validation, loadable from `ROUTEPLANE_*`
//! environment variables.

pub mod settings;

pub use settings::{
    Consistency, EngineConfig, LogConfig, VanishedPolicy, WatchConfig, DEFAULT_ROOT_KEY,
};
