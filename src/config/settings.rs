//! # Configuration Settings
//!
//! Defines the configuration structure for the routeplane engine.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::errors::{Error, Result};
use crate::keys::KeyLayout;
use crate::observability::LogSeverity;
use crate::secret::{SecretBoundary, SecretBox};
use crate::store::ReadConsistency;

/// Default configuration root
pub const DEFAULT_ROOT_KEY: &str = "/routeplane";

/// Engine configuration
#[derive(Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EngineConfig {
    /// Key under which the whole configuration tree lives
    #[validate(custom(function = "validate_root_key"))]
    pub root_key: String,

    /// Read guarantee for bulk and point reads
    pub consistency: Consistency,

    #[validate(nested)]
    pub watch: WatchConfig,

    /// What the watch does when a Put's entity is gone by the time it is read
    pub vanished_policy: VanishedPolicy,

    #[validate(nested)]
    pub log: LogConfig,

    /// Base64 32-byte key enabling the secret box; `None` disables sealing
    #[serde(skip_serializing)]
    pub seal_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root_key: DEFAULT_ROOT_KEY.to_string(),
            consistency: Consistency::default(),
            watch: WatchConfig::default(),
            vanished_policy: VanishedPolicy::default(),
            log: LogConfig::default(),
            seal_key: None,
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("root_key", &self.root_key)
            .field("consistency", &self.consistency)
            .field("watch", &self.watch)
            .field("vanished_policy", &self.vanished_policy)
            .field("log", &self.log)
            .field("seal_key", &self.seal_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl EngineConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let root_key =
            std::env::var("ROUTEPLANE_ROOT_KEY").unwrap_or_else(|_| defaults.root_key.clone());

        let consistency = match std::env::var("ROUTEPLANE_CONSISTENCY") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.consistency,
        };

        let channel_capacity = match std::env::var("ROUTEPLANE_WATCH_CHANNEL_CAPACITY") {
            Ok(value) => value.parse().map_err(|e| {
                Error::config(format!("Invalid ROUTEPLANE_WATCH_CHANNEL_CAPACITY: {}", e))
            })?,
            Err(_) => defaults.watch.channel_capacity,
        };

        let vanished_policy = match std::env::var("ROUTEPLANE_VANISHED_POLICY") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.vanished_policy,
        };

        let level =
            std::env::var("ROUTEPLANE_LOG_LEVEL").unwrap_or_else(|_| defaults.log.level.clone());

        let json = match std::env::var("ROUTEPLANE_LOG_JSON") {
            Ok(value) => parse_bool(&value)
                .ok_or_else(|| Error::config(format!("Invalid ROUTEPLANE_LOG_JSON: {}", value)))?,
            Err(_) => defaults.log.json,
        };

        let seal_key = std::env::var("ROUTEPLANE_SEAL_KEY").ok().filter(|k| !k.trim().is_empty());

        let config = Self {
            root_key,
            consistency,
            watch: WatchConfig { channel_capacity },
            vanished_policy,
            log: LogConfig { level, json },
            seal_key,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;

        if let Some(seal_key) = &self.seal_key {
            SecretBox::from_base64_key(seal_key).map_err(|e| {
                Error::validation_field(format!("seal_key is unusable: {}", e), "seal_key")
            })?;
        }

        Ok(())
    }

    pub fn key_layout(&self) -> Result<KeyLayout> {
        KeyLayout::new(self.root_key.clone())
    }

    pub fn read_consistency(&self) -> ReadConsistency {
        self.consistency.into()
    }

    /// Secret boundary backed by [`SecretBox`] when a seal key is configured
    pub fn secret_boundary(&self) -> Result<SecretBoundary> {
        match &self.seal_key {
            Some(seal_key) => {
                Ok(SecretBoundary::new(Arc::new(SecretBox::from_base64_key(seal_key)?)))
            }
            None => Ok(SecretBoundary::disabled()),
        }
    }
}

/// Consistency requested from the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Consistency {
    /// Linearizable reads
    #[default]
    Strong,
    /// Serializable reads, possibly stale
    Weak,
}

impl FromStr for Consistency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STRONG" => Ok(Consistency::Strong),
            "WEAK" => Ok(Consistency::Weak),
            other => Err(Error::config(format!(
                "Invalid consistency '{}': expected STRONG or WEAK",
                other
            ))),
        }
    }
}

impl From<Consistency> for ReadConsistency {
    fn from(consistency: Consistency) -> Self {
        match consistency {
            Consistency::Strong => ReadConsistency::Linearizable,
            Consistency::Weak => ReadConsistency::Serializable,
        }
    }
}

/// Handling of a Put whose entity is gone when re-read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VanishedPolicy {
    /// Log the mutation and move on; the Delete that follows reports the removal
    #[default]
    #[serde(rename = "skip")]
    Skip,
    /// Emit the family's Deleted event for the key
    #[serde(rename = "delete")]
    TreatAsDelete,
}

impl FromStr for VanishedPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(VanishedPolicy::Skip),
            "delete" => Ok(VanishedPolicy::TreatAsDelete),
            other => Err(Error::config(format!(
                "Invalid vanished policy '{}': expected skip or delete",
                other
            ))),
        }
    }
}

/// Watch loop configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct WatchConfig {
    /// Capacity of the event channel between the watch and its consumer
    #[validate(range(
        min = 1,
        max = 65536,
        message = "Channel capacity must be between 1 and 65536"
    ))]
    pub channel_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { channel_capacity: 1024 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LogConfig {
    /// Engine log severity: trace, debug, info, warn, error or off
    #[validate(custom(function = "validate_log_level"))]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

impl LogConfig {
    pub fn severity(&self) -> Result<LogSeverity> {
        self.level.parse()
    }
}

fn validate_root_key(root_key: &str) -> std::result::Result<(), ValidationError> {
    if root_key.len() < 2 || !root_key.starts_with('/') || root_key.ends_with('/') {
        return Err(ValidationError::new("root_key_format")
            .with_message("Root key must start with '/' and not end with '/'".into()));
    }
    Ok(())
}

fn validate_log_level(level: &str) -> std::result::Result<(), ValidationError> {
    level
        .parse::<LogSeverity>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("log_level").with_message("Unknown log level".into()))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
