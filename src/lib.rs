//! # Routeplane
//!
//! Routeplane keeps a reverse proxy's routing configuration in sync with a
//! revisioned key-value store. The configuration tree (hosts, listeners,
//! frontends with middlewares, backends with servers) lives under one root
//! key; routeplane turns it into typed entities and keeps them current.
//!
//! ## Architecture
//!
//! ```text
//! KvStore ──bulk read──→ Snapshot Assembler ──→ Snapshot
//!    │                          ↑ decoders (registry, secret boundary)
//!    └──subscribe──→ Watch Loop → Change Classifier ──→ WatchEvent
//! ```
//!
//! ## Core Components
//!
//! - **Key Paths** ([`keys`]): key grammar and the per-family key table
//! - **Secret Boundary** ([`secret`]): sealing of host key pairs
//! - **Engine** ([`engine`]): bootstrap, watch, point reads and writes
//! - **Driver** ([`driver`]): bootstrap-and-watch loop with backoff
//! - **Store** ([`store`]): the store trait and an in-memory implementation
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use routeplane::{Engine, EngineConfig, MemoryStore, Result, WatchEvent};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = EngineConfig::from_env()?;
//!     let engine = Engine::from_config(Arc::new(MemoryStore::new()), &config)?;
//!
//!     let snapshot = engine.bootstrap().await?;
//!     let (tx, mut rx) = mpsc::channel::<WatchEvent>(config.watch.channel_capacity);
//!     let cancel = CancellationToken::new();
//!     tokio::spawn(async move {
//!         while let Some(event) = rx.recv().await {
//!             tracing::info!(revision = event.revision, event = %event.event, "change");
//!         }
//!     });
//!     engine.watch(snapshot.revision, tx, cancel).await
//! }
//! ```

pub mod config;
pub mod domain;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod keys;
pub mod observability;
pub mod plugin;
pub mod secret;
pub mod store;

// Re-export commonly used types and traits
pub use config::{EngineConfig, VanishedPolicy};
pub use domain::{ChangeEvent, Snapshot, WatchEvent};
pub use driver::{Driver, DriverConfig, SyncUpdate};
pub use engine::{Engine, EngineBuilder};
pub use errors::{Error, Result};
pub use keys::{Family, KeyLayout};
pub use observability::{init_logging, LogSeverity};
pub use plugin::Registry;
pub use secret::{SecretBox, SecretCodec};
pub use store::{KvStore, MemoryStore, Revision};

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "routeplane");
    }
}
