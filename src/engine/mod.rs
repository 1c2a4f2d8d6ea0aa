//! # Engine
//!
//! Binds a [`KvStore`] to the key layout, the plugin registry and the
//! secret boundary, and exposes the synchronization operations:
//!
//! - [`Engine::bootstrap`] reads the whole tree at one revision and
//!   assembles a [`Snapshot`](crate::domain::Snapshot)
//! - [`Engine::watch`] streams typed change events from a revision until
//!   cancelled or the store ends the subscription
//! - point reads and writes for every entity family
//!
//! The engine holds no mutable configuration state; everything it needs is
//! fixed at construction and shared read-only across concurrent calls.

mod classify;
mod read;
mod resolve;
mod snapshot;
mod watch;
mod write;

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use crate::config::{EngineConfig, VanishedPolicy, DEFAULT_ROOT_KEY};
use crate::errors::Result;
use crate::keys::KeyLayout;
use crate::observability::{LogSeverity, MetricsRecorder};
use crate::plugin::Registry;
use crate::secret::{SecretBoundary, SecretCodec};
use crate::store::{KvStore, ReadConsistency, Revision};

/// Synchronization engine over one configuration root
pub struct Engine {
    store: Arc<dyn KvStore>,
    layout: KeyLayout,
    registry: Arc<Registry>,
    secrets: SecretBoundary,
    consistency: ReadConsistency,
    severity: LogSeverity,
    vanished_policy: VanishedPolicy,
    metrics: MetricsRecorder,
    /// Revision of the newest snapshot handed out
    last_bootstrap_revision: AtomicU64,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("root", &self.layout.root())
            .field("consistency", &self.consistency)
            .field("severity", &self.severity)
            .field("vanished_policy", &self.vanished_policy)
            .field("sealing_enabled", &self.secrets.is_enabled())
            .field("registry", &self.registry)
            .finish()
    }
}

impl Engine {
    pub fn builder(store: Arc<dyn KvStore>) -> EngineBuilder {
        EngineBuilder::new(store)
    }

    /// Engine configured from validated [`EngineConfig`] with the builtin registry
    pub fn from_config(store: Arc<dyn KvStore>, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Self::builder(store)
            .root_key(config.root_key.clone())
            .consistency(config.read_consistency())
            .severity(config.log.severity()?)
            .vanished_policy(config.vanished_policy)
            .secrets(config.secret_boundary()?)
            .build()
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn severity(&self) -> LogSeverity {
        self.severity
    }

    pub fn vanished_policy(&self) -> VanishedPolicy {
        self.vanished_policy
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Revision of the newest snapshot assembled by [`Engine::bootstrap`]
    pub fn last_bootstrap_revision(&self) -> Revision {
        self.last_bootstrap_revision.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Builder for [`Engine`]
pub struct EngineBuilder {
    store: Arc<dyn KvStore>,
    root_key: String,
    registry: Option<Registry>,
    secrets: SecretBoundary,
    consistency: ReadConsistency,
    severity: LogSeverity,
    vanished_policy: VanishedPolicy,
}

impl EngineBuilder {
    fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            root_key: DEFAULT_ROOT_KEY.to_string(),
            registry: None,
            secrets: SecretBoundary::disabled(),
            consistency: ReadConsistency::default(),
            severity: LogSeverity::default(),
            vanished_policy: VanishedPolicy::default(),
        }
    }

    pub fn root_key(mut self, root_key: impl Into<String>) -> Self {
        self.root_key = root_key.into();
        self
    }

    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn secret_codec(mut self, codec: Arc<dyn SecretCodec>) -> Self {
        self.secrets = SecretBoundary::new(codec);
        self
    }

    pub fn secrets(mut self, secrets: SecretBoundary) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn consistency(mut self, consistency: ReadConsistency) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn severity(mut self, severity: LogSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn vanished_policy(mut self, policy: VanishedPolicy) -> Self {
        self.vanished_policy = policy;
        self
    }

    pub fn build(self) -> Result<Engine> {
        let layout = KeyLayout::new(self.root_key)?;
        Ok(Engine {
            store: self.store,
            layout,
            registry: Arc::new(self.registry.unwrap_or_default()),
            secrets: self.secrets,
            consistency: self.consistency,
            severity: self.severity,
            vanished_policy: self.vanished_policy,
            metrics: MetricsRecorder::new(),
            last_bootstrap_revision: AtomicU64::new(0),
        })
    }
}
