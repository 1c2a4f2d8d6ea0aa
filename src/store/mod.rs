//! # Store Boundary
//!
//! The minimum surface the engine needs from a revisioned, hierarchical
//! key-value store, and [`MemoryStore`], an in-process implementation.
//!
//! Every committed write is assigned a store-wide, monotonically increasing
//! [`Revision`]. Revisions double as the snapshot timestamp and as the
//! resume token of a watch: `subscribe(prefix, rev)` delivers every mutation
//! at or after `rev`, or reports that `rev` was compacted away.

pub mod memory;

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

pub use memory::MemoryStore;

/// Store-assigned logical timestamp of a committed mutation
pub type Revision = u64;

/// One key-value record as read from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
    pub create_revision: Revision,
    pub mod_revision: Revision,
}

/// Records under a prefix, sorted ascending by key, read at one revision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub revision: Revision,
    pub kvs: Vec<KeyValue>,
}

/// Read guarantee requested from the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReadConsistency {
    /// Reflects every write committed before the read started
    #[default]
    Linearizable,
    /// May be served by a lagging replica (bounded staleness)
    Serializable,
}

/// Kind of a raw mutation delivered by a watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Put,
    Delete,
    /// Key removed because its lease ran out
    Expire,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Put => f.write_str("put"),
            MutationKind::Delete => f.write_str("delete"),
            MutationKind::Expire => f.write_str("expire"),
        }
    }
}

/// A committed change to a single key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub kind: MutationKind,
    pub key: String,
    pub revision: Revision,
    /// Value before the mutation, when the store reports it
    pub prev_value: Option<Vec<u8>>,
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} @{}", self.kind, self.key, self.revision)
    }
}

/// Why the store ended a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCancel {
    /// Requested revision is older than the retained history
    Compacted { compact_revision: Revision },
    /// Store-side shutdown or any other server reason
    Server { reason: String },
}

/// One batch delivered by a subscription
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchResponse {
    /// Mutations in commit order; all share a revision when batched by the store
    pub mutations: Vec<Mutation>,
    /// Set on the final message of a subscription ended by the store
    pub canceled: Option<WatchCancel>,
}

impl WatchResponse {
    pub fn mutations(mutations: Vec<Mutation>) -> Self {
        Self { mutations, canceled: None }
    }

    pub fn canceled(cancel: WatchCancel) -> Self {
        Self { mutations: Vec::new(), canceled: Some(cancel) }
    }
}

/// Subscription stream; an `Err` item is a transport failure
pub type WatchStream = Pin<Box<dyn Stream<Item = Result<WatchResponse>> + Send>>;

/// Revisioned key-value store consumed by the engine.
///
/// Implementations wrap a real store client (etcd and the like) or, for
/// tests and single-process deployments, [`MemoryStore`].
#[async_trait]
pub trait KvStore: Send + Sync {
    /// All records whose key starts with `prefix`, sorted by key, at one revision.
    async fn bulk_read(&self, prefix: &str, consistency: ReadConsistency) -> Result<Listing>;

    /// The record stored at exactly `key`, if any.
    async fn point_read(&self, key: &str, consistency: ReadConsistency)
        -> Result<Option<KeyValue>>;

    /// Mutations of keys under `prefix` at or after `from_revision`.
    ///
    /// `from_revision == 0` starts at the next committed revision.
    async fn subscribe(&self, prefix: &str, from_revision: Revision) -> Result<WatchStream>;

    /// Store `value` at `key`, bound to a lease of `ttl` when given.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<Revision>;

    /// Delete `dir` and every key below `dir/` in a single revision.
    ///
    /// Returns the revision of the deletion and the number of keys removed.
    async fn delete_tree(&self, dir: &str) -> Result<(Revision, usize)>;
}
