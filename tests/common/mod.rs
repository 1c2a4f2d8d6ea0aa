//! Common test utilities for all integration tests.
//!
//! Provides store fixtures, a store wrapper with scripted failures, and
//! helpers for writing raw records and collecting watch events.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use routeplane::domain::{Backend, Frontend, Server};
use routeplane::errors::{Error, Result};
use routeplane::store::{KeyValue, Listing, ReadConsistency, WatchStream};
use routeplane::{Engine, KvStore, MemoryStore, Revision, WatchEvent};
use serde_json::Value;
use tokio::sync::mpsc;

pub const ROOT: &str = "/routeplane";

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

pub fn engine_on(store: Arc<dyn KvStore>) -> Engine {
    Engine::builder(store).root_key(ROOT).build().expect("engine should build")
}

/// Key below the test root, e.g. `key("hosts/h1/host")`
pub fn key(path: &str) -> String {
    format!("{}/{}", ROOT, path)
}

/// Write a raw JSON record below the test root
pub async fn put_json(store: &MemoryStore, path: &str, value: Value) -> Revision {
    store.put(&key(path), value.to_string().into_bytes(), None).await.expect("put should succeed")
}

/// Write raw bytes below the test root
pub async fn put_raw(store: &MemoryStore, path: &str, value: &[u8]) -> Revision {
    store.put(&key(path), value.to_vec(), None).await.expect("put should succeed")
}

/// Stored bytes of a record below the test root
pub async fn raw_value(store: &MemoryStore, path: &str) -> Vec<u8> {
    store
        .point_read(&key(path), ReadConsistency::Linearizable)
        .await
        .expect("point read should succeed")
        .expect("record should exist")
        .value
}

/// Backend `id` with one server per url, through the write path
pub async fn seed_backend(engine: &Engine, id: &str, urls: &[&str]) -> Revision {
    let mut revision = engine.upsert_backend(&Backend::new(id)).await.expect("backend upsert");
    for (n, url) in urls.iter().enumerate() {
        let server = Server::new(format!("s{}", n + 1), *url);
        revision = engine
            .upsert_server(&routeplane::domain::BackendKey::new(id), &server, None)
            .await
            .expect("server upsert");
    }
    revision
}

/// Frontend `id` routed to `backend_id`, through the write path
pub async fn seed_frontend(engine: &Engine, id: &str, backend_id: &str) -> Revision {
    let frontend = Frontend::new(id, backend_id, format!("Path(\"/{}\")", id));
    engine.upsert_frontend(&frontend, None).await.expect("frontend upsert")
}

/// Receive `count` events or fail after a generous timeout
pub async fn recv_events(rx: &mut mpsc::Receiver<WatchEvent>, count: usize) -> Vec<WatchEvent> {
    let mut events = Vec::with_capacity(count);
    while events.len() < count {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for watch event")
            .expect("watch channel closed early");
        events.push(event);
    }
    events
}

/// Store wrapper that counts reads and fails on demand
#[derive(Debug)]
pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    bulk_read_failures: AtomicUsize,
    subscribe_failures: AtomicUsize,
    point_read_failures: AtomicUsize,
    point_reads: AtomicUsize,
    bulk_reads: AtomicUsize,
    /// When set, listings report this revision instead of the real one
    listing_revision: Mutex<Option<Revision>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            bulk_read_failures: AtomicUsize::new(0),
            subscribe_failures: AtomicUsize::new(0),
            point_read_failures: AtomicUsize::new(0),
            point_reads: AtomicUsize::new(0),
            bulk_reads: AtomicUsize::new(0),
            listing_revision: Mutex::new(None),
        }
    }

    /// Fail the next `count` bulk reads with a transport error
    pub fn fail_bulk_reads(&self, count: usize) {
        self.bulk_read_failures.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` subscriptions with a transport error
    pub fn fail_subscribes(&self, count: usize) {
        self.subscribe_failures.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` point reads with a transport error
    pub fn fail_point_reads(&self, count: usize) {
        self.point_read_failures.store(count, Ordering::SeqCst);
    }

    /// Pretend listings come from a replica at `revision`
    pub fn lag_listings_at(&self, revision: Option<Revision>) {
        *self.listing_revision.lock().unwrap() = revision;
    }

    pub fn point_reads(&self) -> usize {
        self.point_reads.load(Ordering::SeqCst)
    }

    pub fn bulk_reads(&self) -> usize {
        self.bulk_reads.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
    }
}

#[async_trait]
impl KvStore for FlakyStore {
    async fn bulk_read(&self, prefix: &str, consistency: ReadConsistency) -> Result<Listing> {
        self.bulk_reads.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.bulk_read_failures) {
            return Err(Error::transport("connection refused"));
        }
        let mut listing = self.inner.bulk_read(prefix, consistency).await?;
        if let Some(revision) = *self.listing_revision.lock().unwrap() {
            listing.revision = revision;
        }
        Ok(listing)
    }

    async fn point_read(
        &self,
        key: &str,
        consistency: ReadConsistency,
    ) -> Result<Option<KeyValue>> {
        self.point_reads.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.point_read_failures) {
            return Err(Error::transport("connection reset"));
        }
        self.inner.point_read(key, consistency).await
    }

    async fn subscribe(&self, prefix: &str, from_revision: Revision) -> Result<WatchStream> {
        if Self::take_failure(&self.subscribe_failures) {
            return Err(Error::transport("connection refused"));
        }
        self.inner.subscribe(prefix, from_revision).await
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<Revision> {
        self.inner.put(key, value, ttl).await
    }

    async fn delete_tree(&self, dir: &str) -> Result<(Revision, usize)> {
        self.inner.delete_tree(dir).await
    }
}
