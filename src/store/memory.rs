//! In-process revisioned store
//!
//! [`MemoryStore`] keeps the latest value of every key in a `BTreeMap`, the
//! ordered mutation history since the last compaction, and the set of live
//! subscriptions. Each write bumps the store revision by one; a tree
//! deletion or a lease sweep removes all its keys in a single revision, as
//! etcd does. Consistency modes are accepted and ignored since there is only
//! one copy of the data.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    KeyValue, KvStore, Listing, Mutation, MutationKind, ReadConsistency, Revision, WatchCancel,
    WatchResponse, WatchStream,
};
use crate::errors::{Error, Result};
use crate::keys::dir_prefix;

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    create_revision: Revision,
    mod_revision: Revision,
    expires_at: Option<Instant>,
}

#[derive(Debug)]
struct Watcher {
    id: u64,
    prefix: String,
    tx: mpsc::UnboundedSender<Result<WatchResponse>>,
}

#[derive(Debug, Default)]
struct Inner {
    revision: Revision,
    data: BTreeMap<String, Entry>,
    history: Vec<Mutation>,
    /// History strictly below this revision has been discarded
    compact_revision: Revision,
    watchers: Vec<Watcher>,
    next_watcher_id: u64,
}

impl Inner {
    fn commit(&mut self, mutations: Vec<Mutation>) {
        self.watchers.retain(|watcher| {
            let matching: Vec<Mutation> = mutations
                .iter()
                .filter(|m| m.key.starts_with(&watcher.prefix))
                .cloned()
                .collect();
            if matching.is_empty() {
                return !watcher.tx.is_closed();
            }
            let delivered = watcher.tx.send(Ok(WatchResponse::mutations(matching))).is_ok();
            if !delivered {
                debug!(watcher_id = watcher.id, "Dropping closed subscription");
            }
            delivered
        });
        self.history.extend(mutations);
    }

    fn remove_keys(&mut self, keys: Vec<String>, kind: MutationKind) -> Revision {
        self.revision += 1;
        let revision = self.revision;
        let mutations = keys
            .into_iter()
            .filter_map(|key| {
                self.data.remove(&key).map(|entry| Mutation {
                    kind,
                    key,
                    revision,
                    prev_value: Some(entry.value),
                })
            })
            .collect();
        self.commit(mutations);
        revision
    }

    /// History at or after `from`, under `prefix`, batched per revision
    fn replay(&self, prefix: &str, from: Revision) -> Vec<WatchResponse> {
        let mut batches: Vec<WatchResponse> = Vec::new();
        let mut current: Option<Revision> = None;
        for mutation in self.history.iter().filter(|m| m.revision >= from) {
            if !mutation.key.starts_with(prefix) {
                continue;
            }
            if current != Some(mutation.revision) {
                batches.push(WatchResponse::default());
                current = Some(mutation.revision);
            }
            if let Some(batch) = batches.last_mut() {
                batch.mutations.push(mutation.clone());
            }
        }
        batches
    }
}

/// Revisioned, watchable key-value store held in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }

    /// Revision of the latest committed write
    pub fn revision(&self) -> Revision {
        self.lock().revision
    }

    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().data.is_empty()
    }

    /// Number of subscriptions still attached
    pub fn watcher_count(&self) -> usize {
        let mut inner = self.lock();
        inner.watchers.retain(|w| !w.tx.is_closed());
        inner.watchers.len()
    }

    /// Discard history below `revision`; watches from older revisions are refused.
    pub fn compact(&self, revision: Revision) -> Result<()> {
        let mut inner = self.lock();
        if revision > inner.revision {
            return Err(Error::invalid_format(format!(
                "can not compact to future revision {} (current {})",
                revision, inner.revision
            )));
        }
        if revision > inner.compact_revision {
            inner.compact_revision = revision;
            inner.history.retain(|m| m.revision >= revision);
            info!(compact_revision = revision, "Compacted store history");
        }
        Ok(())
    }

    /// End every subscription with a server-side cancellation.
    pub fn cancel_watches(&self, reason: &str) {
        let mut inner = self.lock();
        for watcher in inner.watchers.drain(..) {
            let _ = watcher.tx.send(Ok(WatchResponse::canceled(WatchCancel::Server {
                reason: reason.to_string(),
            })));
        }
    }

    /// End every subscription with a transport failure.
    pub fn fail_watches(&self, message: &str) {
        let mut inner = self.lock();
        for watcher in inner.watchers.drain(..) {
            let _ = watcher.tx.send(Err(Error::transport(message.to_string())));
        }
    }

    /// Remove every key whose lease has run out, in one revision.
    pub fn expire_due(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let expired: Vec<String> = inner
            .data
            .iter()
            .filter(|(_, entry)| entry.expires_at.is_some_and(|at| at <= now))
            .map(|(key, _)| key.clone())
            .collect();
        if expired.is_empty() {
            return 0;
        }
        let count = expired.len();
        let revision = inner.remove_keys(expired, MutationKind::Expire);
        debug!(revision, count, "Expired leased keys");
        count
    }

    /// Sweep expired leases every `interval` until `cancel` fires.
    pub fn spawn_lease_reaper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Lease reaper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        store.expire_due();
                    }
                }
            }
        })
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn bulk_read(&self, prefix: &str, _consistency: ReadConsistency) -> Result<Listing> {
        let inner = self.lock();
        let kvs = inner
            .data
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| KeyValue {
                key: key.clone(),
                value: entry.value.clone(),
                create_revision: entry.create_revision,
                mod_revision: entry.mod_revision,
            })
            .collect();
        Ok(Listing { revision: inner.revision, kvs })
    }

    async fn point_read(
        &self,
        key: &str,
        _consistency: ReadConsistency,
    ) -> Result<Option<KeyValue>> {
        let inner = self.lock();
        Ok(inner.data.get(key).map(|entry| KeyValue {
            key: key.to_string(),
            value: entry.value.clone(),
            create_revision: entry.create_revision,
            mod_revision: entry.mod_revision,
        }))
    }

    async fn subscribe(&self, prefix: &str, from_revision: Revision) -> Result<WatchStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();

        if from_revision != 0 && from_revision < inner.compact_revision {
            let compact_revision = inner.compact_revision;
            let canceled = WatchResponse::canceled(WatchCancel::Compacted { compact_revision });
            let _ = tx.send(Ok(canceled));
            return Ok(Box::pin(UnboundedReceiverStream::new(rx)));
        }

        if from_revision != 0 {
            for batch in inner.replay(prefix, from_revision) {
                let _ = tx.send(Ok(batch));
            }
        }

        inner.next_watcher_id += 1;
        let id = inner.next_watcher_id;
        inner.watchers.push(Watcher { id, prefix: prefix.to_string(), tx });
        debug!(watcher_id = id, prefix, from_revision, "Subscription registered");

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<Revision> {
        let mut inner = self.lock();
        inner.revision += 1;
        let revision = inner.revision;
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);

        let previous = inner.data.remove(key);
        let create_revision = previous.as_ref().map_or(revision, |p| p.create_revision);
        inner.data.insert(
            key.to_string(),
            Entry { value, create_revision, mod_revision: revision, expires_at },
        );

        inner.commit(vec![Mutation {
            kind: MutationKind::Put,
            key: key.to_string(),
            revision,
            prev_value: previous.map(|p| p.value),
        }]);
        Ok(revision)
    }

    async fn delete_tree(&self, dir: &str) -> Result<(Revision, usize)> {
        let mut inner = self.lock();
        let prefix = dir_prefix(dir);
        let mut keys: Vec<String> = Vec::new();
        if inner.data.contains_key(dir) {
            keys.push(dir.to_string());
        }
        keys.extend(
            inner
                .data
                .range(prefix.clone()..)
                .take_while(|(key, _)| key.starts_with(&prefix))
                .map(|(key, _)| key.clone()),
        );

        if keys.is_empty() {
            return Ok((inner.revision, 0));
        }
        let count = keys.len();
        let revision = inner.remove_keys(keys, MutationKind::Delete);
        Ok((revision, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.put("/r/frontends/f1/frontend", b"f1".to_vec(), None).await.unwrap();
        store.put("/r/frontends/f10/frontend", b"f10".to_vec(), None).await.unwrap();
        store.put("/r/frontends/f1/middlewares/m1", b"m1".to_vec(), None).await.unwrap();
        store.put("/r/frontends/f1-x/frontend", b"f1-x".to_vec(), None).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_revisions_increase_per_write() {
        let store = MemoryStore::new();
        assert_eq!(store.put("/a", b"1".to_vec(), None).await.unwrap(), 1);
        assert_eq!(store.put("/a", b"2".to_vec(), None).await.unwrap(), 2);

        let kv = store.point_read("/a", ReadConsistency::Linearizable).await.unwrap().unwrap();
        assert_eq!(kv.value, b"2");
        assert_eq!(kv.create_revision, 1);
        assert_eq!(kv.mod_revision, 2);
    }

    #[tokio::test]
    async fn test_bulk_read_is_sorted_and_prefix_bounded() {
        let store = seeded().await;
        let listing =
            store.bulk_read("/r/frontends/f1/", ReadConsistency::Linearizable).await.unwrap();
        let keys: Vec<&str> = listing.kvs.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["/r/frontends/f1/frontend", "/r/frontends/f1/middlewares/m1"]);
        assert_eq!(listing.revision, 4);
    }

    #[tokio::test]
    async fn test_delete_tree_spares_sibling_ids() {
        let store = seeded().await;
        let (revision, count) = store.delete_tree("/r/frontends/f1").await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(revision, 5);

        let listing = store.bulk_read("/r/", ReadConsistency::Linearizable).await.unwrap();
        let keys: Vec<&str> = listing.kvs.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["/r/frontends/f1-x/frontend", "/r/frontends/f10/frontend"]);
    }

    #[tokio::test]
    async fn test_delete_of_missing_tree_does_not_bump_revision() {
        let store = seeded().await;
        let (revision, count) = store.delete_tree("/r/frontends/nope").await.unwrap();
        assert_eq!((revision, count), (4, 0));
    }

    #[tokio::test]
    async fn test_subscribe_replays_history_then_streams_live() {
        let store = seeded().await;
        let mut stream = store.subscribe("/r/frontends/f1/", 3).await.unwrap();

        let replayed = stream.next().await.unwrap().unwrap();
        assert_eq!(replayed.mutations.len(), 1);
        assert_eq!(replayed.mutations[0].key, "/r/frontends/f1/middlewares/m1");
        assert_eq!(replayed.mutations[0].revision, 3);

        store.delete_tree("/r/frontends/f1").await.unwrap();
        let live = stream.next().await.unwrap().unwrap();
        assert_eq!(live.mutations.len(), 2);
        assert!(live.mutations.iter().all(|m| m.kind == MutationKind::Delete && m.revision == 5));
    }

    #[tokio::test]
    async fn test_subscribe_below_compaction_is_canceled() {
        let store = seeded().await;
        store.compact(3).unwrap();

        let mut stream = store.subscribe("/r/", 2).await.unwrap();
        let response = stream.next().await.unwrap().unwrap();
        assert_eq!(
            response.canceled,
            Some(WatchCancel::Compacted { compact_revision: 3 })
        );

        let mut stream = store.subscribe("/r/", 3).await.unwrap();
        let response = stream.next().await.unwrap().unwrap();
        assert_eq!(response.mutations[0].revision, 3);
    }

    #[tokio::test]
    async fn test_compact_rejects_future_revision() {
        let store = seeded().await;
        assert!(store.compact(10).is_err());
    }

    #[tokio::test]
    async fn test_cancel_and_fail_watches() {
        let store = seeded().await;
        let mut canceled = store.subscribe("/r/", 0).await.unwrap();
        store.cancel_watches("shutting down");
        let response = canceled.next().await.unwrap().unwrap();
        assert!(matches!(response.canceled, Some(WatchCancel::Server { .. })));
        assert!(canceled.next().await.is_none());

        let mut failed = store.subscribe("/r/", 0).await.unwrap();
        store.fail_watches("connection reset");
        assert!(failed.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscriptions_are_pruned() {
        let store = seeded().await;
        let stream = store.subscribe("/r/", 0).await.unwrap();
        assert_eq!(store.watcher_count(), 1);
        drop(stream);
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leases_expire_in_one_revision() {
        let store = MemoryStore::new();
        store.put("/r/backends/b1/servers/s1", b"s1".to_vec(), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        store.put("/r/backends/b1/servers/s2", b"s2".to_vec(), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        store.put("/r/backends/b1/backend", b"b1".to_vec(), None).await.unwrap();
        let mut stream = store.subscribe("/r/", 0).await.unwrap();

        assert_eq!(store.expire_due(), 0);
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.expire_due(), 2);

        let response = stream.next().await.unwrap().unwrap();
        assert_eq!(response.mutations.len(), 2);
        assert!(response
            .mutations
            .iter()
            .all(|m| m.kind == MutationKind::Expire && m.revision == 4));
        assert_eq!(store.len(), 1);
    }
}
