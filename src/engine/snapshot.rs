//! Snapshot assembly
//!
//! The listing is scanned once. Each key is matched against the key layout
//! and filed under its family; children are filed under their parent id.
//! Every record is then decoded on its own, so one bad record costs at most
//! the entity it belongs to.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::Ordering;
use std::time::Instant;

use tracing::Instrument;

use super::Engine;
use crate::domain::{BackendSpec, FrontendSpec, Snapshot};
use crate::errors::{Error, Result};
use crate::keys::Family;
use crate::store::{KeyValue, Listing};

/// Records of one listing, filed by family and id
#[derive(Default)]
struct Grouped<'a> {
    hosts: BTreeMap<String, &'a KeyValue>,
    listeners: BTreeMap<String, &'a KeyValue>,
    frontends: BTreeMap<String, &'a KeyValue>,
    middlewares: BTreeMap<String, Vec<(String, &'a KeyValue)>>,
    backends: BTreeMap<String, &'a KeyValue>,
    servers: BTreeMap<String, Vec<(String, &'a KeyValue)>>,
}

impl Engine {
    /// Read the whole configuration tree at one revision and assemble it.
    ///
    /// Fails only when the store read fails, or when the store answers with
    /// a revision older than a snapshot already handed out (a lagging
    /// replica); the caller retries in both cases.
    pub async fn bootstrap(&self) -> Result<Snapshot> {
        let started = Instant::now();
        let prefix = self.layout.root_prefix();
        let listing = self
            .store
            .bulk_read(&prefix, self.consistency)
            .instrument(crate::store_span!("bulk_read", prefix = %prefix))
            .await?;

        let previous = self.last_bootstrap_revision.load(Ordering::SeqCst);
        if listing.revision < previous {
            return Err(Error::transport(format!(
                "store answered at revision {} but a snapshot at revision {} was already assembled",
                listing.revision, previous
            )));
        }

        let snapshot = self.assemble(&listing);
        self.warn_dangling_backends(&snapshot);
        self.last_bootstrap_revision.fetch_max(snapshot.revision, Ordering::SeqCst);

        self.metrics.record_bootstrap(&snapshot, started.elapsed().as_secs_f64());
        crate::engine_log!(
            self.severity,
            INFO,
            revision = snapshot.revision,
            records = listing.kvs.len(),
            hosts = snapshot.hosts.len(),
            listeners = snapshot.listeners.len(),
            frontends = snapshot.frontends.len(),
            backends = snapshot.backends.len(),
            "Assembled configuration snapshot"
        );
        Ok(snapshot)
    }

    /// Build a snapshot from any listing under the root.
    ///
    /// Unusable records are skipped with a warning; this never fails.
    pub(crate) fn assemble(&self, listing: &Listing) -> Snapshot {
        let grouped = self.group(listing);

        let hosts = grouped
            .hosts
            .iter()
            .filter_map(|(name, kv)| {
                self.decode_or_skip("snapshot", Family::Host, &kv.key, || {
                    self.decode_host(name, &kv.value)
                })
            })
            .collect();

        let listeners = grouped
            .listeners
            .iter()
            .filter_map(|(id, kv)| {
                self.decode_or_skip("snapshot", Family::Listener, &kv.key, || {
                    self.decode_listener(id, &kv.value)
                })
            })
            .collect();

        let frontends = grouped
            .frontends
            .iter()
            .filter_map(|(id, kv)| {
                let frontend = self.decode_or_skip("snapshot", Family::Frontend, &kv.key, || {
                    self.decode_frontend(id, &kv.value)
                })?;
                let middlewares = grouped
                    .middlewares
                    .get(id)
                    .into_iter()
                    .flatten()
                    .filter_map(|(middleware_id, kv)| {
                        self.decode_or_skip("snapshot", Family::Middleware, &kv.key, || {
                            self.decode_middleware(middleware_id, &kv.value)
                        })
                    })
                    .collect();
                Some(FrontendSpec::new(frontend, middlewares))
            })
            .collect();

        let backends = grouped
            .backends
            .iter()
            .filter_map(|(id, kv)| {
                let backend = self.decode_or_skip("snapshot", Family::Backend, &kv.key, || {
                    self.decode_backend(id, &kv.value)
                })?;
                let servers = grouped
                    .servers
                    .get(id)
                    .into_iter()
                    .flatten()
                    .filter_map(|(server_id, kv)| {
                        self.decode_or_skip("snapshot", Family::Server, &kv.key, || {
                            self.decode_server(server_id, &kv.value)
                        })
                    })
                    .collect();
                Some(BackendSpec::new(backend, servers))
            })
            .collect();

        Snapshot { revision: listing.revision, hosts, listeners, frontends, backends }
    }

    fn group<'a>(&self, listing: &'a Listing) -> Grouped<'a> {
        let mut grouped = Grouped::default();

        for kv in &listing.kvs {
            let Some(matched) = self.layout.match_key(&kv.key) else {
                crate::engine_log!(self.severity, DEBUG, key = %kv.key, "Ignoring unrelated key");
                continue;
            };
            if matched.marker {
                continue;
            }
            match (matched.family, matched.parent_id) {
                (Family::Host, _) => {
                    grouped.hosts.insert(matched.id, kv);
                }
                (Family::Listener, _) => {
                    grouped.listeners.insert(matched.id, kv);
                }
                (Family::Frontend, _) => {
                    grouped.frontends.insert(matched.id, kv);
                }
                (Family::Backend, _) => {
                    grouped.backends.insert(matched.id, kv);
                }
                (Family::Middleware, Some(parent)) => {
                    grouped.middlewares.entry(parent).or_default().push((matched.id, kv));
                }
                (Family::Server, Some(parent)) => {
                    grouped.servers.entry(parent).or_default().push((matched.id, kv));
                }
                (family, None) => {
                    crate::engine_log!(
                        self.severity,
                        WARN,
                        family = %family,
                        key = %kv.key,
                        "Child key without a parent id"
                    );
                }
            }
        }

        self.drop_orphans(Family::Middleware, &mut grouped.middlewares, &grouped.frontends);
        self.drop_orphans(Family::Server, &mut grouped.servers, &grouped.backends);
        grouped
    }

    fn drop_orphans(
        &self,
        family: Family,
        children: &mut BTreeMap<String, Vec<(String, &KeyValue)>>,
        parents: &BTreeMap<String, &KeyValue>,
    ) {
        children.retain(|parent, records| {
            if parents.contains_key(parent) {
                return true;
            }
            for (_, kv) in records.iter() {
                crate::engine_log!(
                    self.severity,
                    WARN,
                    family = %family,
                    key = %kv.key,
                    "Skipping record whose parent is missing"
                );
                self.metrics.record_skipped(family, "snapshot");
            }
            false
        });
    }

    /// Frontends may point at backends that are not (yet) in the tree.
    fn warn_dangling_backends(&self, snapshot: &Snapshot) {
        let backends: BTreeSet<&str> =
            snapshot.backends.iter().map(|b| b.backend.id.as_str()).collect();
        for spec in &snapshot.frontends {
            if !backends.contains(spec.frontend.backend_id.as_str()) {
                crate::engine_log!(
                    self.severity,
                    WARN,
                    frontend = %spec.frontend.id,
                    backend = %spec.frontend.backend_id,
                    "Frontend references a backend that is not in the snapshot"
                );
            }
        }
    }
}
