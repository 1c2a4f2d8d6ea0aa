//! Point-in-time view of the configuration tree

use super::{BackendSpec, FrontendSpec, Host, Listener};
use crate::store::Revision;

/// Every entity visible at one store revision.
///
/// Collections are ordered by id. A snapshot is never modified after
/// assembly; consumers move forward by applying [`super::ChangeEvent`]s from
/// a watch started at [`Snapshot::revision`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Store revision of the bulk read the snapshot was assembled from
    pub revision: Revision,
    pub hosts: Vec<Host>,
    pub listeners: Vec<Listener>,
    pub frontends: Vec<FrontendSpec>,
    pub backends: Vec<BackendSpec>,
}

impl Snapshot {
    pub fn host(&self, name: &str) -> Option<&Host> {
        self.hosts.iter().find(|h| h.name == name)
    }

    pub fn listener(&self, id: &str) -> Option<&Listener> {
        self.listeners.iter().find(|l| l.id == id)
    }

    pub fn frontend(&self, id: &str) -> Option<&FrontendSpec> {
        self.frontends.iter().find(|f| f.frontend.id == id)
    }

    pub fn backend(&self, id: &str) -> Option<&BackendSpec> {
        self.backends.iter().find(|b| b.backend.id == id)
    }

    /// Number of entities across all collections, children included
    pub fn entity_count(&self) -> usize {
        self.hosts.len()
            + self.listeners.len()
            + self.frontends.iter().map(|f| 1 + f.middlewares.len()).sum::<usize>()
            + self.backends.iter().map(|b| 1 + b.servers.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_count() == 0
    }
}
