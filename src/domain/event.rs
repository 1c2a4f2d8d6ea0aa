//! Typed change events derived from store mutations

use std::fmt;

use super::{
    BackendKey, BackendSpec, FrontendKey, FrontendSpec, Host, HostKey, Listener, ListenerKey,
    Middleware, MiddlewareKey, Server, ServerKey,
};
use crate::keys::Family;
use crate::store::Revision;

/// One semantic change to the configuration tree.
///
/// `Upserted` variants carry the entity as re-read after the mutation;
/// `Deleted` variants carry only the identifying key.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    HostUpserted { host: Host },
    HostDeleted { key: HostKey },
    ListenerUpserted { listener: Listener },
    ListenerDeleted { key: ListenerKey },
    FrontendUpserted { frontend: FrontendSpec },
    FrontendDeleted { key: FrontendKey },
    MiddlewareUpserted { frontend_key: FrontendKey, middleware: Middleware },
    MiddlewareDeleted { key: MiddlewareKey },
    BackendUpserted { backend: BackendSpec },
    BackendDeleted { key: BackendKey },
    ServerUpserted { backend_key: BackendKey, server: Server },
    ServerDeleted { key: ServerKey },
}

impl ChangeEvent {
    pub fn family(&self) -> Family {
        match self {
            ChangeEvent::HostUpserted { .. } | ChangeEvent::HostDeleted { .. } => Family::Host,
            ChangeEvent::ListenerUpserted { .. } | ChangeEvent::ListenerDeleted { .. } => {
                Family::Listener
            }
            ChangeEvent::FrontendUpserted { .. } | ChangeEvent::FrontendDeleted { .. } => {
                Family::Frontend
            }
            ChangeEvent::MiddlewareUpserted { .. } | ChangeEvent::MiddlewareDeleted { .. } => {
                Family::Middleware
            }
            ChangeEvent::BackendUpserted { .. } | ChangeEvent::BackendDeleted { .. } => {
                Family::Backend
            }
            ChangeEvent::ServerUpserted { .. } | ChangeEvent::ServerDeleted { .. } => {
                Family::Server
            }
        }
    }

    pub fn is_deletion(&self) -> bool {
        matches!(
            self,
            ChangeEvent::HostDeleted { .. }
                | ChangeEvent::ListenerDeleted { .. }
                | ChangeEvent::FrontendDeleted { .. }
                | ChangeEvent::MiddlewareDeleted { .. }
                | ChangeEvent::BackendDeleted { .. }
                | ChangeEvent::ServerDeleted { .. }
        )
    }

    /// Id of the affected entity (the child id for middlewares and servers)
    pub fn entity_id(&self) -> &str {
        match self {
            ChangeEvent::HostUpserted { host } => &host.name,
            ChangeEvent::HostDeleted { key } => &key.name,
            ChangeEvent::ListenerUpserted { listener } => &listener.id,
            ChangeEvent::ListenerDeleted { key } => &key.id,
            ChangeEvent::FrontendUpserted { frontend } => &frontend.frontend.id,
            ChangeEvent::FrontendDeleted { key } => &key.id,
            ChangeEvent::MiddlewareUpserted { middleware, .. } => &middleware.id,
            ChangeEvent::MiddlewareDeleted { key } => &key.id,
            ChangeEvent::BackendUpserted { backend } => &backend.backend.id,
            ChangeEvent::BackendDeleted { key } => &key.id,
            ChangeEvent::ServerUpserted { server, .. } => &server.id,
            ChangeEvent::ServerDeleted { key } => &key.id,
        }
    }

    /// Id of the owning frontend or backend for child events
    pub fn parent_id(&self) -> Option<&str> {
        match self {
            ChangeEvent::MiddlewareUpserted { frontend_key, .. } => Some(&frontend_key.id),
            ChangeEvent::MiddlewareDeleted { key } => Some(&key.frontend_key.id),
            ChangeEvent::ServerUpserted { backend_key, .. } => Some(&backend_key.id),
            ChangeEvent::ServerDeleted { key } => Some(&key.backend_key.id),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = if self.is_deletion() { "deleted" } else { "upserted" };
        match self.parent_id() {
            Some(parent) => {
                write!(f, "{} {}/{} {}", self.family(), parent, self.entity_id(), action)
            }
            None => write!(f, "{} {} {}", self.family(), self.entity_id(), action),
        }
    }
}

/// Change event tagged with the revision of the mutation it came from.
///
/// Consumers persist the revision of the last applied event and resume a
/// watch from it.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub revision: Revision,
    pub event: ChangeEvent,
}
