//! Write path
//!
//! Upserts validate the entity, enforce that its owner (or the backend a
//! frontend points at) exists, then store the record. Deletes remove the
//! entity's whole subtree in one revision, so a frontend goes together with
//! its middlewares and a backend with its servers. Every write returns the
//! revision it was committed at.
//!
//! Existence checks and the store write are separate operations; a
//! concurrent writer can still slip in between them.

use std::time::Duration;

use serde::Deserialize;
use tracing::Instrument;

use super::Engine;
use crate::domain::{
    Backend, BackendKey, Frontend, FrontendKey, Host, HostKey, Listener, ListenerKey, Middleware,
    MiddlewareKey, Server, ServerKey,
};
use crate::errors::{Error, Result};
use crate::keys::{dir_prefix, Family};
use crate::store::Revision;

/// The one field of a stored frontend the backend delete check needs
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackendRef {
    backend_id: String,
}

fn encode<T: serde::Serialize>(family: Family, entity: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(entity).map_err(|e| Error::serialization(e, format!("encoding {}", family)))
}

impl Engine {
    pub async fn upsert_host(&self, host: &Host) -> Result<Revision> {
        host.validate()?;
        let value = self.encode_host(host)?;
        self.put_record(Family::Host, &host.name, &self.layout.host_key(&host.name), value, None)
            .await
    }

    pub async fn delete_host(&self, key: &HostKey) -> Result<Revision> {
        self.delete_entity(Family::Host, &key.name).await
    }

    pub async fn upsert_listener(&self, listener: &Listener) -> Result<Revision> {
        listener.validate()?;
        if !listener.scope.is_empty() {
            self.registry.validate_route(&listener.scope)?;
        }
        let value = encode(Family::Listener, listener)?;
        let key = self.layout.listener_key(&listener.id);
        self.put_record(Family::Listener, &listener.id, &key, value, None).await
    }

    pub async fn delete_listener(&self, key: &ListenerKey) -> Result<Revision> {
        self.delete_entity(Family::Listener, &key.id).await
    }

    /// Store a frontend; its backend must already exist.
    pub async fn upsert_frontend(
        &self,
        frontend: &Frontend,
        ttl: Option<Duration>,
    ) -> Result<Revision> {
        frontend.validate()?;
        self.registry.validate_route(&frontend.route)?;

        let backend_key = self.layout.backend_key(&frontend.backend_id);
        if self.store.point_read(&backend_key, self.consistency).await?.is_none() {
            return Err(Error::conflict(
                format!(
                    "frontend '{}' references backend '{}' which does not exist",
                    frontend.id, frontend.backend_id
                ),
                Family::Frontend.resource_type(),
            ));
        }

        let value = encode(Family::Frontend, frontend)?;
        let key = self.layout.frontend_key(&frontend.id);
        self.put_record(Family::Frontend, &frontend.id, &key, value, ttl).await
    }

    /// Delete a frontend together with its middlewares
    pub async fn delete_frontend(&self, key: &FrontendKey) -> Result<Revision> {
        self.delete_entity(Family::Frontend, &key.id).await
    }

    /// Store a middleware below an existing frontend. The payload is
    /// normalized by the registry decoder for its type before it is written.
    pub async fn upsert_middleware(
        &self,
        frontend: &FrontendKey,
        middleware: &Middleware,
        ttl: Option<Duration>,
    ) -> Result<Revision> {
        middleware.validate()?;
        self.require_parent(Family::Frontend, &frontend.id).await?;

        let normalized = self.registry.decode_middleware(middleware.clone())?;
        let value = encode(Family::Middleware, &normalized)?;
        let key = self.layout.middleware_key(&frontend.id, &middleware.id);
        self.put_record(Family::Middleware, &middleware.id, &key, value, ttl).await
    }

    pub async fn delete_middleware(&self, key: &MiddlewareKey) -> Result<Revision> {
        let record = self.layout.middleware_key(&key.frontend_key.id, &key.id);
        self.delete_key(Family::Middleware, &key.id, &record).await
    }

    pub async fn upsert_backend(&self, backend: &Backend) -> Result<Revision> {
        backend.validate()?;
        let value = encode(Family::Backend, backend)?;
        let key = self.layout.backend_key(&backend.id);
        self.put_record(Family::Backend, &backend.id, &key, value, None).await
    }

    /// Delete a backend together with its servers; refused while any
    /// frontend still points at it.
    pub async fn delete_backend(&self, key: &BackendKey) -> Result<Revision> {
        let users = self.backend_users(&key.id).await?;
        if !users.is_empty() {
            return Err(Error::conflict(
                format!("backend '{}' is used by frontends: {}", key.id, users.join(", ")),
                Family::Backend.resource_type(),
            ));
        }
        self.delete_entity(Family::Backend, &key.id).await
    }

    /// Store a server below an existing backend.
    pub async fn upsert_server(
        &self,
        backend: &BackendKey,
        server: &Server,
        ttl: Option<Duration>,
    ) -> Result<Revision> {
        server.validate()?;
        self.require_parent(Family::Backend, &backend.id).await?;

        let value = encode(Family::Server, server)?;
        let key = self.layout.server_key(&backend.id, &server.id);
        self.put_record(Family::Server, &server.id, &key, value, ttl).await
    }

    pub async fn delete_server(&self, key: &ServerKey) -> Result<Revision> {
        let record = self.layout.server_key(&key.backend_key.id, &key.id);
        self.delete_key(Family::Server, &key.id, &record).await
    }

    /// Frontends whose stored record names `backend_id`. Records are read
    /// raw so a frontend the assembler would skip still counts; a record
    /// that does not even carry a readable `backendId` blocks the delete too.
    async fn backend_users(&self, backend_id: &str) -> Result<Vec<String>> {
        let prefix = dir_prefix(&self.layout.collection_dir(Family::Frontend));
        let listing = self
            .store
            .bulk_read(&prefix, self.consistency)
            .instrument(crate::store_span!("bulk_read", prefix = %prefix))
            .await?;

        let mut users = Vec::new();
        for kv in &listing.kvs {
            let Some(matched) = self.layout.match_key(&kv.key) else {
                continue;
            };
            if matched.family != Family::Frontend || matched.marker {
                continue;
            }
            match serde_json::from_slice::<BackendRef>(&kv.value) {
                Ok(reference) if reference.backend_id != backend_id => {}
                Ok(_) => users.push(matched.id),
                Err(error) => {
                    crate::engine_log!(
                        self.severity,
                        WARN,
                        frontend_id = %matched.id,
                        error = %error,
                        "Unreadable frontend record blocks backend delete"
                    );
                    users.push(matched.id);
                }
            }
        }
        Ok(users)
    }

    async fn require_parent(&self, family: Family, id: &str) -> Result<()> {
        let key = self.layout.record_key(family, id);
        match self.store.point_read(&key, self.consistency).await? {
            Some(_) => Ok(()),
            None => Err(Error::not_found(family.resource_type(), id)),
        }
    }

    async fn put_record(
        &self,
        family: Family,
        id: &str,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<Revision> {
        let revision = self
            .store
            .put(key, value, ttl)
            .instrument(crate::store_span!("put", key = %key))
            .await?;
        crate::engine_log!(
            self.severity,
            INFO,
            family = %family,
            id = %id,
            revision,
            ttl_seconds = ttl.map(|ttl| ttl.as_secs()),
            "Upserted entity"
        );
        Ok(revision)
    }

    async fn delete_entity(&self, family: Family, id: &str) -> Result<Revision> {
        let dir = self.layout.entity_dir(family, id);
        self.delete_key(family, id, &dir).await
    }

    async fn delete_key(&self, family: Family, id: &str, key: &str) -> Result<Revision> {
        let (revision, removed) = self
            .store
            .delete_tree(key)
            .instrument(crate::store_span!("delete_tree", key = %key))
            .await?;
        if removed == 0 {
            return Err(Error::not_found(family.resource_type(), id));
        }
        crate::engine_log!(
            self.severity,
            INFO,
            family = %family,
            id = %id,
            revision,
            removed,
            "Deleted entity"
        );
        Ok(revision)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::domain::{Backend, BackendKey, Frontend, FrontendKey, Middleware, Server, ServerKey};
    use crate::engine::Engine;
    use crate::errors::Error;
    use crate::store::MemoryStore;

    fn setup() -> (Arc<MemoryStore>, Engine) {
        let store = Arc::new(MemoryStore::new());
        let engine = Engine::builder(store.clone()).root_key("/r").build().unwrap();
        (store, engine)
    }

    #[tokio::test]
    async fn server_needs_backend() {
        let (_store, engine) = setup();
        let server = Server::new("s1", "http://10.0.0.1:80");
        let error = engine.upsert_server(&BackendKey::new("b1"), &server, None).await.unwrap_err();
        assert!(matches!(
            error,
            Error::NotFound { ref resource_type, .. } if resource_type == "backend"
        ));

        engine.upsert_backend(&Backend::new("b1")).await.unwrap();
        engine.upsert_server(&BackendKey::new("b1"), &server, None).await.unwrap();
        assert_eq!(engine.server(&ServerKey::new("b1", "s1")).await.unwrap(), server);
    }

    #[tokio::test]
    async fn frontend_needs_backend() {
        let (_store, engine) = setup();
        let frontend = Frontend::new("f1", "b1", "Path(`/`)");
        let error = engine.upsert_frontend(&frontend, None).await.unwrap_err();
        assert!(matches!(error, Error::Conflict { .. }));
    }

    #[tokio::test]
    async fn middleware_is_stored_normalized() {
        let (_store, engine) = setup();
        engine.upsert_backend(&Backend::new("b1")).await.unwrap();
        engine.upsert_frontend(&Frontend::new("f1", "b1", "Path(`/`)"), None).await.unwrap();

        let middleware = Middleware::new("m1", "ratelimit", json!({"requests": 10}));
        engine.upsert_middleware(&FrontendKey::new("f1"), &middleware, None).await.unwrap();

        let stored = engine.middlewares(&FrontendKey::new("f1")).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].middleware["periodSeconds"], 1);
    }

    #[tokio::test]
    async fn unknown_middleware_type_is_rejected() {
        let (store, engine) = setup();
        engine.upsert_backend(&Backend::new("b1")).await.unwrap();
        engine.upsert_frontend(&Frontend::new("f1", "b1", "Path(`/`)"), None).await.unwrap();
        let revision = store.revision();

        let middleware = Middleware::new("m1", "nope", json!({}));
        let error = engine.upsert_middleware(&FrontendKey::new("f1"), &middleware, None).await;
        assert!(error.unwrap_err().is_malformed());
        assert_eq!(store.revision(), revision);
    }

    #[tokio::test]
    async fn delete_of_missing_entity_is_not_found() {
        let (_store, engine) = setup();
        let error = engine.delete_frontend(&FrontendKey::new("f1")).await.unwrap_err();
        assert!(error.is_not_found());
    }
}
