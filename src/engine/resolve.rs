//! Record decoding shared by assembly, classification and point reads.
//!
//! Every decoder takes the entity id from the key path and overrides
//! whatever id the payload carries, then validates the entity. Hosts open
//! their sealed key pair through the secret boundary; frontends have their
//! route checked and middlewares their payload normalized by the registry.

use serde::de::DeserializeOwned;

use super::Engine;
use crate::domain::host::{StoredHost, StoredHostSettings};
use crate::domain::{
    Backend, BackendSpec, Frontend, FrontendSpec, Host, HostSettings, Listener, Middleware,
    Server,
};
use crate::errors::{Error, Result};
use crate::keys::{dir_prefix, Family};
use crate::store::KeyValue;

fn parse<T: DeserializeOwned>(family: Family, id: &str, value: &[u8]) -> Result<T> {
    serde_json::from_slice(value)
        .map_err(|e| Error::serialization(e, format!("decoding {} '{}'", family, id)))
}

impl Engine {
    pub(crate) fn decode_host(&self, name: &str, value: &[u8]) -> Result<Host> {
        let stored: StoredHost = parse(Family::Host, name, value)?;
        let key_pair = match stored.settings.key_pair {
            Some(sealed) => Some(self.secrets.open_key_pair(&sealed)?),
            None => None,
        };
        let host = Host {
            name: name.to_string(),
            settings: HostSettings {
                default: stored.settings.default,
                key_pair,
                ocsp: stored.settings.ocsp,
            },
        };
        host.validate()?;
        Ok(host)
    }

    /// Stored form of `host`; a key pair is sealed, which needs a secret box.
    pub(crate) fn encode_host(&self, host: &Host) -> Result<Vec<u8>> {
        let key_pair = match &host.settings.key_pair {
            Some(key_pair) => Some(self.secrets.seal_key_pair(key_pair)?),
            None => None,
        };
        let stored = StoredHost {
            name: host.name.clone(),
            settings: StoredHostSettings {
                default: host.settings.default,
                key_pair,
                ocsp: host.settings.ocsp.clone(),
            },
        };
        serde_json::to_vec(&stored).map_err(|e| Error::serialization(e, "encoding host"))
    }

    pub(crate) fn decode_listener(&self, id: &str, value: &[u8]) -> Result<Listener> {
        let mut listener: Listener = parse(Family::Listener, id, value)?;
        listener.id = id.to_string();
        listener.validate()?;
        if !listener.scope.is_empty() {
            self.registry.validate_route(&listener.scope)?;
        }
        Ok(listener)
    }

    pub(crate) fn decode_frontend(&self, id: &str, value: &[u8]) -> Result<Frontend> {
        let mut frontend: Frontend = parse(Family::Frontend, id, value)?;
        frontend.id = id.to_string();
        frontend.validate()?;
        self.registry.validate_route(&frontend.route)?;
        Ok(frontend)
    }

    pub(crate) fn decode_middleware(&self, id: &str, value: &[u8]) -> Result<Middleware> {
        let mut middleware: Middleware = parse(Family::Middleware, id, value)?;
        middleware.id = id.to_string();
        middleware.validate()?;
        self.registry.decode_middleware(middleware)
    }

    pub(crate) fn decode_backend(&self, id: &str, value: &[u8]) -> Result<Backend> {
        let mut backend: Backend = parse(Family::Backend, id, value)?;
        backend.id = id.to_string();
        backend.validate()?;
        Ok(backend)
    }

    pub(crate) fn decode_server(&self, id: &str, value: &[u8]) -> Result<Server> {
        let mut server: Server = parse(Family::Server, id, value)?;
        server.id = id.to_string();
        server.validate()?;
        Ok(server)
    }

    /// Point read of one record, decoded; absence is [`Error::NotFound`].
    pub(crate) async fn read_record<T, F>(
        &self,
        family: Family,
        id: &str,
        key: &str,
        decode: F,
    ) -> Result<T>
    where
        F: FnOnce(&Self, &[u8]) -> Result<T>,
    {
        let kv = self
            .store
            .point_read(key, self.consistency)
            .await?
            .ok_or_else(|| Error::not_found(family.resource_type(), id))?;
        decode(self, &kv.value)
    }

    /// Records directly below `dir`, e.g. the servers of one backend.
    pub(crate) async fn read_children(&self, dir: &str) -> Result<Vec<KeyValue>> {
        let prefix = dir_prefix(dir);
        let listing = self.store.bulk_read(&prefix, self.consistency).await?;
        Ok(listing
            .kvs
            .into_iter()
            .filter(|kv| kv.key.get(prefix.len()..).is_some_and(|rest| !rest.contains('/')))
            .collect())
    }

    /// Frontend with its middleware chain. A malformed middleware is left
    /// out with a warning; a missing or malformed frontend is an error.
    pub(crate) async fn resolve_frontend_spec(&self, id: &str) -> Result<FrontendSpec> {
        let key = self.layout.frontend_key(id);
        let frontend =
            self.read_record(Family::Frontend, id, &key, |e, v| e.decode_frontend(id, v)).await?;

        let children = self.read_children(&self.layout.children_dir(Family::Middleware, id)).await?;
        let middlewares = children
            .iter()
            .filter_map(|kv| {
                let middleware_id = crate::keys::last_segment(&kv.key);
                self.decode_or_skip("read", Family::Middleware, &kv.key, || {
                    self.decode_middleware(middleware_id, &kv.value)
                })
            })
            .collect();

        Ok(FrontendSpec::new(frontend, middlewares))
    }

    /// Backend with its servers; malformed servers are left out with a warning.
    pub(crate) async fn resolve_backend_spec(&self, id: &str) -> Result<BackendSpec> {
        let key = self.layout.backend_key(id);
        let backend =
            self.read_record(Family::Backend, id, &key, |e, v| e.decode_backend(id, v)).await?;

        let children = self.read_children(&self.layout.children_dir(Family::Server, id)).await?;
        let servers = children
            .iter()
            .filter_map(|kv| {
                let server_id = crate::keys::last_segment(&kv.key);
                self.decode_or_skip("read", Family::Server, &kv.key, || {
                    self.decode_server(server_id, &kv.value)
                })
            })
            .collect();

        Ok(BackendSpec::new(backend, servers))
    }

    /// Run `decode`, turning a failure into a logged skip.
    pub(crate) fn decode_or_skip<T>(
        &self,
        stage: &'static str,
        family: Family,
        key: &str,
        decode: impl FnOnce() -> Result<T>,
    ) -> Option<T> {
        match decode() {
            Ok(entity) => Some(entity),
            Err(error) => {
                crate::engine_log!(
                    self.severity,
                    WARN,
                    family = %family,
                    key = %key,
                    error = %error,
                    stage,
                    "Skipping unusable record"
                );
                self.metrics.record_skipped(family, stage);
                None
            }
        }
    }
}
