//! Point reads
//!
//! Single entities are read with one point read (plus a child listing for
//! frontend and backend specs) and fail with [`crate::Error::NotFound`] when absent
//! and with the decode error when unusable. Collections go through the
//! snapshot assembler on a narrower listing, so they skip unusable records
//! exactly as a bootstrap does.

use super::Engine;
use crate::domain::{
    Backend, BackendKey, BackendSpec, Frontend, FrontendKey, FrontendSpec, Host, HostKey,
    Listener, ListenerKey, Middleware, MiddlewareKey, Server, ServerKey, Snapshot,
};
use crate::errors::Result;
use crate::keys::{dir_prefix, last_segment, Family};

impl Engine {
    async fn read_collection(&self, family: Family) -> Result<Snapshot> {
        let prefix = dir_prefix(&self.layout.collection_dir(family));
        let listing = self.store.bulk_read(&prefix, self.consistency).await?;
        Ok(self.assemble(&listing))
    }

    pub async fn host(&self, key: &HostKey) -> Result<Host> {
        let record = self.layout.host_key(&key.name);
        self.read_record(Family::Host, &key.name, &record, |e, v| e.decode_host(&key.name, v))
            .await
    }

    pub async fn hosts(&self) -> Result<Vec<Host>> {
        Ok(self.read_collection(Family::Host).await?.hosts)
    }

    pub async fn listener(&self, key: &ListenerKey) -> Result<Listener> {
        let record = self.layout.listener_key(&key.id);
        self.read_record(Family::Listener, &key.id, &record, |e, v| e.decode_listener(&key.id, v))
            .await
    }

    pub async fn listeners(&self) -> Result<Vec<Listener>> {
        Ok(self.read_collection(Family::Listener).await?.listeners)
    }

    /// The frontend record alone, without middlewares
    pub async fn frontend(&self, key: &FrontendKey) -> Result<Frontend> {
        let record = self.layout.frontend_key(&key.id);
        self.read_record(Family::Frontend, &key.id, &record, |e, v| e.decode_frontend(&key.id, v))
            .await
    }

    pub async fn frontend_spec(&self, key: &FrontendKey) -> Result<FrontendSpec> {
        self.resolve_frontend_spec(&key.id).await
    }

    pub async fn frontends(&self) -> Result<Vec<FrontendSpec>> {
        Ok(self.read_collection(Family::Frontend).await?.frontends)
    }

    pub async fn middleware(&self, key: &MiddlewareKey) -> Result<Middleware> {
        let record = self.layout.middleware_key(&key.frontend_key.id, &key.id);
        self.read_record(Family::Middleware, &key.id, &record, |e, v| {
            e.decode_middleware(&key.id, v)
        })
        .await
    }

    /// Middlewares of one frontend ordered by id; unusable ones are skipped
    pub async fn middlewares(&self, frontend: &FrontendKey) -> Result<Vec<Middleware>> {
        let dir = self.layout.children_dir(Family::Middleware, &frontend.id);
        let mut middlewares: Vec<Middleware> = self
            .read_children(&dir)
            .await?
            .iter()
            .filter_map(|kv| {
                self.decode_or_skip("read", Family::Middleware, &kv.key, || {
                    self.decode_middleware(last_segment(&kv.key), &kv.value)
                })
            })
            .collect();
        middlewares.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(middlewares)
    }

    /// The backend record alone, without servers
    pub async fn backend(&self, key: &BackendKey) -> Result<Backend> {
        let record = self.layout.backend_key(&key.id);
        self.read_record(Family::Backend, &key.id, &record, |e, v| e.decode_backend(&key.id, v))
            .await
    }

    pub async fn backend_spec(&self, key: &BackendKey) -> Result<BackendSpec> {
        self.resolve_backend_spec(&key.id).await
    }

    pub async fn backends(&self) -> Result<Vec<BackendSpec>> {
        Ok(self.read_collection(Family::Backend).await?.backends)
    }

    pub async fn server(&self, key: &ServerKey) -> Result<Server> {
        let record = self.layout.server_key(&key.backend_key.id, &key.id);
        self.read_record(Family::Server, &key.id, &record, |e, v| e.decode_server(&key.id, v))
            .await
    }

    /// Servers of one backend ordered by id; unusable ones are skipped
    pub async fn servers(&self, backend: &BackendKey) -> Result<Vec<Server>> {
        let dir = self.layout.children_dir(Family::Server, &backend.id);
        let mut servers: Vec<Server> = self
            .read_children(&dir)
            .await?
            .iter()
            .filter_map(|kv| {
                self.decode_or_skip("read", Family::Server, &kv.key, || {
                    self.decode_server(last_segment(&kv.key), &kv.value)
                })
            })
            .collect();
        servers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(servers)
    }
}
