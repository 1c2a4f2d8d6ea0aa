//! Backend and server domain types

use serde::{Deserialize, Serialize};

use super::{validate_id, BackendKey, ServerKey, ValidationError};

fn default_http() -> String {
    "http".to_string()
}

fn default_weight() -> u32 {
    1
}

/// Backend: transport settings shared by a pool of servers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type", default = "default_http")]
    pub backend_type: String,

    /// Timeouts, keep-alive and upstream TLS, passed through untouched
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl Backend {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), backend_type: default_http(), settings: serde_json::Map::new() }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_id("backend", &self.id)
    }

    pub fn key(&self) -> BackendKey {
        BackendKey::new(self.id.clone())
    }
}

/// Upstream server receiving traffic for a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    #[serde(default)]
    pub id: String,

    pub url: String,

    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl Server {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self { id: id.into(), url: url.into(), weight: default_weight() }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_id("server", &self.id)?;
        if self.url.is_empty() {
            return Err(ValidationError::EmptyUrl);
        }
        url::Url::parse(&self.url)
            .map_err(|e| ValidationError::InvalidUrl(self.url.clone(), e.to_string()))?;
        if self.weight == 0 {
            return Err(ValidationError::ZeroWeight);
        }
        Ok(())
    }

    pub fn key(&self, backend_key: &BackendKey) -> ServerKey {
        ServerKey { backend_key: backend_key.clone(), id: self.id.clone() }
    }
}

/// Backend together with its servers, ordered by server id
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSpec {
    pub backend: Backend,
    pub servers: Vec<Server>,
}

impl BackendSpec {
    pub fn new(backend: Backend, mut servers: Vec<Server>) -> Self {
        servers.sort_by(|a, b| a.id.cmp(&b.id));
        Self { backend, servers }
    }

    pub fn key(&self) -> BackendKey {
        self.backend.key()
    }

    pub fn server(&self, id: &str) -> Option<&Server> {
        self.servers.iter().find(|s| s.id == id)
    }
}
