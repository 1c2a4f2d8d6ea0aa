//! Frontend and middleware domain types

use serde::{Deserialize, Serialize};

use super::{validate_id, FrontendKey, MiddlewareKey, ValidationError};

fn default_http() -> String {
    "http".to_string()
}

/// Frontend: a route expression bound to a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frontend {
    #[serde(default)]
    pub id: String,

    /// Route expression, validated by the plugin registry's route parser
    pub route: String,

    pub backend_id: String,

    #[serde(rename = "type", default = "default_http")]
    pub frontend_type: String,

    /// Limits, failover and header settings, passed through untouched
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl Frontend {
    pub fn new(
        id: impl Into<String>,
        backend_id: impl Into<String>,
        route: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            route: route.into(),
            backend_id: backend_id.into(),
            frontend_type: default_http(),
            settings: serde_json::Map::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_id("frontend", &self.id)?;
        if self.route.trim().is_empty() {
            return Err(ValidationError::EmptyRoute);
        }
        if self.backend_id.is_empty() {
            return Err(ValidationError::MissingBackendId);
        }
        Ok(())
    }

    pub fn key(&self) -> FrontendKey {
        FrontendKey::new(self.id.clone())
    }
}

/// Request/response processing step attached to a frontend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Middleware {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub priority: i32,

    /// Registry type name, e.g. `ratelimit`
    #[serde(rename = "type")]
    pub middleware_type: String,

    /// Type specific configuration as normalized by the registry decoder
    #[serde(default)]
    pub middleware: serde_json::Value,
}

impl Middleware {
    pub fn new(
        id: impl Into<String>,
        middleware_type: impl Into<String>,
        middleware: serde_json::Value,
    ) -> Self {
        Self { id: id.into(), priority: 0, middleware_type: middleware_type.into(), middleware }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_id("middleware", &self.id)?;
        if self.middleware_type.is_empty() {
            return Err(ValidationError::EmptyMiddlewareType);
        }
        Ok(())
    }

    pub fn key(&self, frontend_key: &FrontendKey) -> MiddlewareKey {
        MiddlewareKey { frontend_key: frontend_key.clone(), id: self.id.clone() }
    }
}

/// Frontend together with its middleware chain, ordered by middleware id
#[derive(Debug, Clone, PartialEq)]
pub struct FrontendSpec {
    pub frontend: Frontend,
    pub middlewares: Vec<Middleware>,
}

impl FrontendSpec {
    pub fn new(frontend: Frontend, mut middlewares: Vec<Middleware>) -> Self {
        middlewares.sort_by(|a, b| a.id.cmp(&b.id));
        Self { frontend, middlewares }
    }

    pub fn key(&self) -> FrontendKey {
        self.frontend.key()
    }

    pub fn middleware(&self, id: &str) -> Option<&Middleware> {
        self.middlewares.iter().find(|m| m.id == id)
    }
}
