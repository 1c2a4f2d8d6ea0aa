//! # Plugin Registry
//!
//! Injected capability that gives meaning to the opaque parts of the
//! configuration tree: it maps middleware type names to decoders and
//! validates frontend route expressions. The engine never interprets a
//! middleware payload itself.
//!
//! ```rust,ignore
//! let mut registry = Registry::with_builtins();
//! registry.register_spec::<MyAuth>("auth")?;
//! ```

pub mod middleware;
pub mod route;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use validator::Validate;

use crate::domain::Middleware;
use crate::errors::{Error, Result};

pub use middleware::{ConnLimit, RateLimit, Rewrite};
pub use route::{Matcher, MatcherKind, Route, RouteParser};

/// Decodes and normalizes one middleware type's configuration
pub type MiddlewareDecoder = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// Registered middleware type
#[derive(Clone)]
pub struct MiddlewareSpec {
    pub type_name: String,
    decoder: MiddlewareDecoder,
}

impl MiddlewareSpec {
    pub fn new(type_name: impl Into<String>, decoder: MiddlewareDecoder) -> Self {
        Self { type_name: type_name.into(), decoder }
    }

    /// Spec whose decoder round-trips through a typed, validated struct
    pub fn typed<T>(type_name: impl Into<String>) -> Self
    where
        T: DeserializeOwned + Serialize + Validate + 'static,
    {
        let type_name = type_name.into();
        let name = type_name.clone();
        let decoder: MiddlewareDecoder = Arc::new(move |value: &Value| {
            let spec: T = serde_json::from_value(value.clone())
                .map_err(|e| Error::serialization(e, format!("decoding {} middleware", name)))?;
            spec.validate()
                .map_err(|e| Error::invalid_format(format!("{} middleware: {}", name, e)))?;
            serde_json::to_value(&spec)
                .map_err(|e| Error::serialization(e, format!("encoding {} middleware", name)))
        });
        Self { type_name, decoder }
    }

    pub fn decode(&self, value: &Value) -> Result<Value> {
        (self.decoder)(value)
    }
}

impl fmt::Debug for MiddlewareSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareSpec").field("type_name", &self.type_name).finish()
    }
}

/// Middleware types and route parser known to the engine
#[derive(Clone)]
pub struct Registry {
    specs: HashMap<String, MiddlewareSpec>,
    router: RouteParser,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("middleware_types", &self.middleware_types()).finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl Registry {
    /// Registry with no middleware types
    pub fn new() -> Self {
        Self { specs: HashMap::new(), router: RouteParser::new() }
    }

    /// Registry with `ratelimit`, `connlimit` and `rewrite`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for spec in [
            MiddlewareSpec::typed::<RateLimit>("ratelimit"),
            MiddlewareSpec::typed::<ConnLimit>("connlimit"),
            MiddlewareSpec::typed::<Rewrite>("rewrite"),
        ] {
            registry.specs.insert(spec.type_name.clone(), spec);
        }
        registry
    }

    /// Add a middleware type; registering a name twice is a conflict.
    pub fn register(&mut self, spec: MiddlewareSpec) -> Result<()> {
        if self.specs.contains_key(&spec.type_name) {
            return Err(Error::conflict(
                format!("middleware type '{}' is already registered", spec.type_name),
                "middleware_type",
            ));
        }
        debug!(middleware_type = %spec.type_name, "Registering middleware type");
        self.specs.insert(spec.type_name.clone(), spec);
        Ok(())
    }

    pub fn register_spec<T>(&mut self, type_name: &str) -> Result<()>
    where
        T: DeserializeOwned + Serialize + Validate + 'static,
    {
        self.register(MiddlewareSpec::typed::<T>(type_name))
    }

    pub fn spec(&self, type_name: &str) -> Option<&MiddlewareSpec> {
        self.specs.get(type_name)
    }

    /// Registered type names, sorted
    pub fn middleware_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.specs.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn router(&self) -> &RouteParser {
        &self.router
    }

    /// Replace a middleware's payload with its decoded, normalized form.
    pub fn decode_middleware(&self, mut middleware: Middleware) -> Result<Middleware> {
        let spec = self.spec(&middleware.middleware_type).ok_or_else(|| {
            Error::invalid_format(format!(
                "middleware '{}' has unknown type '{}'",
                middleware.id, middleware.middleware_type
            ))
        })?;
        middleware.middleware = spec.decode(&middleware.middleware)?;
        Ok(middleware)
    }

    pub fn validate_route(&self, route: &str) -> Result<()> {
        self.router.validate(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, Validate)]
    struct Auth {
        #[validate(length(min = 1))]
        realm: String,
    }

    #[test]
    fn builtins_are_registered() {
        let registry = Registry::with_builtins();
        assert_eq!(registry.middleware_types(), vec!["connlimit", "ratelimit", "rewrite"]);
        assert!(Registry::new().middleware_types().is_empty());
    }

    #[test]
    fn decode_normalizes_payload() {
        let registry = Registry::with_builtins();
        let middleware = Middleware::new("m1", "ratelimit", json!({"requests": 5}));

        let decoded = registry.decode_middleware(middleware).unwrap();
        assert_eq!(decoded.middleware["periodSeconds"], 1);
        assert_eq!(decoded.middleware["variable"], "client.ip");
    }

    #[test]
    fn unknown_and_invalid_payloads_are_malformed() {
        let registry = Registry::with_builtins();

        let error = registry
            .decode_middleware(Middleware::new("m1", "teleport", json!({})))
            .unwrap_err();
        assert!(error.is_malformed());

        let error = registry
            .decode_middleware(Middleware::new("m1", "connlimit", json!({"connections": "many"})))
            .unwrap_err();
        assert!(error.is_malformed());

        let error = registry
            .decode_middleware(Middleware::new("m1", "connlimit", json!({"connections": 0})))
            .unwrap_err();
        assert!(error.is_malformed());
    }

    #[test]
    fn custom_types_can_be_registered_once() {
        let mut registry = Registry::with_builtins();
        registry.register_spec::<Auth>("auth").unwrap();
        assert!(registry.spec("auth").is_some());

        let error = registry.register_spec::<Auth>("auth").unwrap_err();
        assert!(matches!(error, Error::Conflict { .. }));
    }

    #[test]
    fn route_validation_is_delegated() {
        let registry = Registry::with_builtins();
        assert!(registry.validate_route(r#"Host("a") && Path("/")"#).is_ok());
        assert!(registry.validate_route("Path(").is_err());
    }
}
