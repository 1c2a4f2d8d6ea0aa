//! Built-in middleware specs
//!
//! Each spec is a typed, validated view of a middleware's opaque JSON
//! configuration. Decoding through a spec fills in defaults, so the value
//! handed to the proxy is normalized.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

lazy_static! {
    static ref VARIABLE_REGEX: Regex =
        Regex::new(r"^(client\.ip|request\.host|request\.header\.[A-Za-z0-9-]+)$")
            .expect("VARIABLE_REGEX should be a valid regex pattern");
}

fn default_variable() -> String {
    "client.ip".to_string()
}

fn default_one() -> u64 {
    1
}

/// Token bucket rate limiting keyed by a request variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    #[serde(default = "default_one")]
    #[validate(range(min = 1, message = "periodSeconds must be at least 1"))]
    pub period_seconds: u64,

    #[validate(range(min = 1, message = "requests must be at least 1"))]
    pub requests: u64,

    #[serde(default = "default_one")]
    #[validate(range(min = 1, message = "burst must be at least 1"))]
    pub burst: u64,

    #[serde(default = "default_variable")]
    #[validate(custom(function = "validate_variable"))]
    pub variable: String,
}

/// Concurrent connection limit keyed by a request variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConnLimit {
    #[validate(range(min = 1, message = "connections must be at least 1"))]
    pub connections: u64,

    #[serde(default = "default_variable")]
    #[validate(custom(function = "validate_variable"))]
    pub variable: String,
}

/// URL rewrite or redirect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Rewrite {
    #[validate(custom(function = "validate_pattern"))]
    pub regexp: String,

    pub replacement: String,

    #[serde(default)]
    pub rewrite_body: bool,

    /// Answer with a redirect instead of rewriting in place
    #[serde(default)]
    pub redirect: bool,
}

fn validate_variable(variable: &str) -> Result<(), ValidationError> {
    if VARIABLE_REGEX.is_match(variable) {
        Ok(())
    } else {
        Err(ValidationError::new("unsupported_variable"))
    }
}

fn validate_pattern(pattern: &str) -> Result<(), ValidationError> {
    Regex::new(pattern).map(|_| ()).map_err(|_| ValidationError::new("invalid_regexp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rate_limit_fills_defaults() {
        let spec: RateLimit = serde_json::from_value(json!({"requests": 10})).unwrap();
        assert!(spec.validate().is_ok());
        assert_eq!(spec.period_seconds, 1);
        assert_eq!(spec.burst, 1);
        assert_eq!(spec.variable, "client.ip");
    }

    #[test]
    fn rate_limit_rejects_zero_requests() {
        let spec: RateLimit = serde_json::from_value(json!({"requests": 0})).unwrap();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn variables_are_checked() {
        assert!(validate_variable("request.header.X-Forwarded-For").is_ok());
        assert!(validate_variable("request.host").is_ok());
        assert!(validate_variable("client.port").is_err());
    }

    #[test]
    fn rewrite_requires_valid_regexp() {
        let spec: Rewrite =
            serde_json::from_value(json!({"regexp": "^/old/(.*)", "replacement": "/new/$1"}))
                .unwrap();
        assert!(spec.validate().is_ok());

        let spec: Rewrite =
            serde_json::from_value(json!({"regexp": "(", "replacement": "/"})).unwrap();
        assert!(spec.validate().is_err());
    }
}
