//! Domain layer
//!
//! Typed routing configuration as seen by the proxy: hosts, listeners,
//! frontends with their middleware chains, backends with their servers, the
//! point-in-time [`Snapshot`] and the [`ChangeEvent`]s that move a consumer
//! from one snapshot to the next.
//!
//! Domain types know nothing about keys or the store. They serialize as
//! camelCase JSON; the id of every entity is taken from its key path when
//! decoded, so a payload's own `id` field is advisory.

pub mod backend;
pub mod event;
pub mod frontend;
pub mod host;
pub mod id;
pub mod listener;
pub mod snapshot;

pub use backend::{Backend, BackendSpec, Server};
pub use event::{ChangeEvent, WatchEvent};
pub use frontend::{Frontend, FrontendSpec, Middleware};
pub use host::{Host, HostSettings, KeyPair, OcspSettings};
pub use id::{BackendKey, FrontendKey, HostKey, ListenerKey, MiddlewareKey, ServerKey};
pub use listener::{Address, Listener, Network, Protocol};
pub use snapshot::Snapshot;

use crate::keys::is_valid_segment;

/// Rule violations found while decoding or before writing an entity
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} id can not be empty")]
    EmptyId(&'static str),

    #[error("{0} id '{1}' can not contain '/'")]
    InvalidId(&'static str, String),

    #[error("listener address can not be empty")]
    EmptyAddress,

    #[error("frontend route can not be empty")]
    EmptyRoute,

    #[error("frontend backend id can not be empty")]
    MissingBackendId,

    #[error("middleware type can not be empty")]
    EmptyMiddlewareType,

    #[error("server url can not be empty")]
    EmptyUrl,

    #[error("server url '{0}' is invalid: {1}")]
    InvalidUrl(String, String),

    #[error("server weight must be greater than zero")]
    ZeroWeight,
}

impl From<ValidationError> for crate::Error {
    fn from(error: ValidationError) -> Self {
        crate::Error::invalid_format(error.to_string())
    }
}

/// Ids end up as key segments
pub(crate) fn validate_id(resource_type: &'static str, id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::EmptyId(resource_type));
    }
    if !is_valid_segment(id) {
        return Err(ValidationError::InvalidId(resource_type, id.to_string()));
    }
    Ok(())
}

/// Byte fields travel as standard base64 strings inside JSON payloads.
pub(crate) mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use base64::Engine;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => super::serialize(bytes, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            let encoded = Option::<String>::deserialize(deserializer)?;
            match encoded {
                Some(encoded) if !encoded.is_empty() => base64::engine::general_purpose::STANDARD
                    .decode(encoded.as_bytes())
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                _ => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert_eq!(validate_id("host", "h1"), Ok(()));
        assert_eq!(validate_id("host", ""), Err(ValidationError::EmptyId("host")));
        assert_eq!(
            validate_id("server", "a/b"),
            Err(ValidationError::InvalidId("server", "a/b".to_string()))
        );
    }

    #[test]
    fn test_validation_error_becomes_invalid_format() {
        let error: crate::Error = ValidationError::EmptyRoute.into();
        assert!(error.is_malformed());
        assert_eq!(error.to_string(), "Invalid format: frontend route can not be empty");
    }
}
