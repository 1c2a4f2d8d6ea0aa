//! # Error Types
//!
//! Error taxonomy for the routeplane engine using `thiserror`.

/// Custom result type for routeplane operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the routeplane engine
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Store unreachable, subscription canceled or compacted away
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The watched revision was compacted by the store
    #[error("Watch canceled: revision {requested} compacted (oldest available {compact_revision})")]
    Compacted { requested: u64, compact_revision: u64 },

    /// Entity or key does not exist
    #[error("Resource not found: {resource_type} '{id}'")]
    NotFound { resource_type: String, id: String },

    /// Payload failed to deserialize
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Entity is well-formed JSON but violates its own rules
    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    /// Referential integrity or existence conflict on the write path
    #[error("Resource conflict: {message}")]
    Conflict { message: String, resource_type: String },

    /// Protected data present but no capability to handle it
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Sealed envelope malformed or failed to open
    #[error("Secret error: {message}")]
    Secret { message: String },

    /// Matched key received a mutation kind the family does not support
    #[error("Unsupported action '{action}' on {resource_type} key '{key}'")]
    UnsupportedAction { action: String, resource_type: String, key: String },

    /// Engine configuration values out of range
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Internal invariant broken
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport { message: message.into(), source: None }
    }

    /// Create a transport error with source
    pub fn transport_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Transport { message: message.into(), source: Some(source) }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Wrap a deserialization failure with context
    pub fn serialization<S: Into<String>>(source: serde_json::Error, context: S) -> Self {
        Self::Serialization { source, context: context.into() }
    }

    /// Create an invalid format error
    pub fn invalid_format<S: Into<String>>(message: S) -> Self {
        Self::InvalidFormat { message: message.into() }
    }

    /// Create a conflict error
    pub fn conflict<M: Into<String>, R: Into<String>>(message: M, resource_type: R) -> Self {
        Self::Conflict { message: message.into(), resource_type: resource_type.into() }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a secret envelope error
    pub fn secret<S: Into<String>>(message: S) -> Self {
        Self::Secret { message: message.into() }
    }

    /// Create an unsupported action error
    pub fn unsupported_action<A, R, K>(action: A, resource_type: R, key: K) -> Self
    where
        A: Into<String>,
        R: Into<String>,
        K: Into<String>,
    {
        Self::UnsupportedAction {
            action: action.into(),
            resource_type: resource_type.into(),
            key: key.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// True for point-read races where the entity is gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// True for payloads that can be skipped locally
    pub fn is_malformed(&self) -> bool {
        matches!(self, Error::Serialization { .. } | Error::InvalidFormat { .. })
    }

    /// Errors that end a watch and require a re-bootstrap
    pub fn is_fatal_for_watch(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::Compacted { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON decoding failed".to_string() }
    }
}

impl From<base64::DecodeError> for Error {
    fn from(error: base64::DecodeError) -> Self {
        Self::Secret { message: format!("invalid base64: {}", error) }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = Error::config("need a secret box to open sealed data");
        assert!(matches!(error, Error::Config { .. }));
        assert_eq!(
            error.to_string(),
            "Configuration error: need a secret box to open sealed data"
        );
    }

    #[test]
    fn test_not_found_display() {
        let error = Error::not_found("host", "h1");
        assert!(error.is_not_found());
        assert_eq!(error.to_string(), "Resource not found: host 'h1'");
    }

    #[test]
    fn test_classification_helpers() {
        assert!(Error::transport("connection reset").is_fatal_for_watch());
        assert!(Error::Compacted { requested: 3, compact_revision: 10 }.is_fatal_for_watch());
        assert!(!Error::not_found("server", "s1").is_fatal_for_watch());
        assert!(Error::invalid_format("empty id").is_malformed());
        assert!(!Error::config("no box").is_malformed());
    }

    #[test]
    fn test_error_conversions() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: Error = json_error.into();
        assert!(matches!(error, Error::Serialization { .. }));
        assert!(error.is_malformed());
    }

    #[test]
    fn test_unsupported_action_display() {
        let error = Error::unsupported_action("expire", "host", "/root/hosts/h1/host");
        assert_eq!(
            error.to_string(),
            "Unsupported action 'expire' on host key '/root/hosts/h1/host'"
        );
    }
}
