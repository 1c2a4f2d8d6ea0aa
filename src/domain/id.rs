//! Entity keys with the NewType pattern
//!
//! Keys identify an entity without carrying its data; `Deleted` events and
//! point reads are expressed in terms of them. Each single-segment key type
//! implements Display, Serialize and Deserialize, and converts from strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate single-segment entity keys
macro_rules! entity_key {
    ($(#[$meta:meta])* $name:ident, $field:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name {
            pub $field: String,
        }

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self { $field: value.into() }
            }

            /// Get the inner string value
            pub fn as_str(&self) -> &str {
                &self.$field
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.$field)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }
    };
}

entity_key!(
    /// Identifies a host by name
    HostKey,
    name
);

entity_key!(
    /// Identifies a listener
    ListenerKey,
    id
);

entity_key!(
    /// Identifies a frontend
    FrontendKey,
    id
);

entity_key!(
    /// Identifies a backend
    BackendKey,
    id
);

/// Identifies a middleware within its frontend
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MiddlewareKey {
    pub frontend_key: FrontendKey,
    pub id: String,
}

impl MiddlewareKey {
    pub fn new(frontend_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self { frontend_key: FrontendKey::new(frontend_id), id: id.into() }
    }
}

impl fmt::Display for MiddlewareKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MiddlewareKey({}/{})", self.frontend_key.id, self.id)
    }
}

/// Identifies a server within its backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerKey {
    pub backend_key: BackendKey,
    pub id: String,
}

impl ServerKey {
    pub fn new(backend_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self { backend_key: BackendKey::new(backend_id), id: id.into() }
    }
}

impl fmt::Display for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerKey({}/{})", self.backend_key.id, self.id)
    }
}
