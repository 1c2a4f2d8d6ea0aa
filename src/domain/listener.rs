//! Listener domain types

use serde::{Deserialize, Serialize};

use super::{validate_id, ListenerKey, ValidationError};

/// Network listener accepting proxy traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    #[serde(default)]
    pub id: String,

    pub protocol: Protocol,

    pub address: Address,

    /// Route expression restricting which frontends this listener serves
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope: String,

    /// Protocol specific settings, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
}

impl Listener {
    pub fn new(id: impl Into<String>, protocol: Protocol, address: Address) -> Self {
        Self { id: id.into(), protocol, address, scope: String::new(), settings: None }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_id("listener", &self.id)?;
        if self.address.address.is_empty() {
            return Err(ValidationError::EmptyAddress);
        }
        Ok(())
    }

    pub fn key(&self) -> ListenerKey {
        ListenerKey::new(self.id.clone())
    }
}

/// Application protocol spoken on the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn requires_tls(&self) -> bool {
        matches!(self, Protocol::Https)
    }
}

/// Socket address with its network family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub network: Network,
    pub address: String,
}

impl Address {
    pub fn tcp(address: impl Into<String>) -> Self {
        Self { network: Network::Tcp, address: address.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Tcp,
    Unix,
}
