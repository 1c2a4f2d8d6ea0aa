//! Host domain types
//!
//! A host carries the TLS material served for a hostname. The key pair is
//! the only field in the configuration tree that is sealed at rest; the
//! stored form ([`StoredHost`]) holds the sealed envelope bytes in place of
//! the key pair.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{base64_bytes, validate_id, HostKey, ValidationError};

/// Host definition with its TLS settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    /// Hostname, unique among hosts
    pub name: String,

    #[serde(default)]
    pub settings: HostSettings,
}

impl Host {
    /// Create a host, rejecting names that can not be a key segment
    pub fn new(name: impl Into<String>, settings: HostSettings) -> Result<Self, ValidationError> {
        let host = Self { name: name.into(), settings };
        host.validate()?;
        Ok(host)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_id("host", &self.name)
    }

    pub fn key(&self) -> HostKey {
        HostKey::new(self.name.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostSettings {
    /// Serve this host when SNI matches nothing else
    pub default: bool,

    pub key_pair: Option<KeyPair>,

    pub ocsp: OcspSettings,
}

/// PEM encoded certificate chain and private key
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    #[serde(with = "base64_bytes")]
    pub cert: Vec<u8>,

    #[serde(with = "base64_bytes")]
    pub key: Vec<u8>,
}

impl KeyPair {
    pub fn new(cert: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        Self { cert: cert.into(), key: key.into() }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("cert_len", &self.cert.len())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// OCSP stapling settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OcspSettings {
    pub enabled: bool,

    /// Refresh period, e.g. `1h`
    pub period: String,

    /// Responder URLs overriding those in the certificate
    pub responders: Vec<String>,

    pub skip_signature_check: bool,
}

/// Host as persisted: the key pair is replaced by its sealed envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredHost {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub settings: StoredHostSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct StoredHostSettings {
    pub default: bool,

    #[serde(with = "base64_bytes::option", skip_serializing_if = "Option::is_none")]
    pub key_pair: Option<Vec<u8>>,

    pub ocsp: OcspSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_requires_name() {
        assert_eq!(
            Host::new("", HostSettings::default()),
            Err(ValidationError::EmptyId("host"))
        );
        assert!(Host::new("example.com", HostSettings::default()).is_ok());
    }

    #[test]
    fn key_pair_debug_is_redacted() {
        let pair = KeyPair::new(b"-----BEGIN CERTIFICATE-----".to_vec(), b"private".to_vec());
        let rendered = format!("{:?}", pair);
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("private"));
    }

    #[test]
    fn stored_host_without_key_pair_omits_field() {
        let stored = StoredHost {
            name: "h1".to_string(),
            settings: StoredHostSettings { default: true, ..Default::default() },
        };
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["settings"]["default"], true);
        assert!(json["settings"].get("keyPair").is_none());
    }

    #[test]
    fn stored_host_reads_sealed_bytes_as_base64() {
        let stored: StoredHost = serde_json::from_str(
            r#"{"name":"h1","settings":{"keyPair":"c2VhbGVk","ocsp":{"enabled":true}}}"#,
        )
        .unwrap();
        assert_eq!(stored.settings.key_pair.as_deref(), Some(b"sealed".as_slice()));
        assert!(stored.settings.ocsp.enabled);
    }

    #[test]
    fn empty_key_pair_string_means_absent() {
        let stored: StoredHost =
            serde_json::from_str(r#"{"settings":{"keyPair":""}}"#).unwrap();
        assert!(stored.settings.key_pair.is_none());
    }
}
