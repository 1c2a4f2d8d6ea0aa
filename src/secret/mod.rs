//! # Secret Codec Boundary
//!
//! Seals protected fields before they are written and opens them after they
//! are read. The capability doing the actual cryptography is injected as a
//! [`SecretCodec`]; an engine built without one can still read and write
//! every entity that carries no protected data.
//!
//! Host key pairs are the only protected field. They are JSON encoded and
//! then sealed, so the stored bytes are an opaque envelope.

pub mod sealbox;

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::domain::KeyPair;
use crate::errors::{Error, Result};

pub use sealbox::{SealedValue, SecretBox};

/// Capability that seals bytes into a storable envelope and back.
pub trait SecretCodec: Send + Sync + fmt::Debug {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Fails with [`Error::Secret`] on a malformed envelope or failed decryption.
    fn open(&self, envelope: &[u8]) -> Result<Vec<u8>>;
}

/// Optional codec shared by the read and write paths.
#[derive(Debug, Clone, Default)]
pub struct SecretBoundary {
    codec: Option<Arc<dyn SecretCodec>>,
}

impl SecretBoundary {
    pub fn new(codec: Arc<dyn SecretCodec>) -> Self {
        Self { codec: Some(codec) }
    }

    /// Boundary with no capability: protected data can not be handled
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.codec.is_some()
    }

    fn codec(&self) -> Result<&Arc<dyn SecretCodec>> {
        self.codec
            .as_ref()
            .ok_or_else(|| Error::config("this engine has no secret box to handle sealed data"))
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.codec()?.seal(plaintext)
    }

    pub fn open(&self, envelope: &[u8]) -> Result<Vec<u8>> {
        self.codec()?.open(envelope)
    }

    /// JSON encode a key pair and seal it
    pub fn seal_key_pair(&self, key_pair: &KeyPair) -> Result<Vec<u8>> {
        let codec = self.codec()?;
        let plaintext = zeroize::Zeroizing::new(
            serde_json::to_vec(key_pair)
                .map_err(|e| Error::serialization(e, "encoding host key pair"))?,
        );
        codec.seal(&plaintext)
    }

    /// Open a sealed key pair
    pub fn open_key_pair(&self, envelope: &[u8]) -> Result<KeyPair> {
        let plaintext = zeroize::Zeroizing::new(self.open(envelope)?);
        let key_pair = serde_json::from_slice(&plaintext)
            .map_err(|e| Error::secret(format!("sealed key pair is not valid JSON: {}", e)))?;
        debug!(envelope_len = envelope.len(), "Opened host key pair");
        Ok(key_pair)
    }
}
