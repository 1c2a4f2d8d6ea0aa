//! AES-256-GCM secret box
//!
//! Seals payloads into a self-describing JSON envelope:
//!
//! ```json
//! { "encryption": { "type": "aes-256-gcm", "nonce": "<base64>" }, "value": "<base64>" }
//! ```
//!
//! `value` is the ciphertext with the authentication tag appended. Every
//! seal draws a fresh random nonce, so sealing the same plaintext twice
//! yields different envelopes.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};
use zeroize::Zeroizing;

use super::SecretCodec;
use crate::domain::base64_bytes;
use crate::errors::{Error, Result};

/// Cipher name recorded in every envelope
pub const CIPHER: &str = "aes-256-gcm";

/// Size of the AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

const NONCE_SIZE: usize = 12;

const TAG_SIZE: usize = 16;

/// Stored form of a sealed payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedValue {
    pub encryption: EncryptionInfo,

    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionInfo {
    #[serde(rename = "type")]
    pub cipher: String,

    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
}

/// Single-use nonce sequence for AES-GCM
struct SingleNonce {
    nonce: Option<[u8; NONCE_SIZE]>,
}

impl SingleNonce {
    fn new(nonce_bytes: [u8; NONCE_SIZE]) -> Self {
        Self { nonce: Some(nonce_bytes) }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.nonce.take().map(Nonce::assume_unique_for_key).ok_or(ring::error::Unspecified)
    }
}

/// [`SecretCodec`] backed by one AES-256-GCM key
#[derive(Clone)]
pub struct SecretBox {
    key_bytes: Arc<Zeroizing<[u8; KEY_SIZE]>>,
    rng: Arc<SystemRandom>,
}

impl SecretBox {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key_bytes: Arc::new(Zeroizing::new(key)), rng: Arc::new(SystemRandom::new()) }
    }

    /// Build from a base64 encoded 32-byte key
    pub fn from_base64_key(encoded: &str) -> Result<Self> {
        let key_bytes = Zeroizing::new(
            base64::engine::general_purpose::STANDARD.decode(encoded.trim()).map_err(|e| {
                Error::config(format!("Invalid base64 in seal key: {}", e))
            })?,
        );

        if key_bytes.len() != KEY_SIZE {
            return Err(Error::config(format!(
                "Seal key must be {} bytes (256 bits), got {} bytes",
                KEY_SIZE,
                key_bytes.len()
            )));
        }

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&key_bytes);
        let secret_box = Self::new(key);
        key.fill(0);

        debug!("Secret box initialized");
        Ok(secret_box)
    }

    /// Fresh random key, base64 encoded, suitable for [`SecretBox::from_base64_key`]
    pub fn generate_key() -> Result<String> {
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        SystemRandom::new()
            .fill(&mut key[..])
            .map_err(|_| Error::internal("Failed to generate random seal key"))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(&key[..]))
    }

    fn unbound_key(&self) -> Result<UnboundKey> {
        UnboundKey::new(&AES_256_GCM, &**self.key_bytes).map_err(|_| {
            error!("Failed to create AES-256-GCM key");
            Error::internal("Failed to create AES-256-GCM key")
        })
    }

    /// Encrypt `plaintext` into an envelope value
    #[instrument(skip(self, plaintext), fields(plaintext_len = plaintext.len()))]
    pub fn seal_value(&self, plaintext: &[u8]) -> Result<SealedValue> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng.fill(&mut nonce_bytes).map_err(|_| {
            error!("Failed to generate random nonce");
            Error::internal("Failed to generate random nonce for sealing")
        })?;

        let mut sealing_key =
            aead::SealingKey::new(self.unbound_key()?, SingleNonce::new(nonce_bytes));

        let mut ciphertext = plaintext.to_vec();
        ciphertext.reserve(TAG_SIZE);
        sealing_key.seal_in_place_append_tag(Aad::empty(), &mut ciphertext).map_err(|_| {
            error!("Sealing failed");
            Error::internal("Failed to seal secret data")
        })?;

        Ok(SealedValue {
            encryption: EncryptionInfo { cipher: CIPHER.to_string(), nonce: nonce_bytes.to_vec() },
            value: ciphertext,
        })
    }

    /// Decrypt an envelope value, verifying its authentication tag
    #[instrument(skip(self, sealed), fields(ciphertext_len = sealed.value.len()))]
    pub fn open_value(&self, sealed: &SealedValue) -> Result<Vec<u8>> {
        if sealed.encryption.cipher != CIPHER {
            return Err(Error::secret(format!(
                "unsupported cipher '{}', expected '{}'",
                sealed.encryption.cipher, CIPHER
            )));
        }

        let nonce_bytes: [u8; NONCE_SIZE] =
            sealed.encryption.nonce.as_slice().try_into().map_err(|_| {
                Error::secret(format!(
                    "Invalid nonce length: expected {} bytes, got {} bytes",
                    NONCE_SIZE,
                    sealed.encryption.nonce.len()
                ))
            })?;

        if sealed.value.len() < TAG_SIZE {
            return Err(Error::secret("Ciphertext too short (missing authentication tag)"));
        }

        let mut opening_key =
            aead::OpeningKey::new(self.unbound_key()?, SingleNonce::new(nonce_bytes));

        let mut buffer = sealed.value.clone();
        let plaintext = opening_key.open_in_place(Aad::empty(), &mut buffer).map_err(|_| {
            error!("Opening failed - possible tampering or wrong key");
            Error::secret("Failed to open sealed data - authentication failed")
        })?;

        Ok(plaintext.to_vec())
    }
}

impl SecretCodec for SecretBox {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let sealed = self.seal_value(plaintext)?;
        serde_json::to_vec(&sealed).map_err(|e| Error::serialization(e, "encoding sealed envelope"))
    }

    fn open(&self, envelope: &[u8]) -> Result<Vec<u8>> {
        let sealed: SealedValue = serde_json::from_slice(envelope)
            .map_err(|e| Error::secret(format!("malformed sealed envelope: {}", e)))?;
        self.open_value(&sealed)
    }
}

impl fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBox")
            .field("cipher", &CIPHER)
            .field("key_bytes", &"[REDACTED]")
            .finish()
    }
}
