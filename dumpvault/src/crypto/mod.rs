//! At-rest encryption of dump artifacts.
//!
//! Two interchangeable transforms sit behind [`CryptoTransform`]:
//!
//! - **gcm** (default): AES-256-GCM with a random nonce per artifact.
//!   Tampering, truncation and wrong keys are detected on decrypt.
//! - **legacy**: AES in ECB mode with PKCS#7 padding. Identical plaintexts
//!   produce identical ciphertexts and there is no integrity check. Only use
//!   it to read or produce archives for tooling that expects that format.
//!
//! The key is read once from configuration and shared read-only by every job.

mod gcm;
mod legacy;

pub use gcm::AesGcmTransform;
pub use legacy::LegacyEcbTransform;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use zeroize::Zeroizing;

/// Errors raised by key parsing, encryption and decryption.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key material has the wrong length or encoding
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Ciphertext is truncated, misaligned or carries an unknown header
    #[error("Malformed ciphertext: {0}")]
    Malformed(String),

    /// Authentication tag or padding check failed
    #[error("Decryption failed (wrong key or corrupted data)")]
    Decryption,

    /// Cipher refused to encrypt
    #[error("Encryption failed: {0}")]
    Encryption(String),
}

/// Symmetric transform applied to a whole artifact.
pub trait CryptoTransform: Send + Sync {
    /// Short name used in logs (`gcm`, `legacy`).
    fn name(&self) -> &'static str;

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Cipher selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherMode {
    /// AES-256-GCM, authenticated, random nonce
    #[default]
    Gcm,
    /// AES-ECB with PKCS#7 padding, unauthenticated
    Legacy,
}

impl std::fmt::Display for CipherMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CipherMode::Gcm => write!(f, "gcm"),
            CipherMode::Legacy => write!(f, "legacy"),
        }
    }
}

impl std::str::FromStr for CipherMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gcm" | "aes-gcm" | "aes-256-gcm" => Ok(CipherMode::Gcm),
            "legacy" | "ecb" | "aes-ecb" => Ok(CipherMode::Legacy),
            _ => Err(format!("Invalid cipher mode '{}'. Use 'gcm' or 'legacy'", s)),
        }
    }
}

/// Raw key material, wiped from memory on drop.
#[derive(Clone)]
pub struct CryptoKey {
    bytes: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for CryptoKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoKey")
            .field("len", &self.bytes.len())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl CryptoKey {
    /// Size of a freshly generated key (AES-256).
    pub const GENERATED_LEN: usize = 32;

    /// Wrap raw bytes. Length is validated by the transform that uses the key.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Zeroizing::new(bytes.into()),
        }
    }

    /// Decode a hex-encoded key.
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("Invalid hex key: {}", e)))?;
        Ok(Self::from_bytes(bytes))
    }

    /// Decode a base64-encoded key.
    pub fn from_base64(b64_key: &str) -> Result<Self, CryptoError> {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let bytes = STANDARD
            .decode(b64_key.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("Invalid base64 key: {}", e)))?;
        Ok(Self::from_bytes(bytes))
    }

    /// Decode a key that is either hex (preferred) or base64.
    pub fn parse(encoded: &str) -> Result<Self, CryptoError> {
        let trimmed = encoded.trim();
        let looks_hex = !trimmed.is_empty()
            && trimmed.len() % 2 == 0
            && trimmed.chars().all(|c| c.is_ascii_hexdigit());
        if looks_hex {
            Self::from_hex(trimmed)
        } else {
            Self::from_base64(trimmed)
        }
    }

    /// Read a hex or base64 key from an environment variable.
    pub fn from_env(env_var: &str) -> Result<Self, CryptoError> {
        let value = std::env::var(env_var).map_err(|_| {
            CryptoError::InvalidKey(format!("Environment variable '{}' not set", env_var))
        })?;
        Self::parse(&value)
    }

    /// Generate a random 256-bit key.
    pub fn generate() -> Self {
        use aes_gcm::aead::rand_core::RngCore;
        use aes_gcm::aead::OsRng;

        let mut key = vec![0u8; Self::GENERATED_LEN];
        OsRng.fill_bytes(&mut key);
        Self::from_bytes(key)
    }

    /// Export key as hex string (for `keygen` output only).
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes.as_slice())
    }

    pub fn to_base64(&self) -> String {
        use base64::{engine::general_purpose::STANDARD, Engine};

        STANDARD.encode(self.bytes.as_slice())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Build the transform for `mode` from `key`.
pub fn build_transform(
    mode: CipherMode,
    key: &CryptoKey,
) -> Result<Arc<dyn CryptoTransform>, CryptoError> {
    match mode {
        CipherMode::Gcm => Ok(Arc::new(AesGcmTransform::new(key)?)),
        CipherMode::Legacy => {
            tracing::warn!(
                "Legacy cipher mode selected: AES-ECB has no integrity protection and leaks plaintext patterns"
            );
            Ok(Arc::new(LegacyEcbTransform::new(key)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_debug_redacts() {
        let key = CryptoKey::generate();
        let debug = format!("{:?}", key);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains(&key.to_hex()));
    }

    #[test]
    fn test_key_from_hex_roundtrip() {
        let hex_key = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        let key = CryptoKey::from_hex(hex_key).unwrap();
        assert_eq!(key.len(), 32);
        assert_eq!(key.to_hex(), hex_key);
    }

    #[test]
    fn test_key_parse_detects_encoding() {
        let hex = CryptoKey::parse("00112233445566778899aabbccddeeff").unwrap();
        assert_eq!(hex.len(), 16);

        // 32 bytes of 0x01 in base64
        let b64 = CryptoKey::parse("AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=").unwrap();
        assert_eq!(b64.len(), 32);
        assert_eq!(b64.to_base64(), "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=");

        assert!(matches!(
            CryptoKey::parse("not a key!"),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_cipher_mode_from_str() {
        assert_eq!("gcm".parse::<CipherMode>().unwrap(), CipherMode::Gcm);
        assert_eq!("ECB".parse::<CipherMode>().unwrap(), CipherMode::Legacy);
        assert!("rot13".parse::<CipherMode>().is_err());
    }

    #[test]
    fn test_build_transform_rejects_bad_key() {
        let short = CryptoKey::from_bytes(vec![0u8; 7]);
        assert!(build_transform(CipherMode::Gcm, &short).is_err());
        assert!(build_transform(CipherMode::Legacy, &short).is_err());
    }

    #[test]
    fn test_modes_are_not_interchangeable() {
        let key = CryptoKey::generate();
        let gcm = build_transform(CipherMode::Gcm, &key).unwrap();
        let legacy = build_transform(CipherMode::Legacy, &key).unwrap();

        let ciphertext = gcm.encrypt(b"CREATE TABLE t (id INT);").unwrap();
        assert!(legacy.decrypt(&ciphertext).is_err());
    }
}
