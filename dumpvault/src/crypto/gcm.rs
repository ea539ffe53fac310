//! AES-256-GCM artifact encryption.
//!
//! # File Format
//!
//! ```text
//! [Magic: 4 bytes "DVLT"] [Version: 1 byte] [Nonce: 12 bytes] [Ciphertext + Tag]
//! ```
//!
//! The 16-byte authentication tag is appended to the ciphertext by AES-GCM.

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};

use super::{CryptoError, CryptoKey, CryptoTransform};

/// Magic bytes for encrypted dump files
const MAGIC: &[u8; 4] = b"DVLT";

/// Current format version
const VERSION: u8 = 0x01;

/// Nonce size (96 bits for AES-GCM)
const NONCE_SIZE: usize = 12;

/// Key size (256 bits for AES-256)
const KEY_SIZE: usize = 32;

/// Header size: magic (4) + version (1) + nonce (12)
const HEADER_SIZE: usize = 17;

/// Authentication tag appended by AES-GCM
const TAG_SIZE: usize = 16;

/// Authenticated transform with a fresh random nonce per artifact.
pub struct AesGcmTransform {
    cipher: Aes256Gcm,
}

impl AesGcmTransform {
    pub fn new(key: &CryptoKey) -> Result<Self, CryptoError> {
        if key.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "Key must be {} bytes, got {}",
                KEY_SIZE,
                key.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::InvalidKey(format!("Cipher init failed: {}", e)))?;

        Ok(Self { cipher })
    }
}

impl CryptoTransform for AesGcmTransform {
    fn name(&self) -> &'static str {
        "gcm"
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut output = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
        output.extend_from_slice(MAGIC);
        output.push(VERSION);
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.len() < HEADER_SIZE + TAG_SIZE {
            return Err(CryptoError::Malformed(format!(
                "{} bytes is too small to be an encrypted dump",
                data.len()
            )));
        }

        if &data[0..4] != MAGIC {
            return Err(CryptoError::Malformed(
                "Invalid file format (not a dumpvault encrypted dump)".to_string(),
            ));
        }

        if data[4] != VERSION {
            return Err(CryptoError::Malformed(format!(
                "Unsupported format version: {}",
                data[4]
            )));
        }

        let nonce = Nonce::from_slice(&data[5..HEADER_SIZE]);

        self.cipher
            .decrypt(nonce, &data[HEADER_SIZE..])
            .map_err(|_| CryptoError::Decryption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform() -> AesGcmTransform {
        AesGcmTransform::new(&CryptoKey::generate()).unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let t = transform();
        let plaintext = b"-- MySQL dump\nINSERT INTO patient VALUES (1);\n";
        let ciphertext = t.encrypt(plaintext).unwrap();

        assert_eq!(&ciphertext[0..4], MAGIC);
        assert_eq!(ciphertext[4], VERSION);
        assert_eq!(t.decrypt(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn test_empty_payload_roundtrip() {
        let t = transform();
        let ciphertext = t.encrypt(b"").unwrap();
        assert_eq!(ciphertext.len(), HEADER_SIZE + TAG_SIZE);
        assert!(t.decrypt(&ciphertext).unwrap().is_empty());
    }

    #[test]
    fn test_nonce_is_random() {
        let t = transform();
        let a = t.encrypt(b"same input").unwrap();
        let b = t.encrypt(b"same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let ciphertext = transform().encrypt(b"secret rows").unwrap();
        let err = transform().decrypt(&ciphertext).unwrap_err();
        assert_eq!(err, CryptoError::Decryption);
    }

    #[test]
    fn test_tampering_detected() {
        let t = transform();
        let mut ciphertext = t.encrypt(b"secret rows").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0x01;
        assert_eq!(t.decrypt(&ciphertext).unwrap_err(), CryptoError::Decryption);
    }

    #[test]
    fn test_truncated_input_is_malformed() {
        let t = transform();
        assert!(matches!(t.decrypt(b"DVLT"), Err(CryptoError::Malformed(_))));
        assert!(matches!(
            t.decrypt(&[0u8; 64]),
            Err(CryptoError::Malformed(_))
        ));
    }

    #[test]
    fn test_rejects_short_key() {
        let key = CryptoKey::from_bytes(vec![0u8; 16]);
        assert!(matches!(
            AesGcmTransform::new(&key),
            Err(CryptoError::InvalidKey(_))
        ));
    }
}
