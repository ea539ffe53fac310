//! AES-ECB with PKCS#7 padding.
//!
//! Ciphertext is the bare sequence of encrypted 16-byte blocks with no header,
//! nonce or tag. Accepts 128, 192 and 256-bit keys.

use aes::{Aes128, Aes192, Aes256};
use ecb::cipher::block_padding::Pkcs7;
use ecb::cipher::crypto_common::InnerInit;
use ecb::cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit};

use super::{CryptoError, CryptoKey, CryptoTransform};

const BLOCK_SIZE: usize = 16;

#[derive(Clone)]
enum Cipher {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

/// Deterministic, unauthenticated block-mode transform.
pub struct LegacyEcbTransform {
    cipher: Cipher,
}

impl LegacyEcbTransform {
    pub fn new(key: &CryptoKey) -> Result<Self, CryptoError> {
        let bytes = key.as_bytes();
        let init_err = |e: aes::cipher::InvalidLength| {
            CryptoError::InvalidKey(format!("Cipher init failed: {}", e))
        };

        let cipher = match bytes.len() {
            16 => Cipher::Aes128(Aes128::new_from_slice(bytes).map_err(init_err)?),
            24 => Cipher::Aes192(Aes192::new_from_slice(bytes).map_err(init_err)?),
            32 => Cipher::Aes256(Aes256::new_from_slice(bytes).map_err(init_err)?),
            n => {
                return Err(CryptoError::InvalidKey(format!(
                    "Key must be 16, 24 or 32 bytes, got {}",
                    n
                )))
            }
        };

        Ok(Self { cipher })
    }
}

fn encrypt_with<C>(cipher: C, plaintext: &[u8]) -> Vec<u8>
where
    C: BlockEncryptMut + BlockCipher,
{
    ecb::Encryptor::<C>::inner_init(cipher).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

fn decrypt_with<C>(cipher: C, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>
where
    C: BlockDecryptMut + BlockCipher,
{
    ecb::Decryptor::<C>::inner_init(cipher)
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Decryption)
}

impl CryptoTransform for LegacyEcbTransform {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(match self.cipher.clone() {
            Cipher::Aes128(c) => encrypt_with(c, plaintext),
            Cipher::Aes192(c) => encrypt_with(c, plaintext),
            Cipher::Aes256(c) => encrypt_with(c, plaintext),
        })
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::Malformed(format!(
                "Input length {} is not a positive multiple of the {}-byte block size",
                ciphertext.len(),
                BLOCK_SIZE
            )));
        }

        match self.cipher.clone() {
            Cipher::Aes128(c) => decrypt_with(c, ciphertext),
            Cipher::Aes192(c) => decrypt_with(c, ciphertext),
            Cipher::Aes256(c) => decrypt_with(c, ciphertext),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform(len: usize) -> LegacyEcbTransform {
        let key: Vec<u8> = (0..len as u8).collect();
        LegacyEcbTransform::new(&CryptoKey::from_bytes(key)).unwrap()
    }

    #[test]
    fn test_roundtrip_all_key_sizes() {
        for len in [16, 24, 32] {
            let t = transform(len);
            for size in [0usize, 1, 15, 16, 17, 100] {
                let plaintext: Vec<u8> = (0..size).map(|i| i as u8).collect();
                let ciphertext = t.encrypt(&plaintext).unwrap();
                assert_eq!(ciphertext.len() % BLOCK_SIZE, 0);
                assert!(ciphertext.len() > plaintext.len());
                assert_eq!(t.decrypt(&ciphertext).unwrap(), plaintext);
            }
        }
    }

    #[test]
    fn test_is_deterministic() {
        let t = transform(16);
        assert_eq!(t.encrypt(b"same").unwrap(), t.encrypt(b"same").unwrap());
    }

    #[test]
    fn test_aes128_known_vector() {
        // FIPS-197 appendix C.1
        let key = CryptoKey::from_hex("000102030405060708090a0b0c0d0e0f").unwrap();
        let t = LegacyEcbTransform::new(&key).unwrap();
        let plaintext = hex::decode("00112233445566778899aabbccddeeff").unwrap();
        let ciphertext = t.encrypt(&plaintext).unwrap();
        assert_eq!(hex::encode(&ciphertext[..16]), "69c4e0d86a7b0430d8cdb78070b4c55a");
    }

    #[test]
    fn test_misaligned_input_is_malformed() {
        let t = transform(16);
        assert!(matches!(t.decrypt(b""), Err(CryptoError::Malformed(_))));
        assert!(matches!(
            t.decrypt(&[7u8; 33]),
            Err(CryptoError::Malformed(_))
        ));
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let t = transform(32);
        let ciphertext = t.encrypt(&[b'x'; 40]).unwrap();
        assert_eq!(ciphertext.len(), 48);
        assert!(t.decrypt(&ciphertext[..40]).is_err());
    }

    #[test]
    fn test_bad_padding_is_decryption_error() {
        let t = transform(24);
        // first block decrypts to a final byte of b'f', not a valid pad length
        let ciphertext = t.encrypt(b"0123456789abcdef").unwrap();
        assert_eq!(ciphertext.len(), 32);
        assert_eq!(t.decrypt(&ciphertext[..16]), Err(CryptoError::Decryption));
    }

    #[test]
    fn test_rejects_invalid_key_length() {
        let key = CryptoKey::from_bytes(vec![1u8; 64]);
        assert!(matches!(
            LegacyEcbTransform::new(&key),
            Err(CryptoError::InvalidKey(_))
        ));
    }
}
