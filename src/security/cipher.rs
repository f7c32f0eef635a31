//! Deterministic AES-256-CTR field encryption.
//!
//! # Properties
//!
//! - **Algorithm**: AES-256 in CTR mode (no padding, length-preserving)
//! - **Key**: exactly 32 characters, used as raw UTF-8 bytes
//! - **Counter**: fixed initial value, so equal plaintexts produce equal
//!   ciphertexts and equality predicates keep working on encrypted
//!   fields
//! - **Format**: lowercase hex
//!
//! CTR mode is unauthenticated; [`FieldCipher::decrypt`] reports a wrong
//! key only when the resulting bytes fail hex or UTF-8 checks.

use aes::Aes256;
use aes::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;

use crate::{Error, Result};

type Aes256Ctr = Ctr128BE<Aes256>;

const KEY_SIZE: usize = 32;

// Fixed initial counter shared by every field encryption; determinism
// is the contract here, not semantic security.
const INITIAL_COUNTER: u128 = 5;

/// Symmetric cipher for the `encrypt` and `decrypt` transforms.
#[derive(Debug)]
pub struct FieldCipher {
    key: [u8; KEY_SIZE],
}

impl FieldCipher {
    /// Builds a cipher from a 32-character key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the key is not exactly
    /// 32 bytes long.
    pub fn new(key: &str) -> Result<Self> {
        let bytes = key.as_bytes();
        if bytes.len() != KEY_SIZE {
            return Err(Error::InvalidInput(format!(
                "encryption key must be exactly {KEY_SIZE} characters, got {}",
                bytes.len()
            )));
        }
        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { key: key_bytes })
    }

    fn keystream(&self) -> Aes256Ctr {
        Aes256Ctr::new(&self.key.into(), &INITIAL_COUNTER.to_be_bytes().into())
    }

    /// Encrypts a field value, returning hex-encoded ciphertext.
    #[must_use]
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut buf = plaintext.as_bytes().to_vec();
        self.keystream().apply_keystream(&mut buf);
        hex::encode(buf)
    }

    /// Decrypts a hex-encoded field value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] when the value is not valid
    /// hex or the decrypted bytes are not UTF-8 (wrong key or data that
    /// was never encrypted).
    pub fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let mut buf = hex::decode(ciphertext).map_err(|e| Error::OperationFailed {
            operation: "decrypt".to_string(),
            cause: format!("value is not hex-encoded ciphertext: {e}"),
        })?;
        self.keystream().apply_keystream(&mut buf);
        String::from_utf8(buf).map_err(|_| Error::OperationFailed {
            operation: "decrypt".to_string(),
            cause: "decrypted bytes are not valid UTF-8 (wrong key or unencrypted input)"
                .to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let cipher = FieldCipher::new(KEY).unwrap();
        let plaintext = "4102 Main St, Springfield";
        let encrypted = cipher.encrypt(plaintext);
        assert_ne!(encrypted, plaintext);
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), plaintext);
    }

    #[test]
    fn test_equal_plaintexts_encrypt_identically() {
        let cipher = FieldCipher::new(KEY).unwrap();
        assert_eq!(cipher.encrypt("same value"), cipher.encrypt("same value"));
    }

    #[test]
    fn test_empty_value_round_trip() {
        let cipher = FieldCipher::new(KEY).unwrap();
        let encrypted = cipher.encrypt("");
        assert_eq!(encrypted, "");
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "");
    }

    #[test]
    fn test_unicode_round_trip() {
        let cipher = FieldCipher::new(KEY).unwrap();
        let plaintext = "naïve café — 東京";
        let encrypted = cipher.encrypt(plaintext);
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), plaintext);
    }

    #[test]
    fn test_key_must_be_32_characters() {
        assert!(FieldCipher::new("short").is_err());
        assert!(FieldCipher::new(&"x".repeat(33)).is_err());
        assert!(FieldCipher::new(&"x".repeat(32)).is_ok());
    }

    #[test]
    fn test_decrypt_rejects_non_hex() {
        let cipher = FieldCipher::new(KEY).unwrap();
        let err = cipher.decrypt("not hex at all").unwrap_err();
        assert!(err.to_string().contains("hex"));
    }

    #[test]
    fn test_wrong_key_does_not_round_trip() {
        let cipher = FieldCipher::new(KEY).unwrap();
        let other = FieldCipher::new("ffffffffffffffffffffffffffffffff").unwrap();
        let encrypted = cipher.encrypt("naïve café — 東京");
        // Wrong key either fails UTF-8 validation or yields different text.
        match other.decrypt(&encrypted) {
            Ok(garbled) => assert_ne!(garbled, "naïve café — 東京"),
            Err(_) => {}
        }
    }
}
