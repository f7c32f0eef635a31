//! Two-stage one-way field hashing.
//!
//! Stage one is a salted SHA3-256 digest; stage two runs the hex digest
//! through bcrypt with a salt derived from the configured slow salt.
//! Both salts are fixed per pipeline, so equal inputs hash to equal
//! outputs and hashed fields stay joinable. There is no reverse
//! operation.

use sha3::{Digest, Sha3_256};

use crate::{Error, Result};

const MIN_SLOW_SALT_LEN: usize = 72;
const BCRYPT_SALT_LEN: usize = 16;

// Cost tuned for bulk field obfuscation rather than password storage;
// still orders of magnitude slower than the stage-one digest.
const HASH_COST: u32 = 8;

/// One-way hasher for the `hash` transform.
#[derive(Debug)]
pub struct TwoStageHasher {
    fast_salt: String,
    slow_salt: [u8; BCRYPT_SALT_LEN],
}

impl TwoStageHasher {
    /// Builds a hasher from the fast (SHA3) and slow (bcrypt) salts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the slow salt is shorter
    /// than 72 characters.
    pub fn new(fast_salt: &str, slow_salt: &str) -> Result<Self> {
        if slow_salt.len() < MIN_SLOW_SALT_LEN {
            return Err(Error::InvalidInput(format!(
                "slow hash salt must be at least {MIN_SLOW_SALT_LEN} characters, got {}",
                slow_salt.len()
            )));
        }
        let mut salt = [0u8; BCRYPT_SALT_LEN];
        salt.copy_from_slice(&slow_salt.as_bytes()[..BCRYPT_SALT_LEN]);
        Ok(Self {
            fast_salt: fast_salt.to_string(),
            slow_salt: salt,
        })
    }

    /// Hashes a field value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] when the bcrypt stage fails.
    pub fn hash(&self, value: &str) -> Result<String> {
        let mut digest = Sha3_256::new();
        digest.update(value.as_bytes());
        digest.update(self.fast_salt.as_bytes());
        let fast = hex::encode(digest.finalize());

        let parts = bcrypt::hash_with_salt(fast, HASH_COST, self.slow_salt).map_err(|e| {
            Error::OperationFailed {
                operation: "hash".to_string(),
                cause: e.to_string(),
            }
        })?;
        Ok(parts.format_for_version(bcrypt::Version::TwoB))
    }
}
