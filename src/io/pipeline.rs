//! Ordered per-record transform execution.
//!
//! A pipeline is compiled once per job from a template's declared
//! transforms: argument shapes are checked and crypto material is
//! resolved up front, so a missing key or bad salt fails the job
//! before the first record is read. Per-record problems, such as a
//! text-only transform meeting a number, reject that record only.

use crate::config::CryptoSettings;
use crate::models::{Document, Transform};
use crate::security::{FieldCipher, TwoStageHasher};
use crate::{Error, Result};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::sync::Arc;

/// Compiled transform chain, shared read-only by validator workers.
#[derive(Debug)]
pub struct TransformPipeline {
    steps: Vec<Step>,
}

impl TransformPipeline {
    /// Compiles the declared transforms against the deployment crypto
    /// settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for malformed transform
    /// arguments, a missing or wrong-size encryption key, or missing
    /// or short hash salts.
    pub fn build(transforms: &[Transform], crypto: &CryptoSettings) -> Result<Self> {
        let mut cipher: Option<Arc<FieldCipher>> = None;
        let mut hasher: Option<Arc<TwoStageHasher>> = None;
        let mut steps = Vec::with_capacity(transforms.len());
        for transform in transforms {
            transform.validate()?;
            let step = match transform.clone() {
                Transform::Rename { col, new_name } => Step::Rename { col, new_name },
                Transform::Split {
                    col,
                    new_names,
                    separator,
                } => Step::Split {
                    col,
                    new_names,
                    separator,
                },
                Transform::Merge {
                    col,
                    merge_col,
                    new_name,
                    separator,
                } => Step::Merge {
                    col,
                    merge_col,
                    new_name,
                    separator,
                },
                Transform::Duplicate { col, new_name } => Step::Duplicate { col, new_name },
                Transform::Prepend { col, text } => Step::Prepend { col, text },
                Transform::Append { col, text } => Step::Append { col, text },
                Transform::Encrypt { col } => Step::Encrypt {
                    col,
                    cipher: shared_cipher(&mut cipher, crypto)?,
                },
                Transform::Decrypt { col } => Step::Decrypt {
                    col,
                    cipher: shared_cipher(&mut cipher, crypto)?,
                },
                Transform::Hash { col } => Step::Hash {
                    col,
                    hasher: shared_hasher(&mut hasher, crypto)?,
                },
            };
            steps.push(step);
        }
        Ok(Self { steps })
    }

    /// Returns true when no transforms are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step over one record, in declared order.
    ///
    /// `index` is the record's position in the input, used in rejection
    /// messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordRejected`] when a step meets a value it
    /// cannot transform.
    pub fn apply(&self, index: usize, record: &mut Document) -> Result<()> {
        for step in &self.steps {
            step.apply(index, record)?;
        }
        Ok(())
    }
}

/// One compiled step; crypto variants carry their resolved material.
#[derive(Debug)]
enum Step {
    Rename {
        col: String,
        new_name: String,
    },
    Split {
        col: String,
        new_names: [String; 2],
        separator: String,
    },
    Merge {
        col: String,
        merge_col: String,
        new_name: String,
        separator: String,
    },
    Duplicate {
        col: String,
        new_name: String,
    },
    Prepend {
        col: String,
        text: String,
    },
    Append {
        col: String,
        text: String,
    },
    Encrypt {
        col: String,
        cipher: Arc<FieldCipher>,
    },
    Decrypt {
        col: String,
        cipher: Arc<FieldCipher>,
    },
    Hash {
        col: String,
        hasher: Arc<TwoStageHasher>,
    },
}

impl Step {
    fn apply(&self, index: usize, record: &mut Document) -> Result<()> {
        match self {
            Self::Rename { col, new_name } => {
                if col != new_name
                    && let Some(value) = record.remove(col)
                {
                    record.insert(new_name.clone(), value);
                }
            }
            Self::Split {
                col,
                new_names,
                separator,
            } => {
                let text = peek_text(index, record, col, "split")?;
                record.remove(col);
                let (left, right) = match text.find(separator.as_str()) {
                    Some(pos) => (
                        text[..pos].to_string(),
                        text[pos + separator.len()..].to_string(),
                    ),
                    None => (text, String::new()),
                };
                record.insert(new_names[0].clone(), Value::String(left));
                record.insert(new_names[1].clone(), Value::String(right));
            }
            Self::Merge {
                col,
                merge_col,
                new_name,
                separator,
            } => {
                let left = peek_text(index, record, col, "merge")?;
                let right = peek_text(index, record, merge_col, "merge")?;
                if col != new_name {
                    record.remove(col);
                }
                if merge_col != new_name {
                    record.remove(merge_col);
                }
                record.insert(
                    new_name.clone(),
                    Value::String(format!("{left}{separator}{right}")),
                );
            }
            Self::Duplicate { col, new_name } => {
                if let Some(value) = record.get(col).cloned() {
                    record.insert(new_name.clone(), value);
                }
            }
            Self::Prepend { col, text } => {
                let current = peek_text(index, record, col, "prepend")?;
                record.insert(col.clone(), Value::String(format!("{text}{current}")));
            }
            Self::Append { col, text } => {
                let current = peek_text(index, record, col, "append")?;
                record.insert(col.clone(), Value::String(format!("{current}{text}")));
            }
            Self::Encrypt { col, cipher } => {
                let plaintext = peek_text(index, record, col, "encrypt")?;
                record.insert(col.clone(), Value::String(cipher.encrypt(&plaintext)));
            }
            Self::Decrypt { col, cipher } => {
                let ciphertext = peek_text(index, record, col, "decrypt")?;
                let plaintext = cipher.decrypt(&ciphertext).map_err(|err| {
                    Error::RecordRejected {
                        record: index,
                        cause: format!("decrypt of column '{col}' failed: {err}"),
                    }
                })?;
                record.insert(col.clone(), Value::String(plaintext));
            }
            Self::Hash { col, hasher } => {
                let text = peek_text(index, record, col, "hash")?;
                record.insert(col.clone(), Value::String(hasher.hash(&text)?));
            }
        }
        Ok(())
    }
}

/// Reads a text value for a text-only transform, rejecting the record
/// when the column is absent or holds anything but a string.
fn peek_text(index: usize, record: &Document, col: &str, op: &str) -> Result<String> {
    match record.get(col) {
        Some(Value::String(text)) => Ok(text.clone()),
        _ => Err(Error::RecordRejected {
            record: index,
            cause: format!("transform '{op}' requires text in column '{col}'"),
        }),
    }
}

fn shared_cipher(
    slot: &mut Option<Arc<FieldCipher>>,
    crypto: &CryptoSettings,
) -> Result<Arc<FieldCipher>> {
    if let Some(cipher) = slot {
        return Ok(Arc::clone(cipher));
    }
    let key = crypto.encryption_key.as_ref().ok_or_else(|| {
        Error::InvalidInput(
            "encrypt and decrypt transforms require an encryption key in the configuration"
                .to_string(),
        )
    })?;
    let cipher = Arc::new(FieldCipher::new(key.expose_secret())?);
    *slot = Some(Arc::clone(&cipher));
    Ok(cipher)
}

fn shared_hasher(
    slot: &mut Option<Arc<TwoStageHasher>>,
    crypto: &CryptoSettings,
) -> Result<Arc<TwoStageHasher>> {
    if let Some(hasher) = slot {
        return Ok(Arc::clone(hasher));
    }
    let fast = crypto.fast_hash_salt.as_ref().ok_or_else(|| {
        Error::InvalidInput("hash transforms require a fast hash salt in the configuration".to_string())
    })?;
    let slow = crypto.slow_hash_salt.as_ref().ok_or_else(|| {
        Error::InvalidInput("hash transforms require a slow hash salt in the configuration".to_string())
    })?;
    let hasher = Arc::new(TwoStageHasher::new(
        fast.expose_secret(),
        slow.expose_secret(),
    )?);
    *slot = Some(Arc::clone(&hasher));
    Ok(hasher)
}
