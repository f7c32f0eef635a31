//! Field-level cryptography for import and export transforms.
//!
//! Two primitives back the `encrypt`/`decrypt` and `hash` transform
//! variants: a deterministic stream cipher ([`FieldCipher`]) and a
//! two-stage one-way hasher ([`TwoStageHasher`]). Both are constructed
//! once per pipeline build so key and salt problems surface as
//! configuration errors before the first record is touched.

mod cipher;
mod digest;

pub use cipher::FieldCipher;
pub use digest::TwoStageHasher;
