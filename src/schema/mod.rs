//! Type inference and declared-schema reconciliation.

pub mod infer;
mod reconcile;

pub use reconcile::{additive_mapping, columns_from_mapping, mapping_for, reconcile};
