//! Template persistence traits.

use crate::Result;
use crate::models::{Template, TemplateFilter};
use serde_json::Value;

/// Persistence seam for reusable import/export templates.
///
/// Implementations must be safe to share across job threads. A job
/// resolves its template once at start; the snapshot it works on never
/// observes later edits through this trait.
pub trait TemplateStore: Send + Sync {
    /// Persists a new template and assigns it an id.
    ///
    /// # Arguments
    ///
    /// * `template` - The template to persist; its `id` field is ignored
    ///
    /// # Returns
    ///
    /// The stored template with `id` populated
    ///
    /// # Errors
    ///
    /// Returns an error if the template fails validation or the write
    /// fails
    fn save(&self, template: &Template) -> Result<Template>;

    /// Fetches a template by id.
    ///
    /// # Arguments
    ///
    /// * `id` - The persistence id to look up
    ///
    /// # Returns
    ///
    /// `Some(template)` if found, `None` otherwise
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails
    fn get(&self, id: i64) -> Result<Option<Template>>;

    /// Lists templates matching a filter.
    ///
    /// # Arguments
    ///
    /// * `filter` - Restricts by store id, table name, and/or direction;
    ///   an empty filter lists everything
    ///
    /// # Returns
    ///
    /// Matching templates in insertion order
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails
    fn list(&self, filter: &TemplateFilter) -> Result<Vec<Template>>;

    /// Overwrites a persisted template in place.
    ///
    /// # Arguments
    ///
    /// * `template` - The new state; `id` must be set
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TemplateNotFound`] if no template with
    /// that id exists, or an error if the write fails
    fn update(&self, template: &Template) -> Result<()>;

    /// Deletes a template by id.
    ///
    /// # Arguments
    ///
    /// * `id` - The persistence id to delete
    ///
    /// # Returns
    ///
    /// `true` if a template was deleted, `false` if none existed
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails
    fn delete(&self, id: i64) -> Result<bool>;
}

/// Lookup seam for saved store queries referenced by export jobs.
///
/// An export may name a saved query by id instead of carrying one
/// inline; this trait resolves that id to the stored query body.
pub trait QuerySource: Send + Sync {
    /// Fetches a saved query body by id.
    ///
    /// # Arguments
    ///
    /// * `id` - The saved query id
    ///
    /// # Returns
    ///
    /// `Some(query)` if found, `None` otherwise
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails
    fn query_for(&self, id: i64) -> Result<Option<Value>>;
}
