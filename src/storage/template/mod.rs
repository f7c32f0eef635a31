//! Template and saved-query persistence.

mod sqlite;
mod traits;

pub use sqlite::SqliteTemplateStore;
pub use traits::{QuerySource, TemplateStore};
