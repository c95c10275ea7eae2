mod database_id;
mod field_path;
pub mod path;
mod timestamp;

pub use database_id::DatabaseId;
pub use field_path::{build_field_mask, FieldPath, IntoFieldPath};
pub use path::{generate_auto_id, resolve_collection_path, resolve_document_path};
pub use timestamp::Timestamp;
