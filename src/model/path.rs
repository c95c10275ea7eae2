//! Composition of fully-qualified resource paths.
//!
//! Every document and collection path is built from the database's
//! `.../documents` prefix plus a relative suffix. Inputs that already carry
//! the prefix are treated as absolute, so resolving a resolved path again is a
//! no-op rather than doubling the prefix.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::constants::AUTO_ID_LENGTH;

/// Resolves the absolute path of the document `id` inside `collection`.
pub fn resolve_document_path(base_path: &str, collection: &str, id: &str) -> String {
    format!("{}/{}", resolve_collection_path(base_path, collection), id)
}

/// Resolves the absolute path of `collection`.
pub fn resolve_collection_path(base_path: &str, collection: &str) -> String {
    let collection = collection.trim_matches('/');
    if is_absolute(base_path, collection) {
        collection.to_string()
    } else {
        format!("{base_path}/{collection}")
    }
}

/// Strips `base_path` from `path`, returning the path relative to the documents root.
pub fn relative_path<'a>(base_path: &str, path: &'a str) -> &'a str {
    if is_absolute(base_path, path) {
        path[base_path.len()..].trim_start_matches('/')
    } else {
        path
    }
}

/// The final `/`-separated segment of `path`.
pub fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// `path` without its final segment; empty when `path` has a single segment.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => "",
    }
}

/// A random 20-character alphanumeric document id.
pub fn generate_auto_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .take(AUTO_ID_LENGTH)
        .collect()
}

fn is_absolute(base_path: &str, path: &str) -> bool {
    match path.strip_prefix(base_path) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
