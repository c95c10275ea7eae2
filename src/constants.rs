pub(crate) const FIRESTORE_API_HOST: &str = "https://firestore.googleapis.com";
pub(crate) const FIRESTORE_API_VERSION: &str = "v1";

pub const DEFAULT_DATABASE_ID: &str = "(default)";

/// Server-side ceiling on the number of writes in a single commit.
pub const MAX_BATCH_WRITES: usize = 500;

pub(crate) const AUTO_ID_LENGTH: usize = 20;

/// Field path Firestore uses to address a document by its resource name.
pub(crate) const DOCUMENT_NAME_FIELD: &str = "__name__";
