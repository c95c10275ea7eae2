use std::error::Error;
use std::fmt::{Display, Formatter};

use serde_json::Value as JsonValue;

/// Classifies why a value or field path could not be mapped onto the wire format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncodingErrorKind {
    InvalidValue,
    MalformedTimestamp,
    InvalidFieldPath,
}

impl EncodingErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodingErrorKind::InvalidValue => "invalid-value",
            EncodingErrorKind::MalformedTimestamp => "malformed-timestamp",
            EncodingErrorKind::InvalidFieldPath => "invalid-field-path",
        }
    }
}

/// Local failure while converting between native values and wire values.
///
/// Encoding errors are never retried: the same input always fails the same way.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodingError {
    pub kind: EncodingErrorKind,
    message: String,
    value_type: Option<String>,
    field_path: Option<String>,
}

impl EncodingError {
    pub fn new(kind: EncodingErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            value_type: None,
            field_path: None,
        }
    }

    pub fn with_value_type(mut self, value_type: impl Into<String>) -> Self {
        self.value_type = Some(value_type.into());
        self
    }

    pub fn with_field_path(mut self, field_path: impl Into<String>) -> Self {
        self.field_path = Some(field_path.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Name of the offending value's type, when known.
    pub fn value_type(&self) -> Option<&str> {
        self.value_type.as_deref()
    }

    /// Field path the failure was detected at, when known.
    pub fn field_path(&self) -> Option<&str> {
        self.field_path.as_deref()
    }
}

impl Display for EncodingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(path) = &self.field_path {
            write!(f, " at path \"{path}\"")?;
        }
        Ok(())
    }
}

impl Error for EncodingError {}

/// A non-2xx response or a transport failure reported by the HTTP layer.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiError {
    /// HTTP status code; `0` when no response was received.
    pub status_code: u16,
    /// Parsed response body, or `{"raw": "<text>"}` when it was not JSON.
    pub response_body: JsonValue,
    pub request_path: String,
    message: String,
}

impl ApiError {
    pub fn new(
        status_code: u16,
        response_body: JsonValue,
        request_path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status_code,
            response_body,
            request_path: request_path.into(),
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Canonical RPC status from a Google error payload (`"NOT_FOUND"`, `"ABORTED"`, ...).
    pub fn status(&self) -> Option<&str> {
        self.response_body
            .get("error")
            .and_then(|error| error.get("status"))
            .and_then(JsonValue::as_str)
    }

    pub fn is_transport_failure(&self) -> bool {
        self.status_code == 0
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code == 404
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Firestore API error: {} ({}) for path {}",
            self.message, self.status_code, self.request_path
        )
    }
}

impl Error for ApiError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchError {
    AlreadyCommitted,
    TooManyOperations { count: usize, limit: usize },
}

impl Display for BatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchError::AlreadyCommitted => write!(f, "Batch has already been committed"),
            BatchError::TooManyOperations { count, limit } => write!(
                f,
                "Batch contains too many operations ({count}). Maximum allowed is {limit}"
            ),
        }
    }
}

impl Error for BatchError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionError {
    AlreadyFinalized,
    AlreadyCommitted,
    AlreadyRolledBack,
    FailedToStart,
    DocumentNotFound { document_id: String },
}

impl Display for TransactionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionError::AlreadyFinalized => {
                write!(f, "Transaction has already been committed or rolled back")
            }
            TransactionError::AlreadyCommitted => write!(f, "Transaction has already been committed"),
            TransactionError::AlreadyRolledBack => {
                write!(f, "Transaction has already been rolled back")
            }
            TransactionError::FailedToStart => write!(f, "Failed to start transaction"),
            TransactionError::DocumentNotFound { document_id } => {
                write!(f, "Document \"{document_id}\" not found in transaction")
            }
        }
    }
}

impl Error for TransactionError {}

#[derive(Clone, Debug, PartialEq)]
pub enum FirestoreError {
    Encoding(EncodingError),
    Api(ApiError),
    Batch(BatchError),
    Transaction(TransactionError),
    DocumentNotFound {
        collection: String,
        document_id: String,
    },
    Authentication(String),
    InvalidArgument(String),
    Internal(String),
}

impl FirestoreError {
    pub fn code_str(&self) -> &'static str {
        match self {
            FirestoreError::Encoding(_) => "firestore/encoding",
            FirestoreError::Api(_) => "firestore/api",
            FirestoreError::Batch(_) => "firestore/batch",
            FirestoreError::Transaction(_) => "firestore/transaction",
            FirestoreError::DocumentNotFound { .. } => "firestore/not-found",
            FirestoreError::Authentication(_) => "firestore/unauthenticated",
            FirestoreError::InvalidArgument(_) => "firestore/invalid-argument",
            FirestoreError::Internal(_) => "firestore/internal",
        }
    }

    pub fn as_encoding(&self) -> Option<&EncodingError> {
        match self {
            FirestoreError::Encoding(err) => Some(err),
            _ => None,
        }
    }

    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            FirestoreError::Api(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for FirestoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FirestoreError::Encoding(err) => write!(f, "{err} ({})", self.code_str()),
            FirestoreError::Api(err) => write!(f, "{err} ({})", self.code_str()),
            FirestoreError::Batch(err) => write!(f, "{err} ({})", self.code_str()),
            FirestoreError::Transaction(err) => write!(f, "{err} ({})", self.code_str()),
            FirestoreError::DocumentNotFound {
                collection,
                document_id,
            } => write!(
                f,
                "Document \"{document_id}\" not found in collection \"{collection}\" ({})",
                self.code_str()
            ),
            FirestoreError::Authentication(message)
            | FirestoreError::InvalidArgument(message)
            | FirestoreError::Internal(message) => write!(f, "{message} ({})", self.code_str()),
        }
    }
}

impl Error for FirestoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FirestoreError::Encoding(err) => Some(err),
            FirestoreError::Api(err) => Some(err),
            FirestoreError::Batch(err) => Some(err),
            FirestoreError::Transaction(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EncodingError> for FirestoreError {
    fn from(value: EncodingError) -> Self {
        FirestoreError::Encoding(value)
    }
}

impl From<ApiError> for FirestoreError {
    fn from(value: ApiError) -> Self {
        FirestoreError::Api(value)
    }
}

impl From<BatchError> for FirestoreError {
    fn from(value: BatchError) -> Self {
        FirestoreError::Batch(value)
    }
}

impl From<TransactionError> for FirestoreError {
    fn from(value: TransactionError) -> Self {
        FirestoreError::Transaction(value)
    }
}

pub type FirestoreResult<T> = Result<T, FirestoreError>;

pub fn invalid_argument(message: impl Into<String>) -> FirestoreError {
    FirestoreError::InvalidArgument(message.into())
}

pub fn internal_error(message: impl Into<String>) -> FirestoreError {
    FirestoreError::Internal(message.into())
}

pub fn unauthenticated(message: impl Into<String>) -> FirestoreError {
    FirestoreError::Authentication(message.into())
}

pub fn credentials_not_found() -> FirestoreError {
    unauthenticated(
        "No valid Google credentials found. Set FIRESTORE_ACCESS_TOKEN or configure a token provider.",
    )
}

pub fn document_not_found(collection: impl Into<String>, document_id: impl Into<String>) -> FirestoreError {
    FirestoreError::DocumentNotFound {
        collection: collection.into(),
        document_id: document_id.into(),
    }
}

pub fn invalid_value(value_type: impl Into<String>) -> FirestoreError {
    let value_type = value_type.into();
    EncodingError::new(
        EncodingErrorKind::InvalidValue,
        format!("Cannot encode value of type \"{value_type}\" for Firestore"),
    )
    .with_value_type(value_type)
    .into()
}

pub fn malformed_timestamp(value: &str, reason: impl Display) -> FirestoreError {
    EncodingError::new(
        EncodingErrorKind::MalformedTimestamp,
        format!("Invalid timestamp \"{value}\": {reason}"),
    )
    .into()
}

pub fn invalid_field_path(path: impl Into<String>, reason: impl Display) -> FirestoreError {
    EncodingError::new(
        EncodingErrorKind::InvalidFieldPath,
        format!("Invalid field path: {reason}"),
    )
    .with_field_path(path)
    .into()
}
