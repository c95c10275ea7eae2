#![doc = include_str!("RUSTDOC.md")]

pub mod api;
#[cfg(not(target_arch = "wasm32"))]
pub mod blocking;
pub mod config;
pub mod constants;
pub mod error;
pub mod model;
pub mod platform;
pub mod remote;
pub mod value;

#[cfg(test)]
pub mod test_support;

pub use api::{
    BatchState, CollectionReference, DocumentPage, DocumentReference, DocumentSnapshot,
    FilterOperator, Firestore, Operation, Query, Transaction, TransactionFuture,
    TransactionState, WriteBatch,
};
pub use config::{FirestoreSettings, RetrySettings};
pub use error::{
    ApiError, BatchError, EncodingError, EncodingErrorKind, FirestoreError, FirestoreResult,
    TransactionError,
};
pub use model::{build_field_mask, DatabaseId, FieldPath, Timestamp};
pub use remote::{CommitResponse, InMemoryDatastore, WriteResult};
pub use value::{
    ArrayValue, FirestoreValue, IntoFirestoreValue, MapValue, ValueEncoder, ValueKind, WireValue,
};
