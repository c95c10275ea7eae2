mod database;
pub(crate) mod operations;
pub(crate) mod query;
mod reference;
mod snapshot;
mod transaction;
mod write_batch;

pub use database::{Firestore, TransactionFuture};
pub use operations::Operation;
pub use query::{FilterOperator, Query};
pub use reference::{CollectionReference, DocumentReference};
pub use snapshot::{DocumentPage, DocumentSnapshot};
pub use transaction::{Transaction, TransactionState};
pub use write_batch::{BatchState, WriteBatch};
