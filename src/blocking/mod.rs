//! Synchronous wrappers over the async API.
//!
//! Every call drives the async operation to completion on a shared
//! multi-threaded tokio runtime. Do not call these from inside an async
//! context.

use once_cell::sync::Lazy;
use tokio::runtime::Runtime;

use crate::api::{
    CollectionReference, DocumentPage, DocumentReference, DocumentSnapshot, Firestore, Query,
    Transaction, WriteBatch,
};
use crate::error::FirestoreResult;
use crate::remote::CommitResponse;
use crate::value::MapValue;

static RT: Lazy<Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Tokio runtime")
});

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    RT.block_on(fut)
}

pub fn get(document: &DocumentReference) -> FirestoreResult<DocumentSnapshot> {
    block_on(document.get())
}

pub fn exists(document: &DocumentReference) -> FirestoreResult<bool> {
    block_on(document.exists())
}

pub fn set(
    document: &DocumentReference,
    data: impl Into<MapValue>,
    merge: bool,
) -> FirestoreResult<DocumentSnapshot> {
    block_on(document.set(data, merge))
}

pub fn update_fields(
    document: &DocumentReference,
    data: impl Into<MapValue>,
) -> FirestoreResult<DocumentSnapshot> {
    block_on(document.update_fields(data))
}

pub fn delete(document: &DocumentReference) -> FirestoreResult<()> {
    block_on(document.delete())
}

pub fn add(
    collection: &CollectionReference,
    data: impl Into<MapValue>,
    id: Option<&str>,
) -> FirestoreResult<DocumentReference> {
    block_on(collection.add(data, id))
}

pub fn list_documents(
    collection: &CollectionReference,
    page_size: usize,
    page_token: Option<&str>,
) -> FirestoreResult<DocumentPage> {
    block_on(collection.list_documents(page_size, page_token))
}

pub fn run_query(query: &mut Query) -> FirestoreResult<Vec<DocumentSnapshot>> {
    block_on(query.get())
}

pub fn next_page(query: &mut Query) -> FirestoreResult<Vec<DocumentSnapshot>> {
    block_on(query.next_page())
}

pub fn commit_batch(batch: &mut WriteBatch) -> FirestoreResult<CommitResponse> {
    block_on(batch.commit())
}

pub fn begin_transaction(firestore: &Firestore) -> FirestoreResult<Transaction> {
    block_on(firestore.begin_transaction())
}

pub fn transaction_get(
    transaction: &Transaction,
    document: &DocumentReference,
) -> FirestoreResult<DocumentSnapshot> {
    block_on(transaction.get(document))
}

pub fn commit_transaction(transaction: &mut Transaction) -> FirestoreResult<CommitResponse> {
    block_on(transaction.commit())
}

pub fn rollback_transaction(transaction: &mut Transaction) -> FirestoreResult<()> {
    block_on(transaction.rollback())
}

/// Blocking counterpart of [`Firestore::run_transaction`].
///
/// `operation` runs on the calling thread and may use the other functions
/// of this module.
pub fn run_transaction<T, F>(firestore: &Firestore, operation: F) -> FirestoreResult<T>
where
    F: FnOnce(&mut Transaction) -> FirestoreResult<T>,
{
    let mut transaction = begin_transaction(firestore)?;
    let outcome = match operation(&mut transaction) {
        Ok(value) if transaction.is_active() => {
            commit_transaction(&mut transaction).map(|_| value)
        }
        outcome => outcome,
    };
    let err = match outcome {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };
    if transaction.is_active() {
        if let Err(rollback_err) = rollback_transaction(&mut transaction) {
            log::warn!(
                "rollback of transaction {} failed: {rollback_err}",
                transaction.id()
            );
        }
    }
    Err(err)
}
