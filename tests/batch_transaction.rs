#![cfg(not(target_arch = "wasm32"))]

use firestore_rest::model::resolve_document_path;
use firestore_rest::{
    BatchError, DatabaseId, Firestore, FirestoreError, FirestoreResult, FirestoreValue,
    InMemoryDatastore, MapValue, TransactionError,
};
use serde_json::json;

const BASE: &str = "projects/bank/databases/(default)/documents";

fn firestore() -> (Firestore, InMemoryDatastore) {
    let datastore = InMemoryDatastore::new();
    let firestore = Firestore::with_datastore(DatabaseId::default("bank"), datastore.clone());
    (firestore, datastore)
}

fn balance(datastore: &InMemoryDatastore, id: &str) -> Option<i64> {
    datastore
        .document(&format!("{BASE}/accounts/{id}"))
        .and_then(|fields| fields.get("balance").and_then(FirestoreValue::as_integer))
}

#[test]
fn resolving_paths_is_idempotent() {
    assert_eq!(
        resolve_document_path(BASE, &format!("{BASE}/col"), "id"),
        resolve_document_path(BASE, "col", "id")
    );
}

#[tokio::test]
async fn batch_composes_writes_and_commits_once() {
    let (firestore, datastore) = firestore();
    let doc_a = firestore.document("accounts", "a").unwrap();
    let doc_b = firestore.document("accounts", "b").unwrap();
    datastore.insert_document(doc_b.path(), MapValue::default().with("balance", 5));

    let mut batch = firestore.batch();
    batch
        .create(&doc_a, MapValue::default().with("x", 1))
        .unwrap()
        .delete(&doc_b)
        .unwrap();
    batch.commit().await.unwrap();

    let body = datastore.last_request().unwrap().body.unwrap();
    assert_eq!(
        body["writes"],
        json!([
            { "update": { "name": doc_a.path(), "fields": { "x": { "integerValue": "1" } } } },
            { "delete": doc_b.path() }
        ])
    );
    assert!(datastore.document(doc_b.path()).is_none());
    assert_eq!(
        batch.commit().await.unwrap_err(),
        FirestoreError::Batch(BatchError::AlreadyCommitted)
    );
}

#[tokio::test]
async fn merge_update_only_touches_named_fields() {
    let (firestore, datastore) = firestore();
    let doc = firestore.document("accounts", "alice").unwrap();
    datastore.insert_document(
        doc.path(),
        MapValue::default().with("owner", "Alice").with("balance", 10),
    );

    let mut batch = firestore.batch();
    batch
        .update(&doc, MapValue::default().with("balance", 20), true)
        .unwrap();
    batch.commit().await.unwrap();

    let stored = datastore.document(doc.path()).unwrap();
    assert_eq!(stored.get("owner"), Some(&FirestoreValue::from("Alice")));
    assert_eq!(balance(&datastore, "alice"), Some(20));

    let mut overwrite = firestore.batch();
    overwrite
        .update(&doc, MapValue::default().with("balance", 1), false)
        .unwrap();
    overwrite.commit().await.unwrap();
    let stored = datastore.document(doc.path()).unwrap();
    assert_eq!(stored.get("owner"), None);
}

#[tokio::test]
async fn transfer_inside_run_transaction() {
    let (firestore, datastore) = firestore();
    let alice = firestore.document("accounts", "alice").unwrap();
    let bob = firestore.document("accounts", "bob").unwrap();
    datastore.insert_document(alice.path(), MapValue::default().with("balance", 100));
    datastore.insert_document(bob.path(), MapValue::default().with("balance", 0));

    let moved = firestore
        .run_transaction(move |transaction| {
            Box::pin(async move {
                let from = transaction.get(&alice).await?;
                let to = transaction.get(&bob).await?;
                let amount = 30;
                let from_balance = from.get("balance").and_then(FirestoreValue::as_integer).unwrap_or(0);
                let to_balance = to.get("balance").and_then(FirestoreValue::as_integer).unwrap_or(0);
                transaction
                    .update(&alice, MapValue::default().with("balance", from_balance - amount), true)?
                    .update(&bob, MapValue::default().with("balance", to_balance + amount), true)?;
                Ok(amount)
            })
        })
        .await
        .unwrap();

    assert_eq!(moved, 30);
    assert_eq!(balance(&datastore, "alice"), Some(70));
    assert_eq!(balance(&datastore, "bob"), Some(30));
    assert_eq!(datastore.active_transactions(), 0);
}

#[tokio::test]
async fn failed_closure_discards_writes() {
    let (firestore, datastore) = firestore();
    let alice = firestore.document("accounts", "alice").unwrap();
    datastore.insert_document(alice.path(), MapValue::default().with("balance", 100));

    let result: FirestoreResult<()> = firestore
        .run_transaction(move |transaction| {
            Box::pin(async move {
                transaction.update(&alice, MapValue::default().with("balance", 0), true)?;
                Err(FirestoreError::InvalidArgument("insufficient funds".into()))
            })
        })
        .await;

    assert_eq!(
        result.unwrap_err(),
        FirestoreError::InvalidArgument("insufficient funds".into())
    );
    assert_eq!(balance(&datastore, "alice"), Some(100));
    assert!(datastore
        .requests()
        .iter()
        .any(|request| request.path.ends_with(":rollback")));
}

#[tokio::test]
async fn closure_may_finalize_the_transaction_itself() {
    let (firestore, datastore) = firestore();
    let doc = firestore.document("accounts", "carol").unwrap();

    firestore
        .run_transaction(move |transaction| {
            Box::pin(async move {
                transaction.create(&doc, MapValue::default().with("balance", 1))?;
                transaction.commit().await?;
                Ok(())
            })
        })
        .await
        .unwrap();

    let commits = datastore
        .requests()
        .iter()
        .filter(|request| request.path.ends_with(":commit"))
        .count();
    assert_eq!(commits, 1);
    assert_eq!(balance(&datastore, "carol"), Some(1));
}

#[tokio::test]
async fn lifecycle_errors_after_finalization() {
    let (firestore, _) = firestore();

    let mut committed = firestore.begin_transaction().await.unwrap();
    committed.commit().await.unwrap();
    assert_eq!(
        committed.rollback().await.unwrap_err(),
        FirestoreError::Transaction(TransactionError::AlreadyCommitted)
    );

    let mut rolled_back = firestore.begin_transaction().await.unwrap();
    rolled_back.rollback().await.unwrap();
    assert_eq!(
        rolled_back.commit().await.unwrap_err(),
        FirestoreError::Transaction(TransactionError::AlreadyRolledBack)
    );
}
