use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::FirestoreSettings;
use crate::error::{credentials_not_found, FirestoreResult};
use crate::model::{resolve_collection_path, DatabaseId};
use crate::remote::{Datastore, DatastoreArc, HttpDatastore, JsonProtoSerializer};
use crate::value::ValueEncoder;

use super::reference::{CollectionReference, DocumentReference};
use super::transaction::Transaction;
use super::write_batch::WriteBatch;

/// Future returned by the closure handed to [`Firestore::run_transaction`].
#[cfg(not(target_arch = "wasm32"))]
pub type TransactionFuture<'a, T> = Pin<Box<dyn Future<Output = FirestoreResult<T>> + Send + 'a>>;
#[cfg(target_arch = "wasm32")]
pub type TransactionFuture<'a, T> = Pin<Box<dyn Future<Output = FirestoreResult<T>> + 'a>>;

/// Handle to one Firestore database.
///
/// Cloning is cheap; every clone talks through the same [`Datastore`].
#[derive(Clone)]
pub struct Firestore {
    inner: Arc<FirestoreInner>,
}

struct FirestoreInner {
    database_id: DatabaseId,
    datastore: DatastoreArc,
    serializer: JsonProtoSerializer,
}

impl Firestore {
    /// Connects to Firestore over HTTP using `settings`.
    ///
    /// Fails with an authentication error when neither an emulator host nor
    /// an access token is configured.
    pub fn connect(settings: &FirestoreSettings) -> FirestoreResult<Self> {
        settings.validate()?;
        if !settings.uses_emulator() && settings.access_token.is_none() {
            return Err(credentials_not_found());
        }
        let datastore = HttpDatastore::from_settings(settings)?;
        Ok(Self::with_datastore(settings.database()?, datastore))
    }

    pub fn with_datastore<D: Datastore>(database_id: DatabaseId, datastore: D) -> Self {
        Self::with_datastore_arc(database_id, Arc::new(datastore))
    }

    pub fn with_datastore_arc(database_id: DatabaseId, datastore: DatastoreArc) -> Self {
        let serializer = JsonProtoSerializer::new(database_id.clone());
        Self {
            inner: Arc::new(FirestoreInner {
                database_id,
                datastore,
                serializer,
            }),
        }
    }

    /// Returns a handle that encodes values with `encoder`.
    pub fn with_encoder(&self, encoder: ValueEncoder) -> Self {
        Self {
            inner: Arc::new(FirestoreInner {
                database_id: self.inner.database_id.clone(),
                datastore: Arc::clone(&self.inner.datastore),
                serializer: self.inner.serializer.clone().with_encoder(encoder),
            }),
        }
    }

    pub fn database_id(&self) -> &DatabaseId {
        &self.inner.database_id
    }

    pub fn project_id(&self) -> &str {
        self.inner.database_id.project_id()
    }

    /// The logical database name (usually `"(default)"`).
    pub fn database(&self) -> &str {
        self.inner.database_id.database()
    }

    /// `projects/{project}/databases/{database}/documents`
    pub fn base_path(&self) -> String {
        self.inner.database_id.documents_path()
    }

    /// `projects/{project}/databases/{database}`
    pub fn database_path(&self) -> String {
        self.inner.database_id.database_path()
    }

    /// A reference to the collection at `path`, relative to the documents
    /// root or already absolute.
    pub fn collection(&self, path: &str) -> FirestoreResult<CollectionReference> {
        CollectionReference::new(self.clone(), path)
    }

    pub fn document(&self, collection: &str, id: &str) -> FirestoreResult<DocumentReference> {
        DocumentReference::new(self.clone(), collection, id)
    }

    pub fn batch(&self) -> WriteBatch {
        WriteBatch::new(self.clone())
    }

    /// Starts a server-side transaction.
    pub async fn begin_transaction(&self) -> FirestoreResult<Transaction> {
        Transaction::begin(self.clone()).await
    }

    /// Adopts a transaction that was begun elsewhere, without a begin exchange.
    pub fn transaction_with_id(&self, id: impl Into<String>) -> Transaction {
        Transaction::with_id(self.clone(), id.into())
    }

    /// Runs `operation` inside a new transaction.
    ///
    /// The transaction is committed when the closure succeeds and rolled back
    /// when the closure or the commit fails, unless it was already finalized.
    /// The original error is returned unchanged even if the rollback fails.
    pub async fn run_transaction<T, F>(&self, operation: F) -> FirestoreResult<T>
    where
        F: for<'a> FnOnce(&'a mut Transaction) -> TransactionFuture<'a, T>,
    {
        let mut transaction = self.begin_transaction().await?;
        let outcome = operation(&mut transaction).await;
        let outcome = match outcome {
            Ok(value) if transaction.is_active() => transaction.commit().await.map(|_| value),
            outcome => outcome,
        };
        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if transaction.is_active() {
            if let Err(rollback_err) = transaction.rollback().await {
                log::warn!(
                    "rollback of transaction {} failed: {rollback_err}",
                    transaction.id()
                );
            }
        }
        Err(err)
    }

    pub(crate) fn datastore(&self) -> &DatastoreArc {
        &self.inner.datastore
    }

    pub(crate) fn serializer(&self) -> &JsonProtoSerializer {
        &self.inner.serializer
    }

    pub(crate) fn collection_path(&self, collection: &str) -> String {
        resolve_collection_path(&self.base_path(), collection)
    }
}

impl Debug for Firestore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Firestore")
            .field("database_id", &self.inner.database_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FirestoreError, TransactionError};
    use crate::test_support::in_memory_firestore as firestore;
    use crate::value::{FirestoreValue, MapValue};

    #[test]
    fn exposes_database_paths() {
        let (firestore, _) = firestore();
        assert_eq!(firestore.base_path(), "projects/demo/databases/(default)/documents");
        assert_eq!(firestore.database_path(), "projects/demo/databases/(default)");
        assert_eq!(firestore.project_id(), "demo");
        assert_eq!(firestore.database(), "(default)");
    }

    #[test]
    fn connect_requires_credentials() {
        let err = Firestore::connect(&FirestoreSettings::new("demo")).unwrap_err();
        assert_eq!(err.code_str(), "firestore/unauthenticated");

        let emulator = FirestoreSettings::new("demo").with_emulator_host("localhost:8080");
        assert!(Firestore::connect(&emulator).is_ok());
    }

    #[tokio::test]
    async fn run_transaction_commits_on_success() {
        let (firestore, datastore) = firestore();
        let doc = firestore.document("counters", "visits").unwrap();

        let result = firestore
            .run_transaction(move |transaction| {
                Box::pin(async move {
                    transaction.create(&doc, MapValue::default().with("count", 1))?;
                    Ok(7)
                })
            })
            .await
            .unwrap();

        assert_eq!(result, 7);
        let stored = datastore
            .document("projects/demo/databases/(default)/documents/counters/visits")
            .unwrap();
        assert_eq!(stored.get("count"), Some(&FirestoreValue::from(1)));
        assert_eq!(datastore.active_transactions(), 0);
    }

    #[tokio::test]
    async fn run_transaction_rolls_back_and_returns_original_error() {
        let (firestore, datastore) = firestore();
        let doc = firestore.document("counters", "missing").unwrap();

        let err = firestore
            .run_transaction(move |transaction| {
                Box::pin(async move {
                    transaction.get(&doc).await?;
                    Ok(())
                })
            })
            .await
            .unwrap_err();

        assert_eq!(
            err,
            FirestoreError::Transaction(TransactionError::DocumentNotFound {
                document_id: "missing".to_string()
            })
        );
        let last = datastore.last_request().unwrap();
        assert!(last.path.ends_with(":rollback"));
        assert_eq!(datastore.active_transactions(), 0);
    }

    #[tokio::test]
    async fn run_transaction_rolls_back_when_commit_fails() {
        let (firestore, datastore) = firestore();
        let doc = firestore.document("counters", "visits").unwrap();
        datastore.fail_next(
            reqwest::Method::POST,
            ":commit",
            409,
            serde_json::json!({ "error": { "status": "ABORTED", "message": "contention" } }),
        );

        let err = firestore
            .run_transaction(move |transaction| {
                Box::pin(async move {
                    transaction.create(&doc, MapValue::default().with("count", 1))?;
                    Ok(())
                })
            })
            .await
            .unwrap_err();

        assert_eq!(err.as_api().unwrap().status(), Some("ABORTED"));
        let paths: Vec<String> = datastore
            .requests()
            .into_iter()
            .map(|request| request.path)
            .collect();
        assert_eq!(paths, ["v1:beginTransaction", "v1:commit", "v1:rollback"]);
        assert_eq!(datastore.active_transactions(), 0);
        assert_eq!(datastore.document_count(), 0);
    }
}
