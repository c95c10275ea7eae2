use crate::error::{FirestoreResult, TransactionError};
use crate::model::path::parent_path;
use crate::remote::CommitResponse;
use crate::value::MapValue;

use super::database::Firestore;
use super::operations::Operation;
use super::reference::DocumentReference;
use super::snapshot::DocumentSnapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

/// A server-side transaction: consistent reads plus buffered writes that are
/// committed together or discarded.
///
/// Conflict detection is left to the server. A commit or rollback the server
/// rejects leaves the transaction active; an accepted commit finalizes it
/// even if the reply cannot be decoded.
#[derive(Clone, Debug)]
pub struct Transaction {
    firestore: Firestore,
    id: String,
    operations: Vec<Operation>,
    state: TransactionState,
}

impl Transaction {
    pub(crate) async fn begin(firestore: Firestore) -> FirestoreResult<Self> {
        let serializer = firestore.serializer();
        let response = firestore
            .datastore()
            .post("v1:beginTransaction", serializer.encode_begin_transaction_body())
            .await?;
        let id = serializer.decode_begin_transaction(&response)?;
        log::debug!("transaction {id} begun");
        Ok(Self::with_id(firestore, id))
    }

    pub(crate) fn with_id(firestore: Firestore, id: String) -> Self {
        Self {
            firestore,
            id,
            operations: Vec::new(),
            state: TransactionState::Active,
        }
    }

    /// Server-issued transaction identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Reads `document` as of this transaction. Does not queue a write.
    pub async fn get(&self, document: &DocumentReference) -> FirestoreResult<DocumentSnapshot> {
        self.ensure_active()?;
        let serializer = self.firestore.serializer();
        let body = serializer.encode_transactional_get_body(document.path(), &self.id)?;
        let request = format!("{}:runQuery", parent_path(parent_path(document.path())));
        let response = self.firestore.datastore().post(&request, body).await?;
        match serializer.run_query_documents(&response).first() {
            Some(found) => DocumentSnapshot::from_document_json(&self.firestore, found),
            None => Err(TransactionError::DocumentNotFound {
                document_id: document.id().to_string(),
            }
            .into()),
        }
    }

    pub fn create(
        &mut self,
        document: &DocumentReference,
        data: impl Into<MapValue>,
    ) -> FirestoreResult<&mut Self> {
        self.push(Operation::create(document.path(), data.into()))
    }

    pub fn update(
        &mut self,
        document: &DocumentReference,
        data: impl Into<MapValue>,
        merge: bool,
    ) -> FirestoreResult<&mut Self> {
        self.push(Operation::update(document.path(), data.into(), merge))
    }

    pub fn delete(&mut self, document: &DocumentReference) -> FirestoreResult<&mut Self> {
        self.push(Operation::delete(document.path()))
    }

    /// Commits the queued writes under this transaction's id.
    pub async fn commit(&mut self) -> FirestoreResult<CommitResponse> {
        self.ensure_finalizable()?;
        let serializer = self.firestore.serializer();
        let body = serializer.encode_commit_body(&self.operations, Some(self.id.as_str()))?;
        let response = self.firestore.datastore().post("v1:commit", body).await?;
        self.state = TransactionState::Committed;
        let response = serializer.decode_commit_response(&response)?;
        log::debug!("transaction {} committed", self.id);
        Ok(response)
    }

    /// Abandons the transaction and drops the queued writes.
    pub async fn rollback(&mut self) -> FirestoreResult<()> {
        self.ensure_finalizable()?;
        let body = self.firestore.serializer().encode_rollback_body(&self.id);
        self.firestore.datastore().post("v1:rollback", body).await?;
        self.state = TransactionState::RolledBack;
        self.operations.clear();
        log::debug!("transaction {} rolled back", self.id);
        Ok(())
    }

    fn push(&mut self, operation: Operation) -> FirestoreResult<&mut Self> {
        self.ensure_active()?;
        self.operations.push(operation);
        Ok(self)
    }

    fn ensure_active(&self) -> FirestoreResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(TransactionError::AlreadyFinalized.into())
        }
    }

    fn ensure_finalizable(&self) -> FirestoreResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Committed => Err(TransactionError::AlreadyCommitted.into()),
            TransactionState::RolledBack => Err(TransactionError::AlreadyRolledBack.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EncodingErrorKind, FirestoreError};
    use crate::test_support::{in_memory_firestore as firestore, FixedReplyDatastore};
    use crate::value::FirestoreValue;
    use reqwest::Method;
    use serde_json::json;

    const BASE: &str = "projects/demo/databases/(default)/documents";

    #[tokio::test]
    async fn begin_records_server_id() {
        let (firestore, datastore) = firestore();
        let transaction = firestore.begin_transaction().await.unwrap();
        assert!(transaction.is_active());
        assert!(!transaction.id().is_empty());

        let request = datastore.last_request().unwrap();
        assert_eq!(request.path, "v1:beginTransaction");
        assert_eq!(
            request.body.unwrap(),
            json!({ "database": "projects/demo/databases/(default)" })
        );
    }

    #[tokio::test]
    async fn begin_propagates_server_errors() {
        let (firestore, datastore) = firestore();
        datastore.fail_next(Method::POST, "beginTransaction", 500, json!({ "raw": "" }));
        assert!(firestore.begin_transaction().await.is_err());
    }

    #[tokio::test]
    async fn get_reads_inside_transaction() {
        let (firestore, datastore) = firestore();
        datastore.insert_document(
            format!("{BASE}/accounts/alice"),
            MapValue::default().with("balance", 100),
        );
        let doc = firestore.document("accounts", "alice").unwrap();
        let transaction = firestore.begin_transaction().await.unwrap();

        let snapshot = transaction.get(&doc).await.unwrap();
        assert_eq!(snapshot.get("balance"), Some(&FirestoreValue::from(100)));
        assert_eq!(transaction.operation_count(), 0);

        let request = datastore.last_request().unwrap();
        assert_eq!(request.path, format!("{BASE}:runQuery"));
        let body = request.body.unwrap();
        assert_eq!(body["transaction"], transaction.id());
        assert_eq!(body["structuredQuery"]["limit"], 1);
    }

    #[tokio::test]
    async fn get_missing_document_fails() {
        let (firestore, _) = firestore();
        let doc = firestore.document("accounts", "ghost").unwrap();
        let transaction = firestore.begin_transaction().await.unwrap();
        let err = transaction.get(&doc).await.unwrap_err();
        assert_eq!(
            err,
            FirestoreError::Transaction(TransactionError::DocumentNotFound {
                document_id: "ghost".to_string()
            })
        );
    }

    #[tokio::test]
    async fn merge_update_commits_with_mask_and_id() {
        let (firestore, datastore) = firestore();
        let doc = firestore.document("accounts", "alice").unwrap();
        let mut transaction = firestore.begin_transaction().await.unwrap();
        transaction
            .update(&doc, MapValue::default().with("a", 1).with("b", 2), true)
            .unwrap();
        transaction.commit().await.unwrap();

        let body = datastore.last_request().unwrap().body.unwrap();
        assert_eq!(body["transaction"], transaction.id());
        assert_eq!(body["writes"][0]["updateMask"]["fieldPaths"], json!(["a", "b"]));
        assert_eq!(transaction.state(), TransactionState::Committed);
    }

    #[tokio::test]
    async fn finalized_transactions_reject_further_calls() {
        let (firestore, _) = firestore();
        let doc = firestore.document("accounts", "alice").unwrap();

        let mut committed = firestore.begin_transaction().await.unwrap();
        committed.commit().await.unwrap();
        assert_eq!(
            committed.rollback().await.unwrap_err(),
            FirestoreError::Transaction(TransactionError::AlreadyCommitted)
        );
        assert_eq!(
            committed.commit().await.unwrap_err(),
            FirestoreError::Transaction(TransactionError::AlreadyCommitted)
        );
        assert_eq!(
            committed.delete(&doc).unwrap_err(),
            FirestoreError::Transaction(TransactionError::AlreadyFinalized)
        );

        let mut rolled_back = firestore.begin_transaction().await.unwrap();
        rolled_back.create(&doc, MapValue::default()).unwrap();
        rolled_back.rollback().await.unwrap();
        assert_eq!(rolled_back.operation_count(), 0);
        assert_eq!(
            rolled_back.commit().await.unwrap_err(),
            FirestoreError::Transaction(TransactionError::AlreadyRolledBack)
        );
        assert_eq!(
            rolled_back.rollback().await.unwrap_err(),
            FirestoreError::Transaction(TransactionError::AlreadyRolledBack)
        );
        assert_eq!(
            rolled_back.get(&doc).await.unwrap_err(),
            FirestoreError::Transaction(TransactionError::AlreadyFinalized)
        );
    }

    #[tokio::test]
    async fn failed_commit_keeps_transaction_active() {
        let (firestore, datastore) = firestore();
        let doc = firestore.document("accounts", "alice").unwrap();
        let mut transaction = firestore.begin_transaction().await.unwrap();
        transaction
            .create(&doc, MapValue::default().with("balance", 10))
            .unwrap();
        datastore.fail_next(Method::POST, "commit", 503, json!({ "raw": "unavailable" }));

        let err = transaction.commit().await.unwrap_err();
        assert_eq!(err.as_api().unwrap().status_code, 503);
        assert_eq!(transaction.state(), TransactionState::Active);
        assert_eq!(transaction.operation_count(), 1);

        transaction.commit().await.unwrap();
        assert_eq!(transaction.state(), TransactionState::Committed);
        assert!(datastore.document(doc.path()).is_some());
    }

    #[tokio::test]
    async fn failed_rollback_keeps_transaction_active() {
        let (firestore, datastore) = firestore();
        let doc = firestore.document("accounts", "alice").unwrap();
        let mut transaction = firestore.begin_transaction().await.unwrap();
        transaction.delete(&doc).unwrap();
        datastore.fail_next(Method::POST, "rollback", 503, json!({ "raw": "unavailable" }));

        let err = transaction.rollback().await.unwrap_err();
        assert_eq!(err.as_api().unwrap().status_code, 503);
        assert_eq!(transaction.state(), TransactionState::Active);
        assert_eq!(transaction.operation_count(), 1);

        transaction.rollback().await.unwrap();
        assert_eq!(transaction.state(), TransactionState::RolledBack);
        assert_eq!(transaction.operation_count(), 0);
        assert_eq!(datastore.active_transactions(), 0);
    }

    #[tokio::test]
    async fn accepted_commit_with_unreadable_reply_is_not_resent() {
        let datastore = FixedReplyDatastore::new(json!({
            "commitTime": "2024-01-01T00:00:00Z",
            "writeResults": [ { "updateTime": "not a time" } ]
        }));
        let firestore = datastore.firestore();
        let doc = firestore.document("accounts", "alice").unwrap();

        let mut transaction = firestore.transaction_with_id("txn-1");
        transaction.delete(&doc).unwrap();
        let err = transaction.commit().await.unwrap_err();
        assert_eq!(
            err.as_encoding().unwrap().kind,
            EncodingErrorKind::MalformedTimestamp
        );
        assert_eq!(transaction.state(), TransactionState::Committed);

        assert_eq!(
            transaction.commit().await.unwrap_err(),
            FirestoreError::Transaction(TransactionError::AlreadyCommitted)
        );
        assert_eq!(datastore.commits(), 1);
    }

    #[tokio::test]
    async fn adopted_transaction_skips_begin() {
        let (firestore, datastore) = firestore();
        let transaction = firestore.transaction_with_id("external-id");
        assert_eq!(transaction.id(), "external-id");
        assert!(datastore.requests().is_empty());
    }
}
