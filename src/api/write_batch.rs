use crate::constants::MAX_BATCH_WRITES;
use crate::error::{BatchError, FirestoreResult};
use crate::remote::CommitResponse;
use crate::value::MapValue;

use super::database::Firestore;
use super::operations::Operation;
use super::reference::DocumentReference;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchState {
    Open,
    Committed,
}

/// Accumulates writes across documents and commits them atomically, once.
///
/// A commit the server rejects leaves the batch open so it can be retried.
/// Once the server accepts it the batch is committed, even if the reply
/// cannot be decoded.
#[derive(Clone, Debug)]
pub struct WriteBatch {
    firestore: Firestore,
    operations: Vec<Operation>,
    state: BatchState,
}

impl WriteBatch {
    pub(crate) fn new(firestore: Firestore) -> Self {
        Self {
            firestore,
            operations: Vec::new(),
            state: BatchState::Open,
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

    /// Sends every queued write in one `commit` request.
    pub async fn commit(&mut self) -> FirestoreResult<CommitResponse> {
        self.ensure_open()?;
        let serializer = self.firestore.serializer();
        let body = serializer.encode_commit_body(&self.operations, None)?;
        let response = self.firestore.datastore().post("v1:commit", body).await?;
        self.state = BatchState::Committed;
        let response = serializer.decode_commit_response(&response)?;
        log::debug!("batch of {} writes committed", self.operations.len());
        Ok(response)
    }

    pub fn is_committed(&self) -> bool {
        self.state == BatchState::Committed
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    fn push(&mut self, operation: Operation) -> FirestoreResult<&mut Self> {
        self.ensure_open()?;
        if self.operations.len() >= MAX_BATCH_WRITES {
            return Err(BatchError::TooManyOperations {
                count: self.operations.len() + 1,
                limit: MAX_BATCH_WRITES,
            }
            .into());
        }
        self.operations.push(operation);
        Ok(self)
    }

    fn ensure_open(&self) -> FirestoreResult<()> {
        match self.state {
            BatchState::Open => Ok(()),
            BatchState::Committed => Err(BatchError::AlreadyCommitted.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EncodingErrorKind, FirestoreError};
    use crate::test_support::{in_memory_firestore as firestore, FixedReplyDatastore};
    use reqwest::Method;
    use serde_json::json;

    #[tokio::test]
    async fn commits_writes_in_queue_order() {
        let (firestore, datastore) = firestore();
        let doc_a = firestore.document("docs", "a").unwrap();
        let doc_b = firestore.document("docs", "b").unwrap();

        let mut batch = firestore.batch();
        batch
            .create(&doc_a, MapValue::default().with("x", 1))
            .unwrap()
            .delete(&doc_b)
            .unwrap();
        let response = batch.commit().await.unwrap();
        assert_eq!(response.write_results.len(), 2);

        let request = datastore.last_request().unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "v1:commit");
        assert_eq!(
            request.body.unwrap()["writes"],
            json!([
                { "update": { "name": doc_a.path(), "fields": { "x": { "integerValue": "1" } } } },
                { "delete": doc_b.path() }
            ])
        );
        assert!(batch.is_committed());
    }

    #[tokio::test]
    async fn second_commit_and_later_writes_are_rejected() {
        let (firestore, _) = firestore();
        let doc = firestore.document("docs", "a").unwrap();
        let mut batch = firestore.batch();
        batch.commit().await.unwrap();

        let expected = FirestoreError::Batch(BatchError::AlreadyCommitted);
        assert_eq!(batch.commit().await.unwrap_err(), expected);
        assert_eq!(batch.delete(&doc).unwrap_err(), expected);
        assert_eq!(batch.operation_count(), 0);
    }

    #[tokio::test]
    async fn empty_commit_sends_empty_write_list() {
        let (firestore, datastore) = firestore();
        firestore.batch().commit().await.unwrap();
        let body = datastore.last_request().unwrap().body.unwrap();
        assert_eq!(body["writes"], json!([]));
        assert_eq!(body["database"], "projects/demo/databases/(default)");
    }

    #[tokio::test]
    async fn failed_commit_leaves_batch_open() {
        let (firestore, datastore) = firestore();
        let doc = firestore.document("docs", "a").unwrap();
        datastore.fail_next(Method::POST, "commit", 503, json!({ "raw": "unavailable" }));

        let mut batch = firestore.batch();
        batch.create(&doc, MapValue::default()).unwrap();
        let err = batch.commit().await.unwrap_err();
        assert_eq!(err.as_api().unwrap().status_code, 503);
        assert_eq!(batch.state(), BatchState::Open);

        batch.commit().await.unwrap();
        assert_eq!(datastore.document_count(), 1);
    }

    #[tokio::test]
    async fn accepted_commit_with_unreadable_reply_is_not_resent() {
        let datastore = FixedReplyDatastore::new(json!({ "commitTime": "2024-13-99T00:00:00Z" }));
        let firestore = datastore.firestore();
        let doc = firestore.document("docs", "a").unwrap();

        let mut batch = firestore.batch();
        batch.create(&doc, MapValue::default().with("x", 1)).unwrap();
        let err = batch.commit().await.unwrap_err();
        assert_eq!(
            err.as_encoding().unwrap().kind,
            EncodingErrorKind::MalformedTimestamp
        );
        assert!(batch.is_committed());

        assert_eq!(
            batch.commit().await.unwrap_err(),
            FirestoreError::Batch(BatchError::AlreadyCommitted)
        );
        assert_eq!(datastore.commits(), 1);
    }

    #[test]
    fn enforces_operation_ceiling() {
        let (firestore, _) = firestore();
        let doc = firestore.document("docs", "a").unwrap();
        let mut batch = firestore.batch();
        for _ in 0..MAX_BATCH_WRITES {
            batch.delete(&doc).unwrap();
        }
        let err = batch.delete(&doc).unwrap_err();
        assert_eq!(
            err,
            FirestoreError::Batch(BatchError::TooManyOperations {
                count: 501,
                limit: 500
            })
        );
    }
}
