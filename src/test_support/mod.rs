//! Test utilities shared across crate-level unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use httpmock::MockServer;
use serde_json::Value as JsonValue;

use crate::api::Firestore;
use crate::error::FirestoreResult;
use crate::model::DatabaseId;
use crate::remote::{Datastore, InMemoryDatastore};

/// Start a fresh `httpmock::MockServer` instance for HTTP transport tests.
pub fn start_mock_server() -> MockServer {
    MockServer::start()
}

/// A handle on project `demo` backed by a fresh in-memory datastore. The
/// datastore is returned alongside so tests can seed and inspect it.
pub fn in_memory_firestore() -> (Firestore, InMemoryDatastore) {
    let datastore = InMemoryDatastore::new();
    let firestore = Firestore::with_datastore(DatabaseId::default("demo"), datastore.clone());
    (firestore, datastore)
}

/// Accepts every request with the same `reply` and counts the commits sent.
#[derive(Clone)]
pub struct FixedReplyDatastore {
    reply: JsonValue,
    commits: Arc<AtomicUsize>,
}

impl FixedReplyDatastore {
    pub fn new(reply: JsonValue) -> Self {
        Self {
            reply,
            commits: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn firestore(&self) -> Firestore {
        Firestore::with_datastore(DatabaseId::default("demo"), self.clone())
    }
}

#[async_trait]
impl Datastore for FixedReplyDatastore {
    async fn get(&self, _path: &str) -> FirestoreResult<JsonValue> {
        Ok(self.reply.clone())
    }

    async fn post(&self, path: &str, _body: JsonValue) -> FirestoreResult<JsonValue> {
        if path.ends_with(":commit") {
            self.commits.fetch_add(1, Ordering::SeqCst);
        }
        Ok(self.reply.clone())
    }

    async fn patch(&self, _path: &str, _body: JsonValue) -> FirestoreResult<JsonValue> {
        Ok(self.reply.clone())
    }

    async fn delete(&self, _path: &str) -> FirestoreResult<JsonValue> {
        Ok(self.reply.clone())
    }
}
