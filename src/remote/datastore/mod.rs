use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::FirestoreResult;

pub mod http;
pub mod in_memory;

/// The HTTP collaborator every higher-level operation talks through.
///
/// `path` is either a resource name (`projects/.../documents/users/ada`),
/// optionally followed by a query string, or an RPC suffix such as
/// `v1:commit` that is resolved against the database.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait Datastore: Send + Sync + 'static {
    async fn get(&self, path: &str) -> FirestoreResult<JsonValue>;
    async fn post(&self, path: &str, body: JsonValue) -> FirestoreResult<JsonValue>;
    async fn patch(&self, path: &str, body: JsonValue) -> FirestoreResult<JsonValue>;
    async fn delete(&self, path: &str) -> FirestoreResult<JsonValue>;
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait TokenProvider: Send + Sync + 'static {
    async fn get_token(&self) -> FirestoreResult<Option<String>>;
    fn invalidate_token(&self);
}

#[derive(Default, Clone)]
pub struct NoopTokenProvider;

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl TokenProvider for NoopTokenProvider {
    async fn get_token(&self) -> FirestoreResult<Option<String>> {
        Ok(None)
    }

    fn invalidate_token(&self) {}
}

/// Hands out a fixed, externally obtained access token.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self) -> FirestoreResult<Option<String>> {
        Ok(Some(self.token.clone()))
    }

    fn invalidate_token(&self) {
        log::warn!("static access token was rejected; it cannot be refreshed");
    }
}

pub type TokenProviderArc = Arc<dyn TokenProvider>;
pub type DatastoreArc = Arc<dyn Datastore>;

pub use http::{HttpDatastore, HttpDatastoreBuilder};
pub use in_memory::{InMemoryDatastore, RecordedRequest};
