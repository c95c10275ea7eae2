use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value as JsonValue;

use crate::config::{FirestoreSettings, RetrySettings};
use crate::error::{FirestoreError, FirestoreResult};
use crate::model::DatabaseId;
use crate::platform::runtime::sleep as runtime_sleep;
use crate::remote::connection::{Connection, ConnectionBuilder, RequestContext};
use crate::remote::rpc_error::{is_rejected_unprocessed, is_retryable_status};

use super::{Datastore, NoopTokenProvider, StaticTokenProvider, TokenProviderArc};

/// [`Datastore`] backed by the Firestore REST endpoint (or an emulator).
#[derive(Clone)]
pub struct HttpDatastore {
    connection: Connection,
    auth_provider: TokenProviderArc,
    retry: RetrySettings,
}

#[derive(Clone)]
pub struct HttpDatastoreBuilder {
    connection_builder: ConnectionBuilder,
    auth_provider: TokenProviderArc,
    retry: RetrySettings,
}

impl HttpDatastore {
    pub fn builder(database_id: DatabaseId) -> HttpDatastoreBuilder {
        HttpDatastoreBuilder::new(database_id)
    }

    pub fn from_database_id(database_id: DatabaseId) -> FirestoreResult<Self> {
        Self::builder(database_id).build()
    }

    /// Builds a datastore from validated settings: emulator host, static
    /// access token and retry policy.
    pub fn from_settings(settings: &FirestoreSettings) -> FirestoreResult<Self> {
        let database_id = settings.database()?;
        let mut connection_builder = Connection::builder(database_id.clone());
        if let Some(host) = settings.emulator_host.as_deref() {
            connection_builder = connection_builder.with_emulator_host(host);
        }
        let mut builder = Self::builder(database_id)
            .with_connection_builder(connection_builder)
            .with_retry_settings(settings.retry.clone());
        if let Some(token) = settings.access_token.as_deref() {
            builder = builder.with_auth_provider(Arc::new(StaticTokenProvider::new(token)));
        }
        builder.build()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    async fn execute_with_retry(
        &self,
        method: Method,
        path: &str,
        body: Option<&JsonValue>,
    ) -> FirestoreResult<JsonValue> {
        let mut attempt = 0usize;
        loop {
            let context = self.build_request_context().await?;
            match self
                .connection
                .invoke_json(method.clone(), path, body, &context)
                .await
            {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if matches!(&err, FirestoreError::Api(api) if api.status_code == 401) {
                        self.auth_provider.invalidate_token();
                    }

                    if !should_retry(&self.retry, attempt, &method, &err) {
                        return Err(err);
                    }

                    let delay = self.retry.backoff_delay(attempt);
                    log::warn!(
                        "retrying {method} {path} in {delay:?} (attempt {} of {}): {err}",
                        attempt + 2,
                        self.retry.max_attempts
                    );
                    runtime_sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn build_request_context(&self) -> FirestoreResult<RequestContext> {
        let auth_token = self.auth_provider.get_token().await?;
        Ok(RequestContext {
            auth_token,
            request_timeout: Some(self.retry.request_timeout),
        })
    }
}

/// Idempotent requests are retried on any transient status or transport
/// failure. A `POST` (commit, begin, rollback) is retried only when the server
/// rejected it unprocessed, so a write can never be applied twice.
fn should_retry(retry: &RetrySettings, attempt: usize, method: &Method, error: &FirestoreError) -> bool {
    if !retry.has_attempts_left(attempt) {
        return false;
    }
    match error {
        FirestoreError::Api(api) if api.is_transport_failure() => is_idempotent(method),
        FirestoreError::Api(api) if is_idempotent(method) => is_retryable_status(api.status_code),
        FirestoreError::Api(api) => is_rejected_unprocessed(api.status_code),
        _ => false,
    }
}

fn is_idempotent(method: &Method) -> bool {
    *method == Method::GET || *method == Method::PATCH || *method == Method::DELETE
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl Datastore for HttpDatastore {
    async fn get(&self, path: &str) -> FirestoreResult<JsonValue> {
        self.execute_with_retry(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: JsonValue) -> FirestoreResult<JsonValue> {
        self.execute_with_retry(Method::POST, path, Some(&body)).await
    }

    async fn patch(&self, path: &str, body: JsonValue) -> FirestoreResult<JsonValue> {
        self.execute_with_retry(Method::PATCH, path, Some(&body)).await
    }

    async fn delete(&self, path: &str) -> FirestoreResult<JsonValue> {
        self.execute_with_retry(Method::DELETE, path, None).await
    }
}

impl HttpDatastoreBuilder {
    fn new(database_id: DatabaseId) -> Self {
        let auth_provider: TokenProviderArc = Arc::new(NoopTokenProvider);
        let connection_builder = Connection::builder(database_id);
        Self {
            connection_builder,
            auth_provider,
            retry: RetrySettings::default(),
        }
    }

    pub fn with_auth_provider(mut self, provider: TokenProviderArc) -> Self {
        self.auth_provider = provider;
        self
    }

    pub fn with_retry_settings(mut self, settings: RetrySettings) -> Self {
        self.retry = settings;
        self
    }

    pub fn with_connection_builder(mut self, builder: ConnectionBuilder) -> Self {
        self.connection_builder = builder;
        self
    }

    pub fn build(self) -> FirestoreResult<HttpDatastore> {
        let connection = self.connection_builder.build()?;
        Ok(HttpDatastore {
            connection,
            auth_provider: self.auth_provider,
            retry: self.retry,
        })
    }
}
