use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value as JsonValue;

use crate::constants::{FIRESTORE_API_HOST, FIRESTORE_API_VERSION};
use crate::error::{internal_error, FirestoreResult};
use crate::model::DatabaseId;

use super::rpc_error::{map_http_error, transport_error};

#[derive(Clone, Debug)]
pub struct Connection {
    client: Client,
    host: String,
    database_id: DatabaseId,
}

#[derive(Clone, Debug)]
pub struct ConnectionBuilder {
    database_id: DatabaseId,
    client: Option<Client>,
    emulator_host: Option<String>,
}

#[derive(Default, Clone, Debug)]
pub struct RequestContext {
    pub auth_token: Option<String>,
    pub request_timeout: Option<Duration>,
}

impl ConnectionBuilder {
    pub fn new(database_id: DatabaseId) -> Self {
        Self {
            database_id,
            client: None,
            emulator_host: None,
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_emulator_host(mut self, host: impl Into<String>) -> Self {
        self.emulator_host = Some(host.into());
        self
    }

    pub fn build(self) -> FirestoreResult<Connection> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .build()
                .map_err(|err| internal_error(err.to_string()))?,
        };
        let host = match self.emulator_host {
            Some(emulator) => format!("http://{}", emulator.trim_end_matches('/')),
            None => FIRESTORE_API_HOST.to_string(),
        };
        Ok(Connection {
            client,
            host,
            database_id: self.database_id,
        })
    }
}

impl Connection {
    pub fn builder(database_id: DatabaseId) -> ConnectionBuilder {
        ConnectionBuilder::new(database_id)
    }

    pub fn database_id(&self) -> &DatabaseId {
        &self.database_id
    }

    /// Resolves a request path to a URL.
    ///
    /// * `v1:{method}` targets `{database}/documents:{method}`.
    /// * `v1/...` is taken as already versioned.
    /// * anything else is a resource name below `v1/`.
    pub fn url_for(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if let Some(method) = path.strip_prefix("v1:") {
            format!(
                "{}/{FIRESTORE_API_VERSION}/{}:{method}",
                self.host,
                self.database_id.documents_path()
            )
        } else if path.starts_with("v1/") {
            format!("{}/{path}", self.host)
        } else {
            format!("{}/{FIRESTORE_API_VERSION}/{path}", self.host)
        }
    }

    pub async fn invoke_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&JsonValue>,
        context: &RequestContext,
    ) -> FirestoreResult<JsonValue> {
        log::debug!("{method} {path}");
        let mut request = self.build_request(method, path, context);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|err| transport_error(err, path))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| transport_error(err, path))?;
        if status.is_success() {
            if text.trim().is_empty() {
                Ok(JsonValue::Null)
            } else {
                serde_json::from_str(&text).map_err(|err| {
                    internal_error(format!("Malformed JSON response for {path}: {err}"))
                })
            }
        } else {
            Err(map_http_error(status.as_u16(), &text, path).into())
        }
    }

    fn build_request(&self, method: Method, path: &str, context: &RequestContext) -> RequestBuilder {
        let mut builder = self.client.request(method, self.url_for(path));
        #[cfg(not(target_arch = "wasm32"))]
        {
            if let Some(timeout) = context.request_timeout {
                builder = builder.timeout(timeout);
            }
        }
        if let Some(token) = context.auth_token.as_deref() {
            builder = builder.bearer_auth(token);
        }
        builder = builder.header("Content-Type", "application/json");
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(emulator: Option<&str>) -> Connection {
        let mut builder = Connection::builder(DatabaseId::default("demo"));
        if let Some(host) = emulator {
            builder = builder.with_emulator_host(host);
        }
        builder.build().expect("connection")
    }

    #[test]
    fn rpc_suffixes_resolve_against_the_database() {
        let connection = connection(None);
        assert_eq!(
            connection.url_for("v1:commit"),
            "https://firestore.googleapis.com/v1/projects/demo/databases/(default)/documents:commit"
        );
    }

    #[test]
    fn resource_paths_gain_the_version_prefix() {
        let connection = connection(Some("localhost:8080/"));
        assert_eq!(
            connection.url_for("projects/demo/databases/(default)/documents/users/ada"),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents/users/ada"
        );
        assert_eq!(
            connection.url_for("/v1/projects/demo/databases/(default)/documents:runQuery"),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents:runQuery"
        );
    }
}
