use serde_json::{json, Map, Value as JsonValue};

use crate::api::Operation;
use crate::constants::DOCUMENT_NAME_FIELD;
use crate::error::{FirestoreResult, TransactionError};
use crate::model::path::{last_segment, parent_path};
use crate::model::{build_field_mask, DatabaseId, Timestamp};
use crate::value::{fields_to_json, FirestoreValue, ValueEncoder};

/// Result of a successful commit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommitResponse {
    pub commit_time: Option<Timestamp>,
    /// One entry per write, in the order the writes were queued.
    pub write_results: Vec<WriteResult>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteResult {
    pub update_time: Option<Timestamp>,
}

/// Translates queued operations and RPC requests into their REST JSON bodies.
#[derive(Clone, Debug)]
pub struct JsonProtoSerializer {
    database_id: DatabaseId,
    encoder: ValueEncoder,
}

impl JsonProtoSerializer {
    pub fn new(database_id: DatabaseId) -> Self {
        Self {
            database_id,
            encoder: ValueEncoder::new(),
        }
    }

    pub fn with_encoder(mut self, encoder: ValueEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn database_id(&self) -> &DatabaseId {
        &self.database_id
    }

    pub fn encoder(&self) -> &ValueEncoder {
        &self.encoder
    }

    /// `projects/{project}/databases/{database}`
    pub fn database_name(&self) -> String {
        self.database_id.database_path()
    }

    /// Builds the single wire write for `operation`.
    ///
    /// Create and non-merge updates replace the whole document. Merge updates
    /// attach an `updateMask` naming the top-level keys of the data.
    pub fn compose_write(&self, operation: &Operation) -> FirestoreResult<JsonValue> {
        match operation {
            Operation::Create { path, data }
            | Operation::Update {
                path,
                data,
                merge: false,
            } => Ok(json!({
                "update": {
                    "name": path,
                    "fields": fields_to_json(&self.encoder.encode_fields(data)?),
                }
            })),
            Operation::Update {
                path,
                data,
                merge: true,
            } => {
                let mask = build_field_mask(data.keys())?;
                Ok(json!({
                    "update": {
                        "name": path,
                        "fields": fields_to_json(&self.encoder.encode_fields(data)?),
                    },
                    "updateMask": { "fieldPaths": mask },
                }))
            }
            Operation::Delete { path } => Ok(json!({ "delete": path })),
        }
    }

    /// Body of `POST v1:commit`; writes keep the order of `operations`.
    pub fn encode_commit_body(
        &self,
        operations: &[Operation],
        transaction: Option<&str>,
    ) -> FirestoreResult<JsonValue> {
        let writes = operations
            .iter()
            .map(|operation| self.compose_write(operation))
            .collect::<FirestoreResult<Vec<_>>>()?;
        let mut body = Map::new();
        body.insert("database".to_string(), JsonValue::String(self.database_name()));
        body.insert("writes".to_string(), JsonValue::Array(writes));
        if let Some(id) = transaction {
            body.insert("transaction".to_string(), JsonValue::String(id.to_string()));
        }
        Ok(JsonValue::Object(body))
    }

    pub fn encode_begin_transaction_body(&self) -> JsonValue {
        json!({ "database": self.database_name() })
    }

    pub fn encode_rollback_body(&self, transaction: &str) -> JsonValue {
        json!({
            "database": self.database_name(),
            "transaction": transaction,
        })
    }

    /// `:runQuery` body reading the single document at `document_path`
    /// inside `transaction`.
    pub fn encode_transactional_get_body(
        &self,
        document_path: &str,
        transaction: &str,
    ) -> FirestoreResult<JsonValue> {
        let collection_id = last_segment(parent_path(document_path));
        let reference = self
            .encoder
            .encode_json(&FirestoreValue::from_reference(document_path))?;
        Ok(json!({
            "structuredQuery": {
                "from": [ { "collectionId": collection_id } ],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": DOCUMENT_NAME_FIELD },
                        "op": "EQUAL",
                        "value": reference,
                    }
                },
                "limit": 1,
            },
            "transaction": transaction,
        }))
    }

    pub fn decode_begin_transaction(&self, response: &JsonValue) -> FirestoreResult<String> {
        match response.get("transaction").and_then(JsonValue::as_str) {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(TransactionError::FailedToStart.into()),
        }
    }

    pub fn decode_commit_response(&self, response: &JsonValue) -> FirestoreResult<CommitResponse> {
        let commit_time = optional_timestamp(response.get("commitTime"))?;
        let write_results = match response.get("writeResults").and_then(JsonValue::as_array) {
            Some(results) => results
                .iter()
                .map(|result| {
                    Ok(WriteResult {
                        update_time: optional_timestamp(result.get("updateTime"))?,
                    })
                })
                .collect::<FirestoreResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(CommitResponse {
            commit_time,
            write_results,
        })
    }

    /// Documents carried by a `:runQuery` response, skipping entries that
    /// only report progress.
    pub fn run_query_documents<'a>(&self, response: &'a JsonValue) -> Vec<&'a JsonValue> {
        let Some(entries) = response.as_array() else {
            log::warn!("runQuery response was not an array; treating it as empty");
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|entry| entry.get("document"))
            .filter(|document| {
                let named = document.get("name").and_then(JsonValue::as_str).is_some();
                if !named {
                    log::warn!("skipping runQuery entry without a document name");
                }
                named
            })
            .collect()
    }
}

fn optional_timestamp(value: Option<&JsonValue>) -> FirestoreResult<Option<Timestamp>> {
    match value.and_then(JsonValue::as_str) {
        Some(text) => Timestamp::parse_rfc3339(text).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FirestoreError;
    use crate::value::MapValue;

    const DOC_A: &str = "projects/p/databases/(default)/documents/users/a";
    const DOC_B: &str = "projects/p/databases/(default)/documents/users/b";

    fn serializer() -> JsonProtoSerializer {
        JsonProtoSerializer::new(DatabaseId::default("p"))
    }

    #[test]
    fn batch_writes_keep_queue_order() {
        let operations = vec![
            Operation::create(DOC_A, MapValue::default().with("x", 1)),
            Operation::delete(DOC_B),
        ];
        let body = serializer().encode_commit_body(&operations, None).unwrap();
        assert_eq!(
            body,
            json!({
                "database": "projects/p/databases/(default)",
                "writes": [
                    { "update": { "name": DOC_A, "fields": { "x": { "integerValue": "1" } } } },
                    { "delete": DOC_B }
                ]
            })
        );
    }

    #[test]
    fn merge_update_lists_keys_in_order() {
        let data = MapValue::default().with("a", 1).with("b", 2);
        let write = serializer()
            .compose_write(&Operation::update(DOC_A, data.clone(), true))
            .unwrap();
        assert_eq!(write["updateMask"]["fieldPaths"], json!(["a", "b"]));

        let overwrite = serializer()
            .compose_write(&Operation::update(DOC_A, data, false))
            .unwrap();
        assert!(overwrite.get("updateMask").is_none());
    }

    #[test]
    fn merge_mask_escapes_numeric_segments() {
        let data = MapValue::default().with("a.3.b", true);
        let write = serializer()
            .compose_write(&Operation::update(DOC_A, data, true))
            .unwrap();
        assert_eq!(write["updateMask"]["fieldPaths"], json!(["a.`3`.b"]));
    }

    #[test]
    fn commit_body_carries_transaction() {
        let body = serializer().encode_commit_body(&[], Some("txn-1")).unwrap();
        assert_eq!(body["transaction"], "txn-1");
        assert_eq!(body["writes"], json!([]));
    }

    #[test]
    fn transactional_get_filters_by_name() {
        let body = serializer()
            .encode_transactional_get_body(DOC_A, "txn-1")
            .unwrap();
        assert_eq!(body["transaction"], "txn-1");
        assert_eq!(body["structuredQuery"]["from"][0]["collectionId"], "users");
        assert_eq!(
            body["structuredQuery"]["where"]["fieldFilter"]["value"],
            json!({ "referenceValue": DOC_A })
        );
        assert_eq!(body["structuredQuery"]["limit"], 1);
    }

    #[test]
    fn begin_without_id_fails_to_start() {
        let err = serializer().decode_begin_transaction(&json!({})).unwrap_err();
        assert_eq!(err, FirestoreError::from(TransactionError::FailedToStart));
    }

    #[test]
    fn decodes_commit_response() {
        let response = serializer()
            .decode_commit_response(&json!({
                "commitTime": "2024-05-01T10:00:00.000001Z",
                "writeResults": [ { "updateTime": "2024-05-01T10:00:00.000001Z" }, {} ]
            }))
            .unwrap();
        assert_eq!(response.write_results.len(), 2);
        assert_eq!(response.write_results[1].update_time, None);
        assert_eq!(response.commit_time.unwrap().nanos, 1_000);
    }

    #[test]
    fn run_query_skips_progress_entries() {
        let response = json!([
            { "readTime": "2024-05-01T10:00:00Z" },
            { "document": { "name": DOC_A, "fields": {} } }
        ]);
        let serializer = serializer();
        let documents = serializer.run_query_documents(&response);
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0]["name"], DOC_A);
    }
}
