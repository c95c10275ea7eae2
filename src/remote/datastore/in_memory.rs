use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::Method;
use serde_json::{json, Value as JsonValue};

use crate::constants::DOCUMENT_NAME_FIELD;
use crate::error::{ApiError, FirestoreError, FirestoreResult};
use crate::model::path::{last_segment, parent_path};
use crate::model::{generate_auto_id, FieldPath, Timestamp};
use crate::value::{ArrayValue, FirestoreValue, MapValue, ValueEncoder, ValueKind};

use super::Datastore;

const RPC_METHODS: [&str; 4] = ["commit", "beginTransaction", "rollback", "runQuery"];
const DEFAULT_PAGE_SIZE: usize = 20;

/// An in-process stand-in for the Firestore REST surface.
///
/// Serves document reads and writes, collection listing, `:commit`,
/// `:beginTransaction`, `:rollback` and `:runQuery`, and records every request
/// it receives so tests can inspect the exact wire traffic.
#[derive(Clone, Default)]
pub struct InMemoryDatastore {
    state: Arc<Mutex<State>>,
}

/// One request as received by [`InMemoryDatastore`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<JsonValue>,
}

#[derive(Default)]
struct State {
    documents: BTreeMap<String, StoredDocument>,
    transactions: BTreeSet<String>,
    transaction_counter: u64,
    requests: Vec<RecordedRequest>,
    failures: VecDeque<InjectedFailure>,
}

#[derive(Clone, Debug)]
struct StoredDocument {
    fields: MapValue,
    create_time: Timestamp,
    update_time: Timestamp,
}

struct InjectedFailure {
    method: Method,
    path_fragment: String,
    status_code: u16,
    body: JsonValue,
}

enum Target<'a> {
    Rpc {
        parent: Option<&'a str>,
        method: &'a str,
    },
    Resource(&'a str),
}

impl InMemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.lock().requests.last().cloned()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    /// Makes the next request whose method matches and whose path contains
    /// `path_fragment` fail with `status_code` and `body`.
    pub fn fail_next(
        &self,
        method: Method,
        path_fragment: impl Into<String>,
        status_code: u16,
        body: JsonValue,
    ) {
        self.lock().failures.push_back(InjectedFailure {
            method,
            path_fragment: path_fragment.into(),
            status_code,
            body,
        });
    }

    /// Stored fields of the document named `name`, if present.
    pub fn document(&self, name: &str) -> Option<MapValue> {
        self.lock()
            .documents
            .get(name)
            .map(|stored| stored.fields.clone())
    }

    /// Seeds a document without recording a request.
    pub fn insert_document(&self, name: impl Into<String>, fields: MapValue) {
        let now = Timestamp::now();
        self.lock().documents.insert(
            name.into(),
            StoredDocument {
                fields,
                create_time: now,
                update_time: now,
            },
        );
    }

    pub fn document_count(&self) -> usize {
        self.lock().documents.len()
    }

    pub fn active_transactions(&self) -> usize {
        self.lock().transactions.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, method: Method, path: &str, body: Option<JsonValue>) -> FirestoreResult<JsonValue> {
        let mut state = self.lock();
        state.requests.push(RecordedRequest {
            method: method.clone(),
            path: path.to_string(),
            body: body.clone(),
        });
        if let Some(failure) = state.take_failure(&method, path) {
            return Err(failure.into());
        }

        let (resource, query) = split_query(path);
        let body = body.unwrap_or(JsonValue::Null);
        let encoder = ValueEncoder::new();
        match classify(resource) {
            Target::Rpc { parent, method: rpc } if method == Method::POST => match rpc {
                "commit" => state.commit(&body, path),
                "beginTransaction" => Ok(state.begin_transaction()),
                "rollback" => state.rollback(&body, path),
                _ => state.run_query(parent, &body, path),
            },
            Target::Resource(resource) if method == Method::GET => state.get(resource, &query, path),
            Target::Resource(resource) if method == Method::POST => {
                state.create_document(resource, &query, &body, &encoder, path)
            }
            Target::Resource(resource) if method == Method::PATCH => {
                state.patch_document(resource, &query, &body, &encoder, path)
            }
            Target::Resource(resource) if method == Method::DELETE => {
                document_segments(resource, path)?;
                state.documents.remove(resource);
                Ok(json!({}))
            }
            _ => Err(rpc_error(
                400,
                "INVALID_ARGUMENT",
                format!("Unsupported request {method} {path}"),
                path,
            )),
        }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl Datastore for InMemoryDatastore {
    async fn get(&self, path: &str) -> FirestoreResult<JsonValue> {
        self.handle(Method::GET, path, None)
    }

    async fn post(&self, path: &str, body: JsonValue) -> FirestoreResult<JsonValue> {
        self.handle(Method::POST, path, Some(body))
    }

    async fn patch(&self, path: &str, body: JsonValue) -> FirestoreResult<JsonValue> {
        self.handle(Method::PATCH, path, Some(body))
    }

    async fn delete(&self, path: &str) -> FirestoreResult<JsonValue> {
        self.handle(Method::DELETE, path, None)
    }
}

impl State {
    fn take_failure(&mut self, method: &Method, path: &str) -> Option<ApiError> {
        let index = self
            .failures
            .iter()
            .position(|failure| failure.method == *method && path.contains(&failure.path_fragment))?;
        let failure = self.failures.remove(index)?;
        Some(ApiError::new(
            failure.status_code,
            failure.body,
            path,
            format!("HTTP {}", failure.status_code),
        ))
    }

    fn get(&self, resource: &str, query: &[(String, String)], path: &str) -> FirestoreResult<JsonValue> {
        let segments = resource_segments(resource, path)?;
        if segments % 2 == 0 {
            let stored = self.documents.get(resource).ok_or_else(|| {
                rpc_error(404, "NOT_FOUND", format!("Document \"{resource}\" not found."), path)
            })?;
            return document_json(resource, stored);
        }

        let page_size = match query_value(query, "pageSize") {
            Some(value) => value.parse::<usize>().map_err(|_| {
                rpc_error(400, "INVALID_ARGUMENT", format!("Invalid pageSize {value}"), path)
            })?,
            None => DEFAULT_PAGE_SIZE,
        }
        .max(1);
        let offset = match query_value(query, "pageToken") {
            Some(token) => token.parse::<usize>().map_err(|_| {
                rpc_error(400, "INVALID_ARGUMENT", "Invalid page token", path)
            })?,
            None => 0,
        };

        let members: Vec<_> = self
            .documents
            .iter()
            .filter(|(name, _)| parent_path(name) == resource)
            .collect();
        let mut response = serde_json::Map::new();
        let page = members
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|(name, stored)| document_json(name, stored))
            .collect::<FirestoreResult<Vec<_>>>()?;
        if !page.is_empty() {
            response.insert("documents".to_string(), JsonValue::Array(page));
        }
        if offset + page_size < members.len() {
            response.insert(
                "nextPageToken".to_string(),
                JsonValue::String((offset + page_size).to_string()),
            );
        }
        Ok(JsonValue::Object(response))
    }

    fn create_document(
        &mut self,
        resource: &str,
        query: &[(String, String)],
        body: &JsonValue,
        encoder: &ValueEncoder,
        path: &str,
    ) -> FirestoreResult<JsonValue> {
        if resource_segments(resource, path)? % 2 == 0 {
            return Err(rpc_error(
                400,
                "INVALID_ARGUMENT",
                "Documents are created inside a collection",
                path,
            ));
        }
        let id = query_value(query, "documentId")
            .map(str::to_string)
            .unwrap_or_else(generate_auto_id);
        let name = format!("{resource}/{id}");
        if self.documents.contains_key(&name) {
            return Err(rpc_error(
                409,
                "ALREADY_EXISTS",
                format!("Document already exists: {name}"),
                path,
            ));
        }
        let fields = encoder.decode_document(body)?;
        let now = Timestamp::now();
        let stored = StoredDocument {
            fields,
            create_time: now,
            update_time: now,
        };
        let response = document_json(&name, &stored)?;
        self.documents.insert(name, stored);
        Ok(response)
    }

    fn patch_document(
        &mut self,
        resource: &str,
        query: &[(String, String)],
        body: &JsonValue,
        encoder: &ValueEncoder,
        path: &str,
    ) -> FirestoreResult<JsonValue> {
        document_segments(resource, path)?;
        let fields = encoder.decode_document(body)?;
        let mut mask = Vec::new();
        for (key, value) in query {
            if key != "updateMask.fieldPaths" {
                continue;
            }
            if value == "*" {
                mask.extend(fields.keys().map(|key| vec![key.to_string()]));
            } else {
                mask.push(FieldPath::from_dot_separated(value)?.segments().to_vec());
            }
        }
        let exists = match query_value(query, "currentDocument.exists") {
            Some(flag) => Some(flag == "true"),
            None => None,
        };
        let name = resource.to_string();
        let update = Update {
            name: &name,
            fields,
            mask: (!mask.is_empty()).then_some(mask),
            exists,
        };
        let now = Timestamp::now();
        apply_update(&mut self.documents, update, now, path)?;
        match self.documents.get(&name) {
            Some(stored) => document_json(&name, stored),
            None => Err(rpc_error(500, "INTERNAL", "Document vanished during update", path)),
        }
    }

    fn begin_transaction(&mut self) -> JsonValue {
        self.transaction_counter += 1;
        let id = format!("txn-{:08}", self.transaction_counter);
        self.transactions.insert(id.clone());
        log::debug!("in-memory transaction {id} begun");
        json!({ "transaction": id })
    }

    fn rollback(&mut self, body: &JsonValue, path: &str) -> FirestoreResult<JsonValue> {
        let id = body
            .get("transaction")
            .and_then(JsonValue::as_str)
            .unwrap_or_default();
        if !self.transactions.remove(id) {
            return Err(invalid_transaction(path));
        }
        Ok(json!({}))
    }

    fn commit(&mut self, body: &JsonValue, path: &str) -> FirestoreResult<JsonValue> {
        let transaction = body.get("transaction").and_then(JsonValue::as_str);
        if let Some(id) = transaction {
            if !self.transactions.contains(id) {
                return Err(invalid_transaction(path));
            }
        }

        let writes: &[JsonValue] = match body.get("writes") {
            Some(JsonValue::Array(writes)) => writes.as_slice(),
            Some(JsonValue::Null) | None => &[],
            Some(_) => {
                return Err(rpc_error(400, "INVALID_ARGUMENT", "'writes' must be an array", path))
            }
        };

        let encoder = ValueEncoder::new();
        let now = Timestamp::now();
        let commit_time = now.to_rfc3339()?;
        let mut staged = self.documents.clone();
        let mut results = Vec::with_capacity(writes.len());
        for write in writes {
            if let Some(name) = write.get("delete").and_then(JsonValue::as_str) {
                staged.remove(name);
            } else if let Some(update) = write.get("update") {
                let name = update
                    .get("name")
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| rpc_error(400, "INVALID_ARGUMENT", "Write is missing a name", path))?;
                document_segments(name, path)?;
                let mask = match write.get("updateMask").and_then(|mask| mask.get("fieldPaths")) {
                    Some(JsonValue::Array(paths)) => Some(
                        paths
                            .iter()
                            .map(|field| {
                                let text = field.as_str().unwrap_or_default();
                                FieldPath::from_dot_separated(text)
                                    .map(|parsed| parsed.segments().to_vec())
                            })
                            .collect::<FirestoreResult<Vec<_>>>()?,
                    ),
                    _ => None,
                };
                let exists = write
                    .get("currentDocument")
                    .and_then(|precondition| precondition.get("exists"))
                    .and_then(JsonValue::as_bool);
                let update = Update {
                    name,
                    fields: encoder.decode_document(update)?,
                    mask,
                    exists,
                };
                apply_update(&mut staged, update, now, path)?;
            } else {
                return Err(rpc_error(
                    400,
                    "INVALID_ARGUMENT",
                    "Write must carry 'update' or 'delete'",
                    path,
                ));
            }
            results.push(json!({ "updateTime": commit_time }));
        }

        self.documents = staged;
        if let Some(id) = transaction {
            self.transactions.remove(id);
        }
        Ok(json!({
            "commitTime": commit_time,
            "writeResults": results,
        }))
    }

    fn run_query(&self, parent: Option<&str>, body: &JsonValue, path: &str) -> FirestoreResult<JsonValue> {
        if let Some(id) = body.get("transaction").and_then(JsonValue::as_str) {
            if !self.transactions.contains(id) {
                return Err(invalid_transaction(path));
            }
        }
        let query = body
            .get("structuredQuery")
            .ok_or_else(|| rpc_error(400, "INVALID_ARGUMENT", "Missing structuredQuery", path))?;
        let encoder = ValueEncoder::new();
        let selectors = query
            .get("from")
            .and_then(JsonValue::as_array)
            .cloned()
            .unwrap_or_default();
        let filter = match query.get("where") {
            Some(filter) => Some(Filter::parse(filter, &encoder, path)?),
            None => None,
        };
        let orders = parse_orders(query.get("orderBy"))?;

        let mut matches: Vec<(&String, &StoredDocument)> = self
            .documents
            .iter()
            .filter(|(name, _)| in_scope(name, parent, &selectors))
            .filter(|(name, stored)| {
                filter
                    .as_ref()
                    .map_or(true, |filter| filter.matches(name, &stored.fields))
            })
            .filter(|(name, stored)| {
                orders
                    .iter()
                    .all(|order| field_value(name, &stored.fields, &order.field).is_some())
            })
            .collect();

        matches.sort_by(|(left_name, left), (right_name, right)| {
            for order in &orders {
                let left_value = field_value(left_name, &left.fields, &order.field);
                let right_value = field_value(right_name, &right.fields, &order.field);
                let mut ordering = match (left_value, right_value) {
                    (Some(a), Some(b)) => compare_values(&a, &b).unwrap_or(Ordering::Equal),
                    _ => Ordering::Equal,
                };
                if order.descending {
                    ordering = ordering.reverse();
                }
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            left_name.cmp(right_name)
        });

        if let Some(cursor) = Cursor::parse(query.get("startAt"), &encoder)? {
            matches.retain(|(name, stored)| {
                let ordering = cursor.compare(name, &stored.fields, &orders);
                if cursor.before {
                    ordering != Ordering::Less
                } else {
                    ordering == Ordering::Greater
                }
            });
        }
        if let Some(cursor) = Cursor::parse(query.get("endAt"), &encoder)? {
            matches.retain(|(name, stored)| {
                let ordering = cursor.compare(name, &stored.fields, &orders);
                if cursor.before {
                    ordering == Ordering::Less
                } else {
                    ordering != Ordering::Greater
                }
            });
        }

        let offset = query.get("offset").and_then(JsonValue::as_u64).unwrap_or(0) as usize;
        let limit = query
            .get("limit")
            .and_then(|limit| limit.as_u64().or_else(|| limit.get("value").and_then(JsonValue::as_u64)))
            .map(|limit| limit as usize)
            .unwrap_or(usize::MAX);

        let read_time = Timestamp::now().to_rfc3339()?;
        let mut entries = matches
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(name, stored)| {
                Ok(json!({
                    "document": document_json(name, stored)?,
                    "readTime": read_time,
                }))
            })
            .collect::<FirestoreResult<Vec<_>>>()?;
        if entries.is_empty() {
            entries.push(json!({ "readTime": read_time }));
        }
        Ok(JsonValue::Array(entries))
    }
}

struct Update<'a> {
    name: &'a str,
    fields: MapValue,
    mask: Option<Vec<Vec<String>>>,
    exists: Option<bool>,
}

fn apply_update(
    documents: &mut BTreeMap<String, StoredDocument>,
    update: Update<'_>,
    now: Timestamp,
    path: &str,
) -> FirestoreResult<()> {
    let existing = documents.get(update.name);
    match (update.exists, existing) {
        (Some(true), None) => {
            return Err(rpc_error(
                404,
                "NOT_FOUND",
                format!("No document to update: {}", update.name),
                path,
            ))
        }
        (Some(false), Some(_)) => {
            return Err(rpc_error(
                409,
                "ALREADY_EXISTS",
                format!("Document already exists: {}", update.name),
                path,
            ))
        }
        _ => {}
    }

    let create_time = existing.map(|stored| stored.create_time).unwrap_or(now);
    let fields = match update.mask {
        None => update.fields,
        Some(mask) => {
            let mut merged = existing
                .map(|stored| stored.fields.fields().clone())
                .unwrap_or_default();
            for segments in &mask {
                match lookup(&update.fields, segments) {
                    Some(value) => set_at(&mut merged, segments, value.clone()),
                    None => remove_at(&mut merged, segments),
                }
            }
            MapValue::new(merged)
        }
    };
    documents.insert(
        update.name.to_string(),
        StoredDocument {
            fields,
            create_time,
            update_time: now,
        },
    );
    Ok(())
}

fn lookup<'a>(map: &'a MapValue, segments: &[String]) -> Option<&'a FirestoreValue> {
    let (first, rest) = segments.split_first()?;
    let value = map.get(first)?;
    if rest.is_empty() {
        Some(value)
    } else {
        lookup(value.as_map()?, rest)
    }
}

fn set_at(fields: &mut IndexMap<String, FirestoreValue>, segments: &[String], value: FirestoreValue) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        fields.insert(first.clone(), value);
        return;
    }
    let mut child = fields
        .get(first)
        .and_then(FirestoreValue::as_map)
        .map(|map| map.fields().clone())
        .unwrap_or_default();
    set_at(&mut child, rest, value);
    fields.insert(first.clone(), FirestoreValue::from_map(child));
}

fn remove_at(fields: &mut IndexMap<String, FirestoreValue>, segments: &[String]) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        fields.shift_remove(first);
        return;
    }
    if let Some(map) = fields.get(first).and_then(FirestoreValue::as_map) {
        let mut child = map.fields().clone();
        remove_at(&mut child, rest);
        fields.insert(first.clone(), FirestoreValue::from_map(child));
    }
}

fn field_value(name: &str, fields: &MapValue, field: &[String]) -> Option<FirestoreValue> {
    if field.len() == 1 && field[0] == DOCUMENT_NAME_FIELD {
        return Some(FirestoreValue::from_reference(name));
    }
    lookup(fields, field).cloned()
}

fn in_scope(name: &str, parent: Option<&str>, selectors: &[JsonValue]) -> bool {
    let collection = parent_path(name);
    let collection_id = last_segment(collection);
    let owner = parent_path(collection);
    if selectors.is_empty() {
        return parent.map_or(true, |parent| owner == parent);
    }
    selectors.iter().any(|selector| {
        if selector.get("collectionId").and_then(JsonValue::as_str) != Some(collection_id) {
            return false;
        }
        let all_descendants = selector
            .get("allDescendants")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);
        match (parent, all_descendants) {
            (Some(parent), true) => owner == parent || owner.starts_with(&format!("{parent}/")),
            (Some(parent), false) => owner == parent,
            (None, true) => true,
            (None, false) => owner.ends_with("/documents"),
        }
    })
}

enum Filter {
    Field {
        field: Vec<String>,
        op: String,
        value: FirestoreValue,
    },
    Composite {
        any: bool,
        filters: Vec<Filter>,
    },
}

impl Filter {
    fn parse(json: &JsonValue, encoder: &ValueEncoder, path: &str) -> FirestoreResult<Self> {
        if let Some(field_filter) = json.get("fieldFilter") {
            let field = field_filter
                .get("field")
                .and_then(|field| field.get("fieldPath"))
                .and_then(JsonValue::as_str)
                .ok_or_else(|| rpc_error(400, "INVALID_ARGUMENT", "fieldFilter needs a fieldPath", path))?;
            let op = field_filter
                .get("op")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string();
            let value = match field_filter.get("value") {
                Some(value) => encoder.decode_json(value)?,
                None => FirestoreValue::null(),
            };
            if !matches!(
                op.as_str(),
                "EQUAL"
                    | "NOT_EQUAL"
                    | "LESS_THAN"
                    | "LESS_THAN_OR_EQUAL"
                    | "GREATER_THAN"
                    | "GREATER_THAN_OR_EQUAL"
                    | "ARRAY_CONTAINS"
                    | "ARRAY_CONTAINS_ANY"
                    | "IN"
                    | "NOT_IN"
            ) {
                return Err(rpc_error(
                    400,
                    "INVALID_ARGUMENT",
                    format!("Unsupported filter operator {op}"),
                    path,
                ));
            }
            return Ok(Filter::Field {
                field: FieldPath::from_dot_separated(field)?.segments().to_vec(),
                op,
                value,
            });
        }
        if let Some(composite) = json.get("compositeFilter") {
            let any = composite.get("op").and_then(JsonValue::as_str) == Some("OR");
            let filters = composite
                .get("filters")
                .and_then(JsonValue::as_array)
                .map(|filters| {
                    filters
                        .iter()
                        .map(|filter| Filter::parse(filter, encoder, path))
                        .collect::<FirestoreResult<Vec<_>>>()
                })
                .transpose()?
                .unwrap_or_default();
            return Ok(Filter::Composite { any, filters });
        }
        Err(rpc_error(400, "INVALID_ARGUMENT", "Unsupported filter", path))
    }

    fn matches(&self, name: &str, fields: &MapValue) -> bool {
        match self {
            Filter::Composite { any: true, filters } => {
                filters.iter().any(|filter| filter.matches(name, fields))
            }
            Filter::Composite { any: false, filters } => {
                filters.iter().all(|filter| filter.matches(name, fields))
            }
            Filter::Field { field, op, value } => match field_value(name, fields, field) {
                Some(actual) => evaluate(op, &actual, value),
                None => false,
            },
        }
    }
}

fn evaluate(op: &str, actual: &FirestoreValue, expected: &FirestoreValue) -> bool {
    match op {
        "EQUAL" => actual == expected,
        "NOT_EQUAL" => !actual.is_null() && actual != expected,
        "LESS_THAN" => compare_values(actual, expected) == Some(Ordering::Less),
        "LESS_THAN_OR_EQUAL" => matches!(
            compare_values(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        "GREATER_THAN" => compare_values(actual, expected) == Some(Ordering::Greater),
        "GREATER_THAN_OR_EQUAL" => matches!(
            compare_values(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        "ARRAY_CONTAINS" => match actual.kind() {
            ValueKind::Array(array) => array_contains(array, expected),
            _ => false,
        },
        "ARRAY_CONTAINS_ANY" => match (actual.kind(), expected.kind()) {
            (ValueKind::Array(array), ValueKind::Array(needles)) => needles
                .values()
                .iter()
                .any(|needle| array_contains(array, needle)),
            _ => false,
        },
        "IN" => match expected.kind() {
            ValueKind::Array(values) => values.values().iter().any(|candidate| candidate == actual),
            _ => false,
        },
        "NOT_IN" => match expected.kind() {
            ValueKind::Array(values) => {
                !actual.is_null() && values.values().iter().all(|candidate| candidate != actual)
            }
            _ => false,
        },
        _ => false,
    }
}

fn compare_values(left: &FirestoreValue, right: &FirestoreValue) -> Option<Ordering> {
    match (left.kind(), right.kind()) {
        (ValueKind::Null, ValueKind::Null) => Some(Ordering::Equal),
        (ValueKind::Boolean(a), ValueKind::Boolean(b)) => Some(a.cmp(b)),
        (ValueKind::Integer(a), ValueKind::Integer(b)) => Some(a.cmp(b)),
        (ValueKind::Double(a), ValueKind::Double(b)) => a.partial_cmp(b),
        (ValueKind::Integer(a), ValueKind::Double(b)) => (*a as f64).partial_cmp(b),
        (ValueKind::Double(a), ValueKind::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (ValueKind::String(a), ValueKind::String(b)) => Some(a.cmp(b)),
        (ValueKind::Timestamp(a), ValueKind::Timestamp(b)) => Some(a.cmp(b)),
        (ValueKind::Reference(a), ValueKind::Reference(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn array_contains(array: &ArrayValue, needle: &FirestoreValue) -> bool {
    array.values().iter().any(|candidate| candidate == needle)
}

struct Order {
    field: Vec<String>,
    descending: bool,
}

fn parse_orders(json: Option<&JsonValue>) -> FirestoreResult<Vec<Order>> {
    let Some(JsonValue::Array(entries)) = json else {
        return Ok(Vec::new());
    };
    entries
        .iter()
        .map(|entry| {
            let field = entry
                .get("field")
                .and_then(|field| field.get("fieldPath"))
                .and_then(JsonValue::as_str)
                .unwrap_or(DOCUMENT_NAME_FIELD);
            Ok(Order {
                field: FieldPath::from_dot_separated(field)?.segments().to_vec(),
                descending: entry.get("direction").and_then(JsonValue::as_str) == Some("DESCENDING"),
            })
        })
        .collect()
}

struct Cursor {
    values: Vec<FirestoreValue>,
    before: bool,
}

impl Cursor {
    fn parse(json: Option<&JsonValue>, encoder: &ValueEncoder) -> FirestoreResult<Option<Self>> {
        let Some(json) = json else {
            return Ok(None);
        };
        let values = json
            .get("values")
            .and_then(JsonValue::as_array)
            .map(|values| {
                values
                    .iter()
                    .map(|value| encoder.decode_json(value))
                    .collect::<FirestoreResult<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();
        let before = json.get("before").and_then(JsonValue::as_bool).unwrap_or(false);
        Ok(Some(Self { values, before }))
    }

    /// Position of the document relative to the cursor in result order.
    fn compare(&self, name: &str, fields: &MapValue, orders: &[Order]) -> Ordering {
        for (order, bound) in orders.iter().zip(&self.values) {
            let actual = field_value(name, fields, &order.field).unwrap_or_else(FirestoreValue::null);
            let mut ordering = compare_values(&actual, bound).unwrap_or(Ordering::Equal);
            if order.descending {
                ordering = ordering.reverse();
            }
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

fn document_json(name: &str, stored: &StoredDocument) -> FirestoreResult<JsonValue> {
    let mut document = ValueEncoder::new().encode_document(&stored.fields)?;
    if let JsonValue::Object(object) = &mut document {
        object.insert("name".to_string(), JsonValue::String(name.to_string()));
        object.insert(
            "createTime".to_string(),
            JsonValue::String(stored.create_time.to_rfc3339()?),
        );
        object.insert(
            "updateTime".to_string(),
            JsonValue::String(stored.update_time.to_rfc3339()?),
        );
    }
    Ok(document)
}

fn split_query(path: &str) -> (&str, Vec<(String, String)>) {
    let (resource, query) = match path.split_once('?') {
        Some((resource, query)) => (resource, query),
        None => (path, ""),
    };
    let resource = resource.trim_start_matches('/');
    let resource = resource.strip_prefix("v1/").unwrap_or(resource);
    let pairs = url::form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    (resource, pairs)
}

fn query_value<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(candidate, _)| candidate == key)
        .map(|(_, value)| value.as_str())
}

fn classify(resource: &str) -> Target<'_> {
    if let Some(method) = resource.strip_prefix("v1:") {
        return Target::Rpc {
            parent: None,
            method,
        };
    }
    match resource.rsplit_once(':') {
        Some((parent, method)) if RPC_METHODS.contains(&method) => Target::Rpc {
            parent: Some(parent),
            method,
        },
        _ => Target::Resource(resource),
    }
}

/// Number of segments below `.../documents`; fails for names outside a database.
fn resource_segments(resource: &str, path: &str) -> FirestoreResult<usize> {
    let segments: Vec<&str> = resource.split('/').collect();
    let valid = segments.len() > 5
        && segments[0] == "projects"
        && segments[2] == "databases"
        && segments[4] == "documents"
        && segments.iter().all(|segment| !segment.is_empty());
    if valid {
        Ok(segments.len() - 5)
    } else {
        Err(rpc_error(
            400,
            "INVALID_ARGUMENT",
            format!("Invalid resource name \"{resource}\""),
            path,
        ))
    }
}

fn document_segments(resource: &str, path: &str) -> FirestoreResult<usize> {
    let segments = resource_segments(resource, path)?;
    if segments % 2 == 0 {
        Ok(segments)
    } else {
        Err(rpc_error(
            400,
            "INVALID_ARGUMENT",
            format!("\"{resource}\" is not a document name"),
            path,
        ))
    }
}

fn invalid_transaction(path: &str) -> FirestoreError {
    rpc_error(
        400,
        "INVALID_ARGUMENT",
        "Transaction is invalid or has already been finalized",
        path,
    )
}

fn rpc_error(status_code: u16, status: &str, message: impl Into<String>, path: &str) -> FirestoreError {
    let message = message.into();
    ApiError::new(
        status_code,
        json!({
            "error": {
                "code": status_code,
                "message": message,
                "status": status,
            }
        }),
        path,
        message,
    )
    .into()
}
