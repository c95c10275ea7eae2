use std::fmt::{Display, Formatter};

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::Value as JsonValue;

use crate::error::{document_not_found, invalid_argument, FirestoreError, FirestoreResult};
use crate::model::path::{last_segment, parent_path, relative_path};
use crate::model::{build_field_mask, generate_auto_id, resolve_document_path, FieldPath};
use crate::value::{FirestoreValue, MapValue};

use super::database::Firestore;
use super::query::Query;
use super::snapshot::{DocumentPage, DocumentSnapshot};

#[derive(Clone, Debug)]
pub struct CollectionReference {
    firestore: Firestore,
    path: String,
}

impl CollectionReference {
    pub(crate) fn new(firestore: Firestore, path: &str) -> FirestoreResult<Self> {
        let path = firestore.collection_path(path);
        let relative = relative_path(&firestore.base_path(), &path);
        validate_segments(relative)?;
        if relative.split('/').count() % 2 == 0 {
            return Err(invalid_argument(format!(
                "Collection references must point to a collection (odd number of segments): {relative}"
            )));
        }
        Ok(Self { firestore, path })
    }

    pub fn firestore(&self) -> &Firestore {
        &self.firestore
    }

    /// The last segment of the collection path.
    pub fn id(&self) -> &str {
        last_segment(&self.path)
    }

    /// Fully-qualified collection path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Collection path relative to the documents root (`users/ada/posts`).
    pub fn relative_path(&self) -> String {
        relative_path(&self.firestore.base_path(), &self.path).to_string()
    }

    /// The document containing this collection, for subcollections.
    pub fn parent(&self) -> Option<DocumentReference> {
        let parent = parent_path(&self.path);
        if parent == self.firestore.base_path() {
            return None;
        }
        DocumentReference::from_path(self.firestore.clone(), parent).ok()
    }

    pub fn document(&self, id: &str) -> FirestoreResult<DocumentReference> {
        DocumentReference::new(self.firestore.clone(), &self.relative_path(), id)
    }

    /// Creates a document holding `data`, under `id` or a generated 20
    /// character id.
    pub async fn add(
        &self,
        data: impl Into<MapValue>,
        id: Option<&str>,
    ) -> FirestoreResult<DocumentReference> {
        let id = id.map(str::to_string).unwrap_or_else(generate_auto_id);
        let document = self.document(&id)?;
        document.set(data, false).await?;
        Ok(document)
    }

    /// Lists one page of the collection's documents.
    pub async fn list_documents(
        &self,
        page_size: usize,
        page_token: Option<&str>,
    ) -> FirestoreResult<DocumentPage> {
        let mut request = format!("{}?pageSize={page_size}", self.path);
        if let Some(token) = page_token {
            request.push_str("&pageToken=");
            request.extend(utf8_percent_encode(token, NON_ALPHANUMERIC));
        }
        let response = self.firestore.datastore().get(&request).await?;

        let mut page = DocumentPage {
            documents: Vec::new(),
            next_page_token: response
                .get("nextPageToken")
                .and_then(JsonValue::as_str)
                .filter(|token| !token.is_empty())
                .map(str::to_string),
        };
        if let Some(documents) = response.get("documents").and_then(JsonValue::as_array) {
            for document in documents {
                if document.get("name").is_none() {
                    log::warn!("skipping listed document without a name in {}", self.path);
                    continue;
                }
                page.documents
                    .push(DocumentSnapshot::from_document_json(&self.firestore, document)?);
            }
        }
        Ok(page)
    }

    pub fn query(&self) -> Query {
        Query::new(self.clone())
    }
}

impl Display for CollectionReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CollectionReference({})", self.path)
    }
}

#[derive(Clone, Debug)]
pub struct DocumentReference {
    firestore: Firestore,
    collection: String,
    id: String,
    path: String,
}

impl DocumentReference {
    pub(crate) fn new(firestore: Firestore, collection: &str, id: &str) -> FirestoreResult<Self> {
        if id.is_empty() || id.contains('/') {
            return Err(invalid_argument(format!("Invalid document id \"{id}\"")));
        }
        let base_path = firestore.base_path();
        let path = resolve_document_path(&base_path, collection, id);
        let collection = relative_path(&base_path, parent_path(&path)).to_string();
        validate_segments(&collection)?;
        if collection.split('/').count() % 2 == 0 {
            return Err(invalid_argument(format!(
                "Document references must live in a collection (odd number of segments): {collection}"
            )));
        }
        Ok(Self {
            firestore,
            collection,
            id: id.to_string(),
            path,
        })
    }

    /// Builds a reference from a document path, absolute or relative.
    pub(crate) fn from_path(firestore: Firestore, path: &str) -> FirestoreResult<Self> {
        let relative = relative_path(&firestore.base_path(), path).trim_matches('/').to_string();
        match relative.rsplit_once('/') {
            Some((collection, id)) => Self::new(firestore, collection, id),
            None => Err(invalid_argument(format!("\"{path}\" is not a document path"))),
        }
    }

    pub fn firestore(&self) -> &Firestore {
        &self.firestore
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Fully-qualified document path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path of the containing collection, relative to the documents root.
    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn parent(&self) -> FirestoreResult<CollectionReference> {
        CollectionReference::new(self.firestore.clone(), &self.collection)
    }

    /// A subcollection rooted at this document.
    pub fn collection(&self, collection_id: &str) -> FirestoreResult<CollectionReference> {
        CollectionReference::new(
            self.firestore.clone(),
            &format!("{}/{}/{}", self.collection, self.id, collection_id.trim_matches('/')),
        )
    }

    /// Reads the document; a missing document is a `DocumentNotFound` error.
    pub async fn get(&self) -> FirestoreResult<DocumentSnapshot> {
        let response = self
            .firestore
            .datastore()
            .get(&self.path)
            .await
            .map_err(|err| self.not_found_or(err))?;
        DocumentSnapshot::from_document_json(&self.firestore, &response)
    }

    pub async fn exists(&self) -> FirestoreResult<bool> {
        match self.get().await {
            Ok(_) => Ok(true),
            Err(FirestoreError::DocumentNotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Writes `data` to the document.
    ///
    /// With `merge` only the top-level keys of `data` are written; otherwise
    /// the document is created and fails if it already exists.
    pub async fn set(&self, data: impl Into<MapValue>, merge: bool) -> FirestoreResult<DocumentSnapshot> {
        let body = self.firestore.serializer().encoder().encode_document(&data.into())?;
        let response = if merge {
            let request = format!("{}?updateMask.fieldPaths=*", self.path);
            self.firestore.datastore().patch(&request, body).await?
        } else {
            let request = format!(
                "{}?documentId={}",
                parent_path(&self.path),
                utf8_percent_encode(&self.id, NON_ALPHANUMERIC)
            );
            self.firestore.datastore().post(&request, body).await?
        };
        DocumentSnapshot::from_document_json(&self.firestore, &response)
    }

    /// Writes only the fields named by the keys of `data`; dotted keys
    /// address nested fields.
    pub async fn update_fields(&self, data: impl Into<MapValue>) -> FirestoreResult<DocumentSnapshot> {
        let data = data.into();
        let mask = build_field_mask(data.keys())?;
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for field_path in &mask {
            query.append_pair("updateMask.fieldPaths", field_path);
        }
        let request = format!("{}?{}", self.path, query.finish());
        let body = self.firestore.serializer().encoder().encode_document(&expand_dotted(data))?;
        let response = self
            .firestore
            .datastore()
            .patch(&request, body)
            .await
            .map_err(|err| self.not_found_or(err))?;
        DocumentSnapshot::from_document_json(&self.firestore, &response)
    }

    pub async fn delete(&self) -> FirestoreResult<()> {
        self.firestore.datastore().delete(&self.path).await?;
        Ok(())
    }

    fn not_found_or(&self, err: FirestoreError) -> FirestoreError {
        match err.as_api() {
            Some(api) if api.is_not_found() => document_not_found(&self.collection, &self.id),
            _ => err,
        }
    }
}

impl Display for DocumentReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DocumentReference({})", self.path)
    }
}

impl PartialEq for DocumentReference {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

/// Nests `{"a.b": 1}` as `{"a": {"b": 1}}` so the body matches the mask.
fn expand_dotted(data: MapValue) -> MapValue {
    let mut expanded = MapValue::default();
    for (key, value) in data.into_fields() {
        let segments = match FieldPath::from_dot_separated(&key) {
            Ok(path) => path.segments().to_vec(),
            Err(_) => vec![key],
        };
        insert_nested(&mut expanded, &segments, value);
    }
    expanded
}

fn insert_nested(map: &mut MapValue, segments: &[String], value: FirestoreValue) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.insert(first.clone(), value);
        return;
    }
    let mut child = map
        .get(first)
        .and_then(|existing| existing.as_map())
        .cloned()
        .unwrap_or_default();
    insert_nested(&mut child, rest, value);
    map.insert(first.clone(), child.into());
}

fn validate_segments(relative: &str) -> FirestoreResult<()> {
    if relative.is_empty() || relative.split('/').any(str::is_empty) {
        return Err(invalid_argument(format!("Invalid path \"{relative}\"")));
    }
    Ok(())
}
