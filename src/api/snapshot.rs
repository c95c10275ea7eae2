use serde_json::Value as JsonValue;

use crate::error::{internal_error, FirestoreResult};
use crate::model::{FieldPath, Timestamp};
use crate::value::{FirestoreValue, MapValue};

use super::reference::DocumentReference;
use super::Firestore;

/// A document read from the server, with its fields decoded.
#[derive(Clone, Debug)]
pub struct DocumentSnapshot {
    reference: DocumentReference,
    data: MapValue,
    create_time: Option<Timestamp>,
    update_time: Option<Timestamp>,
}

impl DocumentSnapshot {
    pub fn new(reference: DocumentReference, data: MapValue) -> Self {
        Self {
            reference,
            data,
            create_time: None,
            update_time: None,
        }
    }

    /// Decodes a REST `Document` resource (`name`, `fields`, timestamps).
    pub(crate) fn from_document_json(firestore: &Firestore, document: &JsonValue) -> FirestoreResult<Self> {
        let name = document
            .get("name")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| internal_error("Document response is missing its name"))?;
        let reference = DocumentReference::from_path(firestore.clone(), name)?;
        let data = firestore.serializer().encoder().decode_document(document)?;
        Ok(Self {
            reference,
            data,
            create_time: timestamp_field(document, "createTime")?,
            update_time: timestamp_field(document, "updateTime")?,
        })
    }

    pub fn id(&self) -> &str {
        self.reference.id()
    }

    /// Fully-qualified document path.
    pub fn path(&self) -> &str {
        self.reference.path()
    }

    pub fn reference(&self) -> &DocumentReference {
        &self.reference
    }

    pub fn data(&self) -> &MapValue {
        &self.data
    }

    pub fn into_data(self) -> MapValue {
        self.data
    }

    /// Looks up a possibly nested field by its dot-separated path.
    pub fn get(&self, field: &str) -> Option<&FirestoreValue> {
        let path = FieldPath::from_dot_separated(field).ok()?;
        let (last, parents) = path.segments().split_last()?;
        let mut map = &self.data;
        for segment in parents {
            map = map.get(segment)?.as_map()?;
        }
        map.get(last)
    }

    pub fn create_time(&self) -> Option<Timestamp> {
        self.create_time
    }

    pub fn update_time(&self) -> Option<Timestamp> {
        self.update_time
    }
}

/// One page of [`CollectionReference::list_documents`](super::CollectionReference::list_documents).
#[derive(Clone, Debug, Default)]
pub struct DocumentPage {
    pub documents: Vec<DocumentSnapshot>,
    /// Token for the following page; `None` on the last page.
    pub next_page_token: Option<String>,
}

fn timestamp_field(document: &JsonValue, key: &str) -> FirestoreResult<Option<Timestamp>> {
    match document.get(key).and_then(JsonValue::as_str) {
        Some(text) => Timestamp::parse_rfc3339(text).map(Some),
        None => Ok(None),
    }
}
