use serde_json::{json, Map, Value as JsonValue};

use crate::error::{invalid_argument, FirestoreResult};
use crate::model::path::parent_path;
use crate::model::FieldPath;
use crate::value::{FirestoreValue, IntoFirestoreValue};

use super::reference::CollectionReference;
use super::snapshot::DocumentSnapshot;

/// Comparison operators accepted by [`Query::where_field`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayContains,
    ArrayContainsAny,
    In,
    NotIn,
}

impl FilterOperator {
    /// Parses the textual form (`"=="`, `"<="`, `"array-contains"`, ...).
    pub fn parse(operator: &str) -> FirestoreResult<Self> {
        Ok(match operator {
            "==" => FilterOperator::Equal,
            "!=" => FilterOperator::NotEqual,
            "<" => FilterOperator::LessThan,
            "<=" => FilterOperator::LessThanOrEqual,
            ">" => FilterOperator::GreaterThan,
            ">=" => FilterOperator::GreaterThanOrEqual,
            "array-contains" => FilterOperator::ArrayContains,
            "array-contains-any" => FilterOperator::ArrayContainsAny,
            "in" => FilterOperator::In,
            "not-in" => FilterOperator::NotIn,
            other => {
                return Err(invalid_argument(format!("Operator {other} is not supported")))
            }
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equal => "EQUAL",
            FilterOperator::NotEqual => "NOT_EQUAL",
            FilterOperator::LessThan => "LESS_THAN",
            FilterOperator::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            FilterOperator::GreaterThan => "GREATER_THAN",
            FilterOperator::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
            FilterOperator::ArrayContains => "ARRAY_CONTAINS",
            FilterOperator::ArrayContainsAny => "ARRAY_CONTAINS_ANY",
            FilterOperator::In => "IN",
            FilterOperator::NotIn => "NOT_IN",
        }
    }
}

/// A structured query over a single collection.
///
/// Filters are combined with `AND`. Paging is offset based: after a full
/// page ([`Query::limit`] documents) [`Query::next_page`] fetches the
/// following one.
#[derive(Clone, Debug)]
pub struct Query {
    collection: CollectionReference,
    filters: Vec<JsonValue>,
    orders: Vec<JsonValue>,
    limit: Option<u32>,
    offset: u32,
    start_at: Option<JsonValue>,
    end_at: Option<JsonValue>,
    last_page_full: bool,
}

impl Query {
    pub(crate) fn new(collection: CollectionReference) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: 0,
            start_at: None,
            end_at: None,
            last_page_full: false,
        }
    }

    pub fn collection(&self) -> &CollectionReference {
        &self.collection
    }

    pub fn where_field(
        mut self,
        field: &str,
        operator: &str,
        value: impl IntoFirestoreValue,
    ) -> FirestoreResult<Self> {
        let operator = FilterOperator::parse(operator)?;
        let field = FieldPath::from_dot_separated(field)?.canonical_string();
        let value = self.encode(&value.into_firestore_value())?;
        self.filters.push(json!({
            "fieldFilter": {
                "field": { "fieldPath": field },
                "op": operator.as_str(),
                "value": value,
            }
        }));
        Ok(self)
    }

    /// Orders by `field`; `direction` is `"asc"` or `"desc"` (case-insensitive).
    pub fn order_by(mut self, field: &str, direction: &str) -> FirestoreResult<Self> {
        let direction = if direction.eq_ignore_ascii_case("desc") {
            "DESCENDING"
        } else if direction.eq_ignore_ascii_case("asc") {
            "ASCENDING"
        } else {
            return Err(invalid_argument(format!("Unknown sort direction {direction}")));
        };
        let field = FieldPath::from_dot_separated(field)?.canonical_string();
        self.orders.push(json!({
            "field": { "fieldPath": field },
            "direction": direction,
        }));
        Ok(self)
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Starts the results at the cursor `values`, matched against the
    /// `order_by` fields. With `before` the cursor position itself is included.
    pub fn start_at(mut self, values: Vec<FirestoreValue>, before: bool) -> FirestoreResult<Self> {
        self.start_at = Some(self.cursor(&values, before)?);
        Ok(self)
    }

    /// Ends the results at the cursor `values`. With `before` the results
    /// stop just ahead of the cursor position.
    pub fn end_at(mut self, values: Vec<FirestoreValue>, before: bool) -> FirestoreResult<Self> {
        self.end_at = Some(self.cursor(&values, before)?);
        Ok(self)
    }

    /// The `structuredQuery` JSON sent to `runQuery`.
    pub fn structured_query(&self) -> JsonValue {
        let mut query = Map::new();
        query.insert(
            "from".to_string(),
            json!([ { "collectionId": self.collection.id() } ]),
        );
        if !self.filters.is_empty() {
            query.insert(
                "where".to_string(),
                json!({
                    "compositeFilter": {
                        "op": "AND",
                        "filters": self.filters,
                    }
                }),
            );
        }
        if !self.orders.is_empty() {
            query.insert("orderBy".to_string(), JsonValue::Array(self.orders.clone()));
        }
        if let Some(cursor) = &self.start_at {
            query.insert("startAt".to_string(), cursor.clone());
        }
        if let Some(cursor) = &self.end_at {
            query.insert("endAt".to_string(), cursor.clone());
        }
        if self.offset > 0 {
            query.insert("offset".to_string(), json!(self.offset));
        }
        if let Some(limit) = self.limit {
            query.insert("limit".to_string(), json!(limit));
        }
        JsonValue::Object(query)
    }

    /// Runs the query and decodes every returned document.
    pub async fn get(&mut self) -> FirestoreResult<Vec<DocumentSnapshot>> {
        let firestore = self.collection.firestore();
        let request = format!("{}:runQuery", parent_path(self.collection.path()));
        let body = json!({ "structuredQuery": self.structured_query() });
        let response = firestore.datastore().post(&request, body).await?;
        let documents = firestore
            .serializer()
            .run_query_documents(&response)
            .into_iter()
            .map(|document| DocumentSnapshot::from_document_json(firestore, document))
            .collect::<FirestoreResult<Vec<_>>>()?;
        self.last_page_full = self
            .limit
            .map_or(false, |limit| limit > 0 && documents.len() == limit as usize);
        Ok(documents)
    }

    pub fn has_next_page(&self) -> bool {
        self.last_page_full
    }

    /// Fetches the page after the last one returned; empty when there is none.
    pub async fn next_page(&mut self) -> FirestoreResult<Vec<DocumentSnapshot>> {
        if !self.has_next_page() {
            return Ok(Vec::new());
        }
        self.advance_offset();
        self.get().await
    }

    fn advance_offset(&mut self) {
        if let Some(limit) = self.limit {
            self.offset = self.offset.saturating_add(limit);
        }
    }

    fn encode(&self, value: &FirestoreValue) -> FirestoreResult<JsonValue> {
        self.collection
            .firestore()
            .serializer()
            .encoder()
            .encode_json(value)
    }

    fn cursor(&self, values: &[FirestoreValue], before: bool) -> FirestoreResult<JsonValue> {
        let values = values
            .iter()
            .map(|value| self.encode(value))
            .collect::<FirestoreResult<Vec<_>>>()?;
        Ok(json!({ "values": values, "before": before }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Firestore;
    use crate::model::DatabaseId;
    use crate::remote::InMemoryDatastore;
    use crate::value::MapValue;

    const BASE: &str = "projects/demo/databases/(default)/documents";

    fn seeded() -> (Firestore, InMemoryDatastore) {
        let datastore = InMemoryDatastore::new();
        for (id, state, population) in [
            ("sf", "CA", 870),
            ("la", "CA", 3900),
            ("sd", "CA", 1400),
            ("ny", "NY", 8400),
            ("bf", "NY", 270),
        ] {
            datastore.insert_document(
                format!("{BASE}/cities/{id}"),
                MapValue::default()
                    .with("state", state)
                    .with("population", population),
            );
        }
        let firestore = Firestore::with_datastore(DatabaseId::default("demo"), datastore.clone());
        (firestore, datastore)
    }

    fn ids(documents: &[DocumentSnapshot]) -> Vec<&str> {
        documents.iter().map(DocumentSnapshot::id).collect()
    }

    #[test]
    fn paging_offset_saturates_instead_of_overflowing() {
        let (firestore, _) = seeded();
        let mut query = firestore
            .collection("cities")
            .unwrap()
            .query()
            .offset(u32::MAX - 1)
            .limit(5);
        query.advance_offset();
        assert_eq!(query.offset, u32::MAX);
        query.advance_offset();
        assert_eq!(query.structured_query()["offset"], u32::MAX);
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let (firestore, _) = seeded();
        let err = firestore
            .collection("cities")
            .unwrap()
            .query()
            .where_field("state", "~=", "CA")
            .unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }

    #[test]
    fn builds_structured_query() {
        let (firestore, _) = seeded();
        let query = firestore
            .collection("cities")
            .unwrap()
            .query()
            .where_field("state", "==", "CA")
            .unwrap()
            .order_by("population", "desc")
            .unwrap()
            .start_at(vec![FirestoreValue::from(1000)], true)
            .unwrap()
            .limit(2);

        assert_eq!(
            query.structured_query(),
            json!({
                "from": [ { "collectionId": "cities" } ],
                "where": {
                    "compositeFilter": {
                        "op": "AND",
                        "filters": [ {
                            "fieldFilter": {
                                "field": { "fieldPath": "state" },
                                "op": "EQUAL",
                                "value": { "stringValue": "CA" }
                            }
                        } ]
                    }
                },
                "orderBy": [ { "field": { "fieldPath": "population" }, "direction": "DESCENDING" } ],
                "startAt": { "values": [ { "integerValue": "1000" } ], "before": true },
                "limit": 2
            })
        );
    }

    #[tokio::test]
    async fn runs_filtered_ordered_query() {
        let (firestore, datastore) = seeded();
        let mut query = firestore
            .collection("cities")
            .unwrap()
            .query()
            .where_field("state", "==", "CA")
            .unwrap()
            .order_by("population", "desc")
            .unwrap();
        let documents = query.get().await.unwrap();
        assert_eq!(ids(&documents), vec!["la", "sd", "sf"]);
        assert_eq!(
            datastore.last_request().unwrap().path,
            format!("{BASE}:runQuery")
        );
        assert!(!query.has_next_page());
    }

    #[tokio::test]
    async fn cursors_bound_ordered_results() {
        let (firestore, _) = seeded();
        let mut query = firestore
            .collection("cities")
            .unwrap()
            .query()
            .order_by("population", "asc")
            .unwrap()
            .start_at(vec![FirestoreValue::from(870)], false)
            .unwrap()
            .end_at(vec![FirestoreValue::from(8400)], true)
            .unwrap();
        let documents = query.get().await.unwrap();
        assert_eq!(ids(&documents), vec!["sd", "la"]);
    }

    #[tokio::test]
    async fn pages_through_results() {
        let (firestore, _) = seeded();
        let mut query = firestore
            .collection("cities")
            .unwrap()
            .query()
            .order_by("population", "asc")
            .unwrap()
            .limit(2);

        let first = query.get().await.unwrap();
        assert_eq!(ids(&first), vec!["bf", "sf"]);
        assert!(query.has_next_page());

        let second = query.next_page().await.unwrap();
        assert_eq!(ids(&second), vec!["sd", "la"]);

        let third = query.next_page().await.unwrap();
        assert_eq!(ids(&third), vec!["ny"]);
        assert!(!query.has_next_page());
        assert!(query.next_page().await.unwrap().is_empty());
    }
}
