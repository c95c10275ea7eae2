use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::value::FirestoreValue;

/// String-keyed fields of a document or nested map.
///
/// Insertion order is kept so that merge masks list fields in the order the
/// caller supplied them. Equality ignores order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapValue {
    fields: IndexMap<String, FirestoreValue>,
}

impl MapValue {
    pub fn new(fields: IndexMap<String, FirestoreValue>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &IndexMap<String, FirestoreValue> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&FirestoreValue> {
        self.fields.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FirestoreValue) -> Option<FirestoreValue> {
        self.fields.insert(key.into(), value)
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FirestoreValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> IndexMap<String, FirestoreValue> {
        self.fields
    }
}

impl From<IndexMap<String, FirestoreValue>> for MapValue {
    fn from(fields: IndexMap<String, FirestoreValue>) -> Self {
        Self::new(fields)
    }
}

impl From<BTreeMap<String, FirestoreValue>> for MapValue {
    fn from(fields: BTreeMap<String, FirestoreValue>) -> Self {
        fields.into_iter().collect()
    }
}

impl<K: Into<String>> FromIterator<(K, FirestoreValue)> for MapValue {
    fn from_iter<T: IntoIterator<Item = (K, FirestoreValue)>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(|(key, value)| (key.into(), value)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_map_entries() {
        let mut map = IndexMap::new();
        map.insert("foo".to_string(), FirestoreValue::from_integer(1));
        let value = MapValue::new(map.clone());
        assert_eq!(value.fields().get("foo"), map.get("foo"));
    }

    #[test]
    fn keeps_insertion_order() {
        let map = MapValue::default()
            .with("zeta", 1)
            .with("alpha", 2)
            .with("mid", 3);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn equality_ignores_order() {
        let left = MapValue::default().with("a", 1).with("b", 2);
        let right = MapValue::default().with("b", 2).with("a", 1);
        assert_eq!(left, right);
    }
}
