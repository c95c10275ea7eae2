use crate::value::FirestoreValue;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArrayValue {
    values: Vec<FirestoreValue>,
}

impl ArrayValue {
    pub fn new(values: Vec<FirestoreValue>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[FirestoreValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<FirestoreValue> {
        self.values
    }
}

impl From<Vec<FirestoreValue>> for ArrayValue {
    fn from(values: Vec<FirestoreValue>) -> Self {
        Self::new(values)
    }
}

impl FromIterator<FirestoreValue> for ArrayValue {
    fn from_iter<T: IntoIterator<Item = FirestoreValue>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_values() {
        let array = ArrayValue::new(vec![FirestoreValue::from_integer(1)]);
        assert_eq!(array.values().len(), 1);
        assert!(!array.is_empty());
    }
}
