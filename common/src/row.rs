use indexmap::IndexMap;

use crate::value::Value;

/// A row is an ordered mapping from column name to scalar value. Insertion
/// order is preserved because the SQL builder and the batch accumulator's
/// column fingerprint both depend on it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(IndexMap<String, Value>);

impl Row {
    pub fn new() -> Self {
        Row(IndexMap::new())
    }

    pub fn get(&self, column: &str) -> Value {
        self.0.get(column).cloned().unwrap_or(Value::Null)
    }

    pub fn get_opt(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn contains_key(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.0.insert(column.into(), value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The ordered set of column names, used to decide whether two rows
    /// may share a batch (see `Fingerprint` in the glossary).
    pub fn fingerprint(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Row(IndexMap::from_iter(iter))
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_column_is_null() {
        let row = Row::new();
        assert_eq!(row.get("missing"), Value::Null);
    }

    #[test]
    fn fingerprint_reflects_insertion_order() {
        let mut row = Row::new();
        row.insert("b", Value::Int(1));
        row.insert("a", Value::Int(2));
        assert_eq!(row.fingerprint(), vec!["b".to_string(), "a".to_string()]);
    }
}
