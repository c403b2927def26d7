//! Binlog row events carry column values by ordinal position only, never
//! by name — `TABLE_MAP_EVENT` gives types, not identifiers. Column names
//! are recovered once per `(schema, table)` via `SHOW COLUMNS FROM` against
//! the owning source connection and cached for the stream's lifetime.

use std::collections::HashMap;
use std::sync::RwLock;

use common::row::Row;

#[derive(Debug, Default)]
pub struct SchemaCache {
    columns: RwLock<HashMap<(String, String), Vec<String>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        SchemaCache { columns: RwLock::new(HashMap::new()) }
    }

    pub fn get(&self, schema: &str, table: &str) -> Option<Vec<String>> {
        self.columns.read().unwrap().get(&(schema.to_string(), table.to_string())).cloned()
    }

    pub fn put(&self, schema: &str, table: &str, columns: Vec<String>) {
        self.columns.write().unwrap().insert((schema.to_string(), table.to_string()), columns);
    }

    /// Renames a positionally-keyed row (`column_0`, `column_1`, ...)
    /// using the cached column order. Columns beyond the cached set keep
    /// their positional name rather than being dropped.
    pub fn rename(&self, schema: &str, table: &str, row: Row) -> Row {
        let Some(names) = self.get(schema, table) else { return row };
        let mut renamed = Row::new();
        for (column, value) in row.iter() {
            let target_name = column
                .strip_prefix("column_")
                .and_then(|idx| idx.parse::<usize>().ok())
                .and_then(|idx| names.get(idx))
                .cloned()
                .unwrap_or_else(|| column.clone());
            renamed.insert(target_name, value.clone());
        }
        renamed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::value::Value;

    #[test]
    fn renames_positional_columns_using_cached_order() {
        let cache = SchemaCache::new();
        cache.put("db", "users", vec!["id".to_string(), "name".to_string()]);

        let mut row = Row::new();
        row.insert("column_0", Value::Int(1));
        row.insert("column_1", Value::Text("Ada".into()));

        let renamed = cache.rename("db", "users", row);
        assert_eq!(renamed.get("id"), Value::Int(1));
        assert_eq!(renamed.get("name"), Value::Text("Ada".into()));
    }

    #[test]
    fn falls_back_to_positional_name_when_uncached() {
        let cache = SchemaCache::new();
        let mut row = Row::new();
        row.insert("column_0", Value::Int(1));
        let renamed = cache.rename("db", "users", row);
        assert_eq!(renamed.get("column_0"), Value::Int(1));
    }
}
