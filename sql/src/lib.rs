//! Pure SQL statement builders (upsert/delete/insert/update/batch).
//!
//! Identifiers (table and column names) are placed verbatim into the
//! statement text: callers are expected to supply names that have already
//! been validated against the mapping configuration. Values are always
//! parameterized and returned alongside the statement text.

use common::{CdcError, CdcResult, Row};
use common::value::Value;

/// A statement and its bound parameter values, in left-to-right order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub values: Vec<Value>,
}

impl Statement {
    fn new(sql: String, values: Vec<Value>) -> Self {
        Statement { sql, values }
    }
}

/// `INSERT INTO table (cols) VALUES (...) ON DUPLICATE KEY UPDATE
/// col=VALUES(col), ...` over all non-pk columns. If the row contains only
/// the primary key, the update clause updates the primary key against
/// itself so the statement remains valid SQL.
pub fn upsert(table: &str, row: &Row, pk: &str) -> CdcResult<Statement> {
    if row.is_empty() {
        return Err(CdcError::EmptyRow);
    }

    let columns: Vec<&String> = row.columns().collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let column_list = columns.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ");

    let update_parts: Vec<String> = columns
        .iter()
        .filter(|c| c.as_str() != pk)
        .map(|c| format!("{c}=VALUES({c})"))
        .collect();

    let update_clause = if update_parts.is_empty() {
        format!("{pk}=VALUES({pk})")
    } else {
        update_parts.join(", ")
    };

    let sql = format!(
        "INSERT INTO {table} ({column_list}) VALUES ({placeholders}) ON DUPLICATE KEY UPDATE {update_clause}"
    );
    let values = row.values().cloned().collect();
    Ok(Statement::new(sql, values))
}

/// `DELETE FROM table WHERE pk = ?` bound from `row[pk]`.
pub fn delete(table: &str, row: &Row, pk: &str) -> CdcResult<Statement> {
    if !row.contains_key(pk) {
        return Err(CdcError::MissingPk);
    }
    let sql = format!("DELETE FROM {table} WHERE {pk} = ?");
    Ok(Statement::new(sql, vec![row.get(pk)]))
}

/// Plain `INSERT INTO table (cols) VALUES (...)`.
pub fn insert(table: &str, row: &Row) -> CdcResult<Statement> {
    if row.is_empty() {
        return Err(CdcError::EmptyRow);
    }
    let columns: Vec<&String> = row.columns().collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let column_list = columns.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ");
    let sql = format!("INSERT INTO {table} ({column_list}) VALUES ({placeholders})");
    let values = row.values().cloned().collect();
    Ok(Statement::new(sql, values))
}

/// `UPDATE table SET col=?, ... WHERE pk = ?` over all non-pk columns.
/// Fails with `NothingToUpdate` when only the primary key is present.
pub fn update(table: &str, row: &Row, pk: &str) -> CdcResult<Statement> {
    if row.is_empty() {
        return Err(CdcError::EmptyRow);
    }
    if !row.contains_key(pk) {
        return Err(CdcError::MissingPk);
    }

    let mut set_parts = Vec::new();
    let mut values = Vec::new();
    for (column, value) in row.iter() {
        if column == pk {
            continue;
        }
        set_parts.push(format!("{column} = ?"));
        values.push(value.clone());
    }

    if set_parts.is_empty() {
        return Err(CdcError::NothingToUpdate);
    }

    values.push(row.get(pk));
    let sql = format!("UPDATE {table} SET {} WHERE {pk} = ?", set_parts.join(", "));
    Ok(Statement::new(sql, values))
}

/// Batched `INSERT ... ON DUPLICATE KEY UPDATE` statement. The column
/// order is fixed by the FIRST row; callers (the target worker's batch
/// accumulator) must ensure every row in `rows` shares that column set
/// before calling this — see the fingerprint grouping rule in the
/// glossary.
pub fn batch_upsert(table: &str, rows: &[Row], pk: &str) -> CdcResult<(String, Vec<Vec<Value>>)> {
    let first = rows.first().ok_or(CdcError::EmptyRow)?;
    if first.is_empty() {
        return Err(CdcError::EmptyRow);
    }

    let columns: Vec<&String> = first.columns().collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let column_list = columns.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ");

    let update_parts: Vec<String> = columns
        .iter()
        .filter(|c| c.as_str() != pk)
        .map(|c| format!("{c}=VALUES({c})"))
        .collect();
    let update_clause = if update_parts.is_empty() {
        format!("{pk}=VALUES({pk})")
    } else {
        update_parts.join(", ")
    };

    let sql = format!(
        "INSERT INTO {table} ({column_list}) VALUES ({placeholders}) ON DUPLICATE KEY UPDATE {update_clause}"
    );

    let values_list: Vec<Vec<Value>> = rows
        .iter()
        .map(|row| columns.iter().map(|c| row.get(c)).collect())
        .collect();

    Ok((sql, values_list))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Row;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(c, v)| (c.to_string(), v.clone())).collect()
    }

    #[test]
    fn s1_basic_insert_pass_through() {
        let r = row(&[("id", Value::Int(1)), ("name", Value::Text("Ada".into()))]);
        let stmt = upsert("users", &r, "id").unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO users (id, name) VALUES (?, ?) ON DUPLICATE KEY UPDATE name=VALUES(name)"
        );
        assert_eq!(stmt.values, vec![Value::Int(1), Value::Text("Ada".into())]);
    }

    #[test]
    fn s2_transform_and_static_columns_all_update() {
        let r = row(&[
            ("id", Value::Int(7)),
            ("name", Value::Text("ADA".into())),
            ("src", Value::Text("A".into())),
        ]);
        let stmt = upsert("users", &r, "id").unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO users (id, name, src) VALUES (?, ?, ?) ON DUPLICATE KEY UPDATE name=VALUES(name), src=VALUES(src)"
        );
    }

    #[test]
    fn upsert_of_only_pk_updates_pk_against_itself() {
        let r = row(&[("id", Value::Int(1))]);
        let stmt = upsert("users", &r, "id").unwrap();
        assert_eq!(stmt.sql, "INSERT INTO users (id) VALUES (?) ON DUPLICATE KEY UPDATE id=VALUES(id)");
    }

    #[test]
    fn empty_row_fails_upsert() {
        let r = Row::new();
        assert!(matches!(upsert("users", &r, "id"), Err(CdcError::EmptyRow)));
    }

    #[test]
    fn s3_delete_by_pk() {
        let r = row(&[("id", Value::Int(3))]);
        let stmt = delete("users", &r, "id").unwrap();
        assert_eq!(stmt.sql, "DELETE FROM users WHERE id = ?");
        assert_eq!(stmt.values, vec![Value::Int(3)]);
    }

    #[test]
    fn delete_missing_pk_fails() {
        let r = row(&[("name", Value::Text("Ada".into()))]);
        assert!(matches!(delete("users", &r, "id"), Err(CdcError::MissingPk)));
    }

    #[test]
    fn update_fails_when_only_pk_present() {
        let r = row(&[("id", Value::Int(1))]);
        assert!(matches!(update("users", &r, "id"), Err(CdcError::NothingToUpdate)));
    }

    #[test]
    fn update_builds_set_clause_over_non_pk_columns() {
        let r = row(&[("id", Value::Int(1)), ("name", Value::Text("Ada".into()))]);
        let stmt = update("users", &r, "id").unwrap();
        assert_eq!(stmt.sql, "UPDATE users SET name = ? WHERE id = ?");
        assert_eq!(stmt.values, vec![Value::Text("Ada".into()), Value::Int(1)]);
    }

    #[test]
    fn batch_upsert_of_single_row_matches_upsert() {
        let r = row(&[("id", Value::Int(1)), ("name", Value::Text("Ada".into()))]);
        let single = upsert("users", &r, "id").unwrap();
        let (sql, values_list) = batch_upsert("users", std::slice::from_ref(&r), "id").unwrap();
        assert_eq!(sql, single.sql);
        assert_eq!(values_list, vec![single.values]);
    }

    #[test]
    fn batch_upsert_uses_first_row_column_order() {
        let rows = vec![
            row(&[("id", Value::Int(1)), ("name", Value::Text("Ada".into()))]),
            row(&[("id", Value::Int(2)), ("name", Value::Text("Bob".into()))]),
        ];
        let (sql, values_list) = batch_upsert("users", &rows, "id").unwrap();
        assert!(sql.starts_with("INSERT INTO users (id, name)"));
        assert_eq!(values_list.len(), 2);
        assert_eq!(values_list[1], vec![Value::Int(2), Value::Text("Bob".into())]);
    }

    #[test]
    fn batch_upsert_of_empty_list_fails() {
        assert!(matches!(batch_upsert("users", &[], "id"), Err(CdcError::EmptyRow)));
    }
}
