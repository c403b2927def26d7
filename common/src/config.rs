use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::value::Value;

fn default_port() -> u16 {
    3306
}

fn default_charset() -> String {
    "utf8mb4".to_string()
}

/// Connection shape shared by sources and targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    #[serde(default)]
    pub database: String,
    #[serde(default = "default_charset")]
    pub charset: String,
}

/// A configured upstream MySQL instance to tail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    #[serde(flatten)]
    pub connection: ConnectionSpec,
}

/// A configured downstream MySQL instance to write into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    pub name: String,
    #[serde(flatten)]
    pub connection: ConnectionSpec,
}

/// One of the three mutually exclusive shapes a column mapping can take.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ColumnMapKind {
    /// Fixed literal, independent of the input row.
    Static { value: Value },
    /// Named function applied to `(source_value, whole_row, qualified_source_table)`.
    Transform { transform: String },
    /// Source column copied to target column unchanged.
    Passthrough,
}

/// Per-column mapping entry, inside the core always in its full object
/// form (the "string shorthand" accepted by configuration files is
/// resolved by the external config loader before it reaches this type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMap {
    /// Target column name.
    pub column: String,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(flatten)]
    pub kind: ColumnMapKind,
}

impl ColumnMap {
    pub fn passthrough(column: impl Into<String>) -> Self {
        ColumnMap { column: column.into(), primary_key: false, kind: ColumnMapKind::Passthrough }
    }

    pub fn transform(column: impl Into<String>, function: impl Into<String>) -> Self {
        ColumnMap {
            column: column.into(),
            primary_key: false,
            kind: ColumnMapKind::Transform { transform: function.into() },
        }
    }

    pub fn static_value(column: impl Into<String>, value: Value) -> Self {
        ColumnMap { column: column.into(), primary_key: false, kind: ColumnMapKind::Static { value } }
    }
}

/// Identifies a `(schema, table)` pair inside a `source_table` reference
/// that may have been written as `table`, `schema.table`, or
/// `source.schema.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedTable {
    pub source: Option<String>,
    pub schema: Option<String>,
    pub table: String,
}

impl QualifiedTable {
    pub fn parse(source_table: &str) -> Self {
        let parts: Vec<&str> = source_table.split('.').collect();
        match parts.as_slice() {
            [table] => QualifiedTable { source: None, schema: None, table: (*table).to_string() },
            [schema, table] => QualifiedTable {
                source: None,
                schema: Some((*schema).to_string()),
                table: (*table).to_string(),
            },
            [source, schema, table, ..] => QualifiedTable {
                source: Some((*source).to_string()),
                schema: Some((*schema).to_string()),
                table: (*table).to_string(),
            },
            [] => QualifiedTable { source: None, schema: None, table: String::new() },
        }
    }
}

/// A raw, not-yet-parsed filter tree: `serde_json::Value` keeps this
/// agnostic to the `filter` crate's tree representation so that `common`
/// has no dependency on it.
pub type RawFilter = serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitQuery {
    pub query: String,
    #[serde(default)]
    pub init_if_target_empty: bool,
}

/// The unit of per-table configuration: links one source stream to one
/// target sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMap {
    pub source: String,
    pub source_table: String,
    pub target: String,
    pub target_table: String,
    pub primary_key: String,
    pub columns: IndexColumnMap,
    #[serde(default)]
    pub filter: Option<RawFilter>,
    #[serde(default)]
    pub init_query: Option<InitQuery>,
}

/// Ordered source-column -> ColumnMap mapping. Ordering matters: the
/// transform engine applies column maps in declared order, and insertion
/// order may legitimately repeat source column names for fan-out.
pub type IndexColumnMap = indexmap::IndexMap<String, ColumnMap>;

impl TableMap {
    pub fn qualified_source(&self) -> QualifiedTable {
        QualifiedTable::parse(&self.source_table)
    }

    /// Target column names this mapping can produce, in declared order.
    pub fn target_columns(&self) -> Vec<&str> {
        self.columns.values().map(|c| c.column.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    #[serde(default = "default_server_id")]
    pub server_id: u32,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default = "default_log_pos")]
    pub log_pos: u32,
    #[serde(default = "default_true")]
    pub resume_stream: bool,
    #[serde(default = "default_true")]
    pub blocking: bool,
    #[serde(default)]
    pub only_events: Option<Vec<String>>,
    #[serde(default)]
    pub pause_replication_during_init: bool,
}

fn default_server_id() -> u32 {
    1
}
fn default_log_pos() -> u32 {
    4
}
fn default_true() -> bool {
    true
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        ReplicationConfig {
            server_id: default_server_id(),
            log_file: None,
            log_pos: default_log_pos(),
            resume_stream: true,
            blocking: true,
            only_events: None,
            pause_replication_during_init: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub port: Option<u16>,
}

/// Tunables that the spec calls out with defaults (§4.6, §4.8, §4.9); all
/// have sane defaults so a config can omit them entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineTuning {
    pub bus_capacity: usize,
    pub target_queue_capacity: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub init_page_size: usize,
    pub monitor_tick: Duration,
    pub source_restart_backoff: Duration,
    pub init_resume_tick: Duration,
}

impl Default for EngineTuning {
    fn default() -> Self {
        EngineTuning {
            bus_capacity: 10_000,
            target_queue_capacity: 10_000,
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
            init_page_size: 1000,
            monitor_tick: Duration::from_secs(30),
            source_restart_backoff: Duration::from_secs(2),
            init_resume_tick: Duration::from_secs(10),
        }
    }
}

/// The complete typed configuration tree the supervisor is constructed
/// from. Reading this from JSON/YAML on disk, including the
/// string-or-object `column_mapping` shorthand and path/env resolution,
/// is the job of an external config loader, not this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sources: HashMap<String, SourceSpec>,
    pub targets: HashMap<String, TargetSpec>,
    pub replication: ReplicationConfig,
    pub mapping: HashMap<String, TableMap>,
    pub monitoring: MonitoringConfig,
    pub tuning: EngineTuning,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sources: HashMap::new(),
            targets: HashMap::new(),
            replication: ReplicationConfig::default(),
            mapping: HashMap::new(),
            monitoring: MonitoringConfig::default(),
            tuning: EngineTuning::default(),
        }
    }
}

impl EngineConfig {
    /// The `(schema, table)` pairs a given source must filter its binlog
    /// stream to, derived from the mapping table (§3, SourceSpec contract).
    pub fn schema_tables_for_source<'a>(&'a self, source: &str) -> Vec<(String, String)> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for table_map in self.mapping.values() {
            if table_map.source != source {
                continue;
            }
            let qualified = table_map.qualified_source();
            let schema = qualified.schema.clone().unwrap_or_default();
            let key = (schema.clone(), qualified.table.clone());
            if seen.insert(key.clone()) {
                out.push(key);
            }
        }
        out
    }

    pub fn mappings_for_target<'a>(&'a self, target: &str) -> Vec<&'a TableMap> {
        self.mapping.values().filter(|m| m.target == target).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_table_parses_all_three_shapes() {
        assert_eq!(QualifiedTable::parse("users").table, "users");
        let q = QualifiedTable::parse("db.users");
        assert_eq!((q.schema.as_deref(), q.table.as_str()), (Some("db"), "users"));
        let q = QualifiedTable::parse("src.db.users");
        assert_eq!(
            (q.source.as_deref(), q.schema.as_deref(), q.table.as_str()),
            (Some("src"), Some("db"), "users")
        );
    }
}
