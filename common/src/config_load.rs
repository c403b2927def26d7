//! Config file loading: JSON-or-YAML sniffing and `column_mapping`
//! string-or-object shorthand resolution (§6, §9). The runtime types in
//! `config` always carry the full object form; this module is the one
//! place the shorthand is accepted.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::config::{ColumnMap, ColumnMapKind, EngineConfig, IndexColumnMap, InitQuery, TableMap};
use crate::err::{CdcError, CdcResult};
use crate::value::Value;

/// `column_mapping` entry as it appears on disk: either a bare string
/// (shorthand for `{column: <string>}`) or the full object shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawColumnMap {
    Shorthand(String),
    Full {
        column: String,
        #[serde(default)]
        primary_key: bool,
        #[serde(default)]
        transform: Option<String>,
        #[serde(default)]
        value: Option<Value>,
    },
}

impl RawColumnMap {
    fn resolve(self, source_column: &str) -> CdcResult<ColumnMap> {
        match self {
            RawColumnMap::Shorthand(column) => Ok(ColumnMap::passthrough(column)),
            RawColumnMap::Full { column, primary_key, transform, value } => {
                let kind = match (transform, value) {
                    (Some(t), None) => ColumnMapKind::Transform { transform: t },
                    (None, Some(v)) => ColumnMapKind::Static { value: v },
                    (None, None) => ColumnMapKind::Passthrough,
                    (Some(_), Some(_)) => {
                        return Err(CdcError::Configuration(format!(
                            "column mapping for '{source_column}' sets both transform and value"
                        )))
                    }
                };
                Ok(ColumnMap { column, primary_key, kind })
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawTableMap {
    source: String,
    source_table: String,
    target: String,
    target_table: String,
    primary_key: String,
    columns: IndexMap<String, RawColumnMap>,
    #[serde(default)]
    filter: Option<serde_json::Value>,
    #[serde(default)]
    init_query: Option<InitQuery>,
}

impl RawTableMap {
    fn resolve(self) -> CdcResult<TableMap> {
        let mut columns = IndexColumnMap::new();
        for (source_column, raw) in self.columns {
            columns.insert(source_column.clone(), raw.resolve(&source_column)?);
        }
        let target_has_pk = columns.values().any(|c| c.column == self.primary_key);
        if !target_has_pk {
            return Err(CdcError::Configuration(format!(
                "primary key '{}' is not among the mapping's target columns",
                self.primary_key
            )));
        }
        Ok(TableMap {
            source: self.source,
            source_table: self.source_table,
            target: self.target,
            target_table: self.target_table,
            primary_key: self.primary_key,
            columns,
            filter: self.filter,
            init_query: self.init_query,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawEngineConfig {
    sources: HashMap<String, crate::config::SourceSpec>,
    targets: HashMap<String, crate::config::TargetSpec>,
    replication: crate::config::ReplicationConfig,
    mapping: HashMap<String, RawTableMap>,
    monitoring: crate::config::MonitoringConfig,
    tuning: crate::config::EngineTuning,
}

impl Default for RawEngineConfig {
    fn default() -> Self {
        RawEngineConfig {
            sources: HashMap::new(),
            targets: HashMap::new(),
            replication: Default::default(),
            mapping: HashMap::new(),
            monitoring: Default::default(),
            tuning: Default::default(),
        }
    }
}

/// Parses either JSON or YAML text into a validated `EngineConfig`,
/// resolving `column_mapping` shorthand and cross-checking that every
/// mapping's `source`/`target` names an entry in `sources`/`targets` and
/// that `primary_key` is among the mapping's own target columns.
pub fn load_str(text: &str) -> CdcResult<EngineConfig> {
    let raw: RawEngineConfig = serde_json::from_str(text)
        .or_else(|_| serde_yaml::from_str(text))
        .map_err(|e| CdcError::Configuration(format!("failed to parse config: {e}")))?;

    let mut mapping = HashMap::new();
    for (id, raw_table) in raw.mapping {
        if !raw.sources.contains_key(&raw_table.source) {
            return Err(CdcError::Configuration(format!(
                "mapping '{id}' references unknown source '{}'",
                raw_table.source
            )));
        }
        if !raw.targets.contains_key(&raw_table.target) {
            return Err(CdcError::Configuration(format!(
                "mapping '{id}' references unknown target '{}'",
                raw_table.target
            )));
        }
        mapping.insert(id, raw_table.resolve()?);
    }

    Ok(EngineConfig {
        sources: raw.sources,
        targets: raw.targets,
        replication: raw.replication,
        mapping,
        monitoring: raw.monitoring,
        tuning: raw.tuning,
    })
}

pub fn load_path(path: impl AsRef<Path>) -> CdcResult<EngineConfig> {
    let text = fs::read_to_string(path)?;
    load_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str = r#"
    {
      "sources": {"src": {"host": "127.0.0.1", "user": "root", "password": "x"}},
      "targets": {"tgt": {"host": "127.0.0.1", "user": "root", "password": "x"}},
      "mapping": {
        "users": {
          "source": "src",
          "source_table": "db.users",
          "target": "tgt",
          "target_table": "users",
          "primary_key": "id",
          "columns": {
            "id": "id",
            "name": {"column": "name", "transform": "uppercase"}
          }
        }
      }
    }
    "#;

    #[test]
    fn loads_json_and_resolves_shorthand() {
        let cfg = load_str(JSON).unwrap();
        let table = &cfg.mapping["users"];
        assert!(matches!(table.columns["id"].kind, ColumnMapKind::Passthrough));
        assert!(matches!(table.columns["name"].kind, ColumnMapKind::Transform { .. }));
    }

    #[test]
    fn loads_equivalent_yaml() {
        let yaml = r#"
sources:
  src:
    host: 127.0.0.1
    user: root
    password: x
targets:
  tgt:
    host: 127.0.0.1
    user: root
    password: x
mapping:
  users:
    source: src
    source_table: db.users
    target: tgt
    target_table: users
    primary_key: id
    columns:
      id: id
      name:
        column: name
        transform: uppercase
"#;
        let cfg = load_str(yaml).unwrap();
        assert_eq!(cfg.mapping["users"].target_table, "users");
    }

    #[test]
    fn unknown_source_is_configuration_error() {
        let bad = JSON.replace("\"src\"", "\"bogus\"");
        assert!(matches!(load_str(&bad), Err(CdcError::Configuration(_))));
    }

    #[test]
    fn primary_key_not_in_mapping_is_configuration_error() {
        let bad = JSON.replace("\"primary_key\": \"id\"", "\"primary_key\": \"missing\"");
        assert!(matches!(load_str(&bad), Err(CdcError::Configuration(_))));
    }

    #[test]
    fn transform_and_value_together_is_configuration_error() {
        let bad = JSON.replace(
            r#""name": {"column": "name", "transform": "uppercase"}"#,
            r#""name": {"column": "name", "transform": "uppercase", "value": "X"}"#,
        );
        assert!(matches!(load_str(&bad), Err(CdcError::Configuration(_))));
    }
}
