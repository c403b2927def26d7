//! Row filter tree: parse from JSON, evaluate against a row.
//!
//! Leaves are comparisons (`eq | gt | gte | lt | lte`) and accept two
//! equivalent spellings: `{field: {op: value}}` and `{op: {field: value}}`.
//! Structural nodes are `and | or | not`. A top-level object with more than
//! one sibling entry is an implicit `and` over its entries.

use common::value::Value;
use common::{CdcError, CdcResult};
use common::row::Row;

const COMPARISON_OPS: [&str; 5] = ["eq", "gt", "gte", "lt", "lte"];

#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    Leaf { field: String, op: String, value: Value },
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
}

impl FilterNode {
    pub fn parse(json: &serde_json::Value) -> CdcResult<FilterNode> {
        let obj = json.as_object().ok_or_else(|| {
            CdcError::MalformedFilter("filter node must be a JSON object".into())
        })?;

        if obj.is_empty() {
            return Ok(FilterNode::And(Vec::new()));
        }

        if obj.len() == 1 {
            let (key, value) = obj.iter().next().unwrap();
            if let Some(node) = parse_structural(key, value)? {
                return Ok(node);
            }
            return parse_leaf_entry(key, value);
        }

        let children = obj
            .iter()
            .map(|(k, v)| {
                let entry = serde_json::json!({ k.clone(): v.clone() });
                FilterNode::parse(&entry)
            })
            .collect::<CdcResult<Vec<_>>>()?;
        Ok(FilterNode::And(children))
    }

    pub fn evaluate(&self, row: &Row) -> CdcResult<bool> {
        match self {
            FilterNode::Leaf { field, op, value } => {
                let actual = row.get(field);
                Ok(match op.as_str() {
                    "eq" => actual.filter_eq(value),
                    "gt" => matches!(actual.natural_cmp(value), Some(std::cmp::Ordering::Greater)),
                    "gte" => matches!(
                        actual.natural_cmp(value),
                        Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)
                    ),
                    "lt" => matches!(actual.natural_cmp(value), Some(std::cmp::Ordering::Less)),
                    "lte" => matches!(
                        actual.natural_cmp(value),
                        Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)
                    ),
                    other => {
                        return Err(CdcError::MalformedFilter(format!("unsupported operator: {other}")))
                    }
                })
            }
            FilterNode::And(children) => {
                for child in children {
                    if !child.evaluate(row)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            FilterNode::Or(children) => {
                for child in children {
                    if child.evaluate(row)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            FilterNode::Not(child) => Ok(!child.evaluate(row)?),
        }
    }
}

fn parse_structural(key: &str, value: &serde_json::Value) -> CdcResult<Option<FilterNode>> {
    match key {
        "and" | "or" => {
            let items = value.as_array().ok_or_else(|| {
                CdcError::MalformedFilter(format!("'{key}' must be a list of filter nodes"))
            })?;
            let children = items.iter().map(FilterNode::parse).collect::<CdcResult<Vec<_>>>()?;
            Ok(Some(if key == "and" { FilterNode::And(children) } else { FilterNode::Or(children) }))
        }
        "not" => {
            if !value.is_object() {
                return Err(CdcError::MalformedFilter("'not' must be a filter node object".into()));
            }
            Ok(Some(FilterNode::Not(Box::new(FilterNode::parse(value)?))))
        }
        _ => Ok(None),
    }
}

/// Parses the single remaining leaf shape once `and`/`or`/`not` have been
/// ruled out: either `{op: {field: value}}` or `{field: {op: value}}`.
fn parse_leaf_entry(key: &str, value: &serde_json::Value) -> CdcResult<FilterNode> {
    let inner = value.as_object().ok_or_else(|| {
        CdcError::MalformedFilter(format!("leaf condition for '{key}' must be an object"))
    })?;
    if inner.len() != 1 {
        return Err(CdcError::MalformedFilter(format!(
            "leaf condition for '{key}' must have exactly one entry"
        )));
    }
    let (inner_key, inner_value) = inner.iter().next().unwrap();

    if COMPARISON_OPS.contains(&key) {
        // {op: {field: value}}
        Ok(FilterNode::Leaf {
            field: inner_key.clone(),
            op: key.to_string(),
            value: Value::from(inner_value.clone()),
        })
    } else if COMPARISON_OPS.contains(&inner_key.as_str()) {
        // {field: {op: value}}
        Ok(FilterNode::Leaf {
            field: key.to_string(),
            op: inner_key.clone(),
            value: Value::from(inner_value.clone()),
        })
    } else {
        Err(CdcError::MalformedFilter(format!("unsupported operator in '{key}'")))
    }
}

/// Convenience: parse and evaluate a raw JSON filter in one call.
pub fn matches(json: &serde_json::Value, row: &Row) -> CdcResult<bool> {
    FilterNode::parse(json)?.evaluate(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(c, v)| (c.to_string(), v.clone())).collect()
    }

    #[test]
    fn field_first_spelling() {
        let f = json!({"age": {"gte": 18}});
        let r = row(&[("age", Value::Int(20))]);
        assert!(matches(&f, &r).unwrap());
    }

    #[test]
    fn op_first_spelling() {
        let f = json!({"gte": {"age": 18}});
        let r = row(&[("age", Value::Int(20))]);
        assert!(matches(&f, &r).unwrap());
    }

    #[test]
    fn implicit_and_over_siblings() {
        let f = json!({"age": {"gte": 18}, "status": {"eq": "active"}});
        let matching = row(&[("age", Value::Int(20)), ("status", Value::Text("active".into()))]);
        let not_matching = row(&[("age", Value::Int(20)), ("status", Value::Text("banned".into()))]);
        assert!(matches(&f, &matching).unwrap());
        assert!(!matches(&f, &not_matching).unwrap());
    }

    #[test]
    fn eq_treats_null_as_equal() {
        let f = json!({"deleted_at": {"eq": null}});
        let r = row(&[("deleted_at", Value::Null)]);
        assert!(matches(&f, &r).unwrap());
    }

    #[test]
    fn comparison_against_null_is_false() {
        let f = json!({"age": {"gt": 18}});
        let r = row(&[]);
        assert!(!matches(&f, &r).unwrap());
    }

    #[test]
    fn mismatched_types_short_circuit_false() {
        let f = json!({"age": {"gt": 18}});
        let r = row(&[("age", Value::Text("adult".into()))]);
        assert!(!matches(&f, &r).unwrap());
    }

    #[test]
    fn and_over_zero_conditions_is_true() {
        let f = json!({"and": []});
        let r = row(&[]);
        assert!(matches(&f, &r).unwrap());
    }

    #[test]
    fn or_over_zero_conditions_is_false() {
        let f = json!({"or": []});
        let r = row(&[]);
        assert!(!matches(&f, &r).unwrap());
    }

    #[test]
    fn not_negates_child() {
        let f = json!({"not": {"status": {"eq": "active"}}});
        let active = row(&[("status", Value::Text("active".into()))]);
        let inactive = row(&[("status", Value::Text("inactive".into()))]);
        assert!(!matches(&f, &active).unwrap());
        assert!(matches(&f, &inactive).unwrap());
    }

    #[test]
    fn double_negation_is_identity() {
        let inner = json!({"status": {"eq": "active"}});
        let double_negated = json!({"not": {"not": inner.clone()}});
        let r = row(&[("status", Value::Text("active".into()))]);
        assert_eq!(matches(&inner, &r).unwrap(), matches(&double_negated, &r).unwrap());
    }

    #[test]
    fn and_not_a_list_is_malformed() {
        let f = json!({"and": {"status": {"eq": "active"}}});
        assert!(matches!(matches(&f, &Row::new()), Err(CdcError::MalformedFilter(_))));
    }

    #[test]
    fn not_not_an_object_is_malformed() {
        let f = json!({"not": [1, 2]});
        assert!(matches!(matches(&f, &Row::new()), Err(CdcError::MalformedFilter(_))));
    }

    #[test]
    fn unsupported_operator_is_malformed() {
        let f = json!({"age": {"neq": 18}});
        assert!(matches!(matches(&f, &Row::new()), Err(CdcError::MalformedFilter(_))));
    }
}
