//! Condition matching and projection over stored field maps.

use std::cmp::Ordering;

use sbase_core::document::{get_path, set_path};
use sbase_core::{DriverError, DriverResult, Fields, ID_FIELD};
use serde_json::Value;

/// Check whether `fields` satisfies every condition.
///
/// A condition is either a plain value (equality, or membership when the
/// stored value is an array) or an object of `$`-operators.
pub fn matches(fields: &Fields, conditions: &Fields) -> DriverResult<bool> {
    for (path, condition) in conditions {
        let value = get_path(fields, path);
        let ok = match operators(condition) {
            Some(ops) => {
                let mut all = true;
                for (op, operand) in ops {
                    if !apply(op, value, operand)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            None => equals(value, condition),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality conditions of a query, used to seed upserted documents.
pub fn equalities(conditions: &Fields) -> Fields {
    let mut out = Fields::new();
    for (path, condition) in conditions {
        if operators(condition).is_none() {
            set_path(&mut out, path, condition.clone());
        }
    }
    out
}

/// Keep the selected paths, the identity and the discriminator key.
pub fn project(fields: &Fields, paths: &[String], discriminator_key: &str) -> Fields {
    let mut out = Fields::new();
    for key in [ID_FIELD, discriminator_key] {
        if let Some(value) = fields.get(key) {
            out.insert(key.to_string(), value.clone());
        }
    }
    for path in paths {
        if let Some(value) = get_path(fields, path) {
            set_path(&mut out, path, value.clone());
        }
    }
    out
}

fn operators(condition: &Value) -> Option<&Fields> {
    match condition {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => Some(map),
        _ => None,
    }
}

fn apply(op: &str, value: Option<&Value>, operand: &Value) -> DriverResult<bool> {
    Ok(match op {
        "$eq" => equals(value, operand),
        "$ne" => !equals(value, operand),
        "$in" => in_list(value, operand)?,
        "$nin" => !in_list(value, operand)?,
        "$exists" => value.is_some() == operand.as_bool().unwrap_or(true),
        "$gt" => compare(value, operand) == Some(Ordering::Greater),
        "$gte" => matches!(compare(value, operand), Some(Ordering::Greater | Ordering::Equal)),
        "$lt" => compare(value, operand) == Some(Ordering::Less),
        "$lte" => matches!(compare(value, operand), Some(Ordering::Less | Ordering::Equal)),
        other => {
            return Err(DriverError::InvalidDocument(format!(
                "unsupported query operator `{other}`"
            )))
        }
    })
}

fn equals(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(actual) => actual == expected,
    }
}

fn in_list(value: Option<&Value>, operand: &Value) -> DriverResult<bool> {
    let candidates = operand.as_array().ok_or_else(|| {
        DriverError::InvalidDocument("`$in` and `$nin` expect an array".to_string())
    })?;
    Ok(candidates.iter().any(|candidate| equals(value, candidate)))
}

fn compare(value: Option<&Value>, operand: &Value) -> Option<Ordering> {
    match (value?, operand) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => Fields::new(),
        }
    }

    #[test]
    fn test_equality_and_membership() {
        let doc = fields(json!({ "name": "ana", "tags": ["a", "b"], "address": { "city": "Porto" } }));
        assert!(matches(&doc, &fields(json!({ "name": "ana" }))).unwrap());
        assert!(matches(&doc, &fields(json!({ "tags": "b" }))).unwrap());
        assert!(matches(&doc, &fields(json!({ "address.city": "Porto" }))).unwrap());
        assert!(matches(&doc, &fields(json!({ "missing": null }))).unwrap());
        assert!(!matches(&doc, &fields(json!({ "name": "bo" }))).unwrap());
    }

    #[test]
    fn test_operators() {
        let doc = fields(json!({ "age": 30, "name": "ana" }));
        assert!(matches(&doc, &fields(json!({ "age": { "$gte": 30, "$lt": 31 } }))).unwrap());
        assert!(matches(&doc, &fields(json!({ "name": { "$in": ["ana", "bo"] } }))).unwrap());
        assert!(matches(&doc, &fields(json!({ "name": { "$nin": ["bo"] } }))).unwrap());
        assert!(matches(&doc, &fields(json!({ "deleted": { "$exists": false } }))).unwrap());
        assert!(!matches(&doc, &fields(json!({ "age": { "$gt": 30 } }))).unwrap());
        assert!(!matches(&doc, &fields(json!({ "name": { "$ne": "ana" } }))).unwrap());
        assert!(matches(&doc, &fields(json!({ "age": { "$regex": "x" } }))).is_err());
    }

    #[test]
    fn test_project_keeps_identity() {
        let doc = fields(json!({ "_id": "01", "kind": "Click", "a": 1, "b": { "c": 2, "d": 3 } }));
        let projected = project(&doc, &["b.c".to_string()], "kind");
        assert_eq!(Value::Object(projected), json!({ "_id": "01", "kind": "Click", "b": { "c": 2 } }));
    }

    #[test]
    fn test_equalities() {
        let conditions = fields(json!({ "name": "ana", "age": { "$gt": 3 } }));
        assert_eq!(Value::Object(equalities(&conditions)), json!({ "name": "ana" }));
    }
}
