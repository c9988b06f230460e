use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Document, QueryError, compare, lookup, values_equal};

/// Selection conditions.
///
/// Keys are field paths; values are literals (equality) or operator objects
/// (`{"price": {"$gte": 10}}`). `$and` / `$or` combine nested conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Conditions(Map<String, Value>);

impl Conditions {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Match a single document by `_id`.
    pub fn by_id(id: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("_id".to_string(), Value::String(id.into()));
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, doc: &Document) -> Result<bool, QueryError> {
        matches_all(&self.0, doc)
    }

    /// The plain top-level equality conditions on scalar values, excluding `skip` fields.
    ///
    /// Backends can push these down as a containment pre-filter; the full
    /// conditions must still be evaluated on the candidates.
    pub fn scalar_equalities(&self, skip: &[&str]) -> Map<String, Value> {
        self.0
            .iter()
            .filter(|(k, v)| {
                !k.starts_with('$')
                    && !k.contains('.')
                    && !skip.contains(&k.as_str())
                    && matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_))
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl TryFrom<Value> for Conditions {
    type Error = QueryError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            _ => Err(QueryError::InvalidConditions),
        }
    }
}

impl From<Conditions> for Value {
    fn from(value: Conditions) -> Self {
        Value::Object(value.0)
    }
}

fn matches_all(conditions: &Map<String, Value>, doc: &Document) -> Result<bool, QueryError> {
    for (key, expected) in conditions {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for c in nested(key, expected)? {
                    all &= matches_all(c, doc)?;
                }
                all
            }
            "$or" => {
                let mut any = false;
                for c in nested(key, expected)? {
                    any |= matches_all(c, doc)?;
                }
                any
            }
            op if op.starts_with('$') => return Err(QueryError::UnknownOperator(op.to_string())),
            path => matches_field(lookup(doc, path), expected)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn nested<'a>(op: &str, value: &'a Value) -> Result<Vec<&'a Map<String, Value>>, QueryError> {
    let invalid = || QueryError::InvalidOperand {
        op: op.to_string(),
        reason: "expected a non-empty array of objects".to_string(),
    };
    let items = value.as_array().filter(|a| !a.is_empty()).ok_or_else(invalid)?;
    items
        .iter()
        .map(|v| v.as_object().ok_or_else(invalid))
        .collect()
}

fn is_operator_object(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|m| !m.is_empty() && m.keys().all(|k| k.starts_with('$')))
}

fn matches_field(actual: Option<&Value>, expected: &Value) -> Result<bool, QueryError> {
    if !is_operator_object(expected) {
        return Ok(equals(actual, expected));
    }
    let Some(ops) = expected.as_object() else {
        return Ok(false);
    };
    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(actual, operand),
            "$ne" => !equals(actual, operand),
            "$gt" => ordered(actual, operand, |o| o.is_gt()),
            "$gte" => ordered(actual, operand, |o| o.is_ge()),
            "$lt" => ordered(actual, operand, |o| o.is_lt()),
            "$lte" => ordered(actual, operand, |o| o.is_le()),
            "$in" => one_of(op, actual, operand)?,
            "$nin" => !one_of(op, actual, operand)?,
            "$exists" => match operand {
                Value::Bool(want) => actual.is_some() == *want,
                _ => {
                    return Err(QueryError::InvalidOperand {
                        op: op.clone(),
                        reason: "expected a boolean".to_string(),
                    });
                }
            },
            other => return Err(QueryError::UnknownOperator(other.to_string())),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality with array semantics: a literal matches an array field when any
/// element equals it (or the whole array does). Missing equals null.
fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(Value::Array(items)) => {
            values_equal(&Value::Array(items.clone()), expected)
                || items.iter().any(|i| values_equal(i, expected))
        }
        Some(v) => values_equal(v, expected),
    }
}

fn ordered(actual: Option<&Value>, operand: &Value, f: fn(core::cmp::Ordering) -> bool) -> bool {
    match actual {
        None => false,
        Some(Value::Array(items)) => items
            .iter()
            .any(|i| compare(i, operand).is_some_and(f)),
        Some(v) => compare(v, operand).is_some_and(f),
    }
}

fn one_of(op: &str, actual: Option<&Value>, operand: &Value) -> Result<bool, QueryError> {
    let candidates = operand.as_array().ok_or_else(|| QueryError::InvalidOperand {
        op: op.to_string(),
        reason: "expected an array".to_string(),
    })?;
    Ok(candidates.iter().any(|c| equals(actual, c)))
}
