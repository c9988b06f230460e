use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Document, QueryError, values_equal};

/// In-place modifications.
///
/// `$set $unset $inc $push $pull` are supported; plain keys are `$set`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Updates(Map<String, Value>);

impl Updates {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Apply to `doc`. Returns whether anything changed; a change also stamps
    /// `date_modified` with `now`.
    pub fn apply(&self, doc: &mut Document, now: DateTime<Utc>) -> Result<bool, QueryError> {
        let before = doc.clone();

        for (key, operand) in &self.0 {
            if !key.starts_with('$') {
                set_path(doc, key, operand.clone())?;
                continue;
            }
            let fields = operand.as_object().ok_or_else(|| QueryError::InvalidOperand {
                op: key.clone(),
                reason: "expected an object of field paths".to_string(),
            })?;
            for (path, value) in fields {
                match key.as_str() {
                    "$set" => set_path(doc, path, value.clone())?,
                    "$unset" => unset_path(doc, path)?,
                    "$inc" => inc_path(doc, path, value)?,
                    "$push" => push_path(doc, path, value)?,
                    "$pull" => pull_path(doc, path, value)?,
                    other => return Err(QueryError::UnknownOperator(other.to_string())),
                }
            }
        }

        let modified = *doc != before;
        if modified {
            doc.insert(
                "date_modified".to_string(),
                Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }
        Ok(modified)
    }
}

impl TryFrom<Value> for Updates {
    type Error = QueryError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(QueryError::InvalidUpdates),
        }
    }
}

impl From<Updates> for Value {
    fn from(value: Updates) -> Self {
        Value::Object(value.0)
    }
}

fn guard_id(path: &str) -> Result<(), QueryError> {
    if path == "_id" || path.starts_with("_id.") {
        return Err(QueryError::ImmutableField("_id".to_string()));
    }
    Ok(())
}

/// Walk to the parent object of `path`, creating missing intermediate objects.
fn parent_mut<'a>(
    doc: &'a mut Document,
    path: &'a str,
    op: &str,
) -> Result<(&'a mut Document, &'a str), QueryError> {
    let (parents, leaf) = match path.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, path),
    };
    let mut current = doc;
    if let Some(parents) = parents {
        for part in parents.split('.') {
            let next = current
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            current = match next {
                Value::Object(map) => map,
                _ => {
                    return Err(QueryError::TypeMismatch {
                        op: op.to_string(),
                        expected: "object",
                        path: path.to_string(),
                    });
                }
            };
        }
    }
    Ok((current, leaf))
}

fn set_path(doc: &mut Document, path: &str, value: Value) -> Result<(), QueryError> {
    guard_id(path)?;
    let (parent, leaf) = parent_mut(doc, path, "$set")?;
    parent.insert(leaf.to_string(), value);
    Ok(())
}

fn unset_path(doc: &mut Document, path: &str) -> Result<(), QueryError> {
    guard_id(path)?;
    let mut current = doc;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            current.remove(part);
            break;
        }
        current = match current.get_mut(part) {
            Some(Value::Object(map)) => map,
            _ => break,
        };
    }
    Ok(())
}

fn inc_path(doc: &mut Document, path: &str, by: &Value) -> Result<(), QueryError> {
    guard_id(path)?;
    let Value::Number(by) = by else {
        return Err(QueryError::InvalidOperand {
            op: "$inc".to_string(),
            reason: format!("`{path}` must be incremented by a number"),
        });
    };
    let (parent, leaf) = parent_mut(doc, path, "$inc")?;
    let next = match parent.get(leaf) {
        None | Some(Value::Null) => Value::Number(by.clone()),
        Some(Value::Number(current)) => match (current.as_i64(), by.as_i64()) {
            (Some(a), Some(b)) => Value::from(a.saturating_add(b)),
            _ => Value::from(current.as_f64().unwrap_or(0.0) + by.as_f64().unwrap_or(0.0)),
        },
        Some(_) => {
            return Err(QueryError::TypeMismatch {
                op: "$inc".to_string(),
                expected: "numeric",
                path: path.to_string(),
            });
        }
    };
    parent.insert(leaf.to_string(), next);
    Ok(())
}

fn push_path(doc: &mut Document, path: &str, value: &Value) -> Result<(), QueryError> {
    guard_id(path)?;
    let items = match value {
        Value::Object(map) if map.contains_key("$each") => match map.get("$each") {
            Some(Value::Array(each)) => each.clone(),
            _ => {
                return Err(QueryError::InvalidOperand {
                    op: "$push".to_string(),
                    reason: "$each must be an array".to_string(),
                });
            }
        },
        other => vec![other.clone()],
    };
    let (parent, leaf) = parent_mut(doc, path, "$push")?;
    match parent
        .entry(leaf.to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        Value::Array(existing) => {
            existing.extend(items);
            Ok(())
        }
        _ => Err(QueryError::TypeMismatch {
            op: "$push".to_string(),
            expected: "array",
            path: path.to_string(),
        }),
    }
}

fn pull_path(doc: &mut Document, path: &str, value: &Value) -> Result<(), QueryError> {
    guard_id(path)?;
    let (parent, leaf) = parent_mut(doc, path, "$pull")?;
    match parent.get_mut(leaf) {
        None => Ok(()),
        Some(Value::Array(existing)) => {
            existing.retain(|item| !values_equal(item, value));
            Ok(())
        }
        Some(_) => Err(QueryError::TypeMismatch {
            op: "$pull".to_string(),
            expected: "array",
            path: path.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    fn updates(v: Value) -> Updates {
        Updates::try_from(v).unwrap()
    }

    #[test]
    fn plain_keys_are_set() {
        let mut d = doc(json!({"_id": "a", "price": 10}));
        let changed = updates(json!({"price": 12, "custom.color": "red"}))
            .apply(&mut d, Utc::now())
            .unwrap();
        assert!(changed);
        assert_eq!(d["price"], json!(12));
        assert_eq!(d["custom"], json!({"color": "red"}));
        assert!(d.contains_key("date_modified"));
    }

    #[test]
    fn operators_compose() {
        let mut d = doc(json!({"stock": 3, "visibility": ["search"], "sku": "X"}));
        updates(json!({
            "$inc": {"stock": 2},
            "$push": {"visibility": {"$each": ["catalog", "feed"]}},
            "$unset": {"sku": ""}
        }))
        .apply(&mut d, Utc::now())
        .unwrap();
        assert_eq!(d["stock"], json!(5));
        assert_eq!(d["visibility"], json!(["search", "catalog", "feed"]));
        assert!(!d.contains_key("sku"));

        updates(json!({"$pull": {"visibility": "feed"}}))
            .apply(&mut d, Utc::now())
            .unwrap();
        assert_eq!(d["visibility"], json!(["search", "catalog"]));
    }

    #[test]
    fn no_op_does_not_touch_date_modified() {
        let mut d = doc(json!({"price": 10}));
        let changed = updates(json!({"$set": {"price": 10}}))
            .apply(&mut d, Utc::now())
            .unwrap();
        assert!(!changed);
        assert!(!d.contains_key("date_modified"));
    }

    #[test]
    fn id_is_immutable() {
        let mut d = doc(json!({"_id": "a"}));
        let err = updates(json!({"_id": "b"})).apply(&mut d, Utc::now()).unwrap_err();
        assert_eq!(err.to_string(), "Mod on _id not allowed");
        assert_eq!(d["_id"], json!("a"));
    }

    #[test]
    fn type_mismatches_are_errors() {
        let mut d = doc(json!({"key": "tee", "stock": 1}));
        assert!(matches!(
            updates(json!({"$inc": {"key": 1}})).apply(&mut d, Utc::now()),
            Err(QueryError::TypeMismatch { .. })
        ));
        assert!(matches!(
            updates(json!({"$push": {"stock": 1}})).apply(&mut d, Utc::now()),
            Err(QueryError::TypeMismatch { .. })
        ));
        assert!(matches!(
            updates(json!({"$rename": {"key": "sku"}})).apply(&mut d, Utc::now()),
            Err(QueryError::UnknownOperator(_))
        ));
    }

    #[test]
    fn non_object_updates_are_rejected() {
        assert_eq!(Updates::try_from(json!([1])), Err(QueryError::InvalidUpdates));
    }
}
