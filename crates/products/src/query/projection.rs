use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Document, QueryError};

/// Field selection applied to results.
///
/// `"key label"` / `{"key": 1}` include; `"-cost"` / `{"cost": 0}` exclude.
/// `_id` is always returned by an inclusion projection unless excluded
/// explicitly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Projection {
    #[default]
    All,
    Include { fields: Vec<String>, with_id: bool },
    Exclude(Vec<String>),
}

impl Projection {
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Include {
            fields: fields.into_iter().map(Into::into).collect(),
            with_id: true,
        }
    }

    pub fn apply(&self, mut doc: Document) -> Document {
        match self {
            Projection::All => doc,
            Projection::Include { fields, with_id } => {
                let mut out = Map::new();
                if *with_id {
                    if let Some(id) = doc.remove("_id") {
                        out.insert("_id".to_string(), id);
                    }
                }
                for f in fields {
                    if let Some(v) = doc.remove(f) {
                        out.insert(f.clone(), v);
                    }
                }
                out
            }
            Projection::Exclude(fields) => {
                for f in fields {
                    doc.remove(f);
                }
                doc
            }
        }
    }

    fn from_pairs(pairs: Vec<(String, bool)>) -> Result<Self, QueryError> {
        if pairs.is_empty() {
            return Ok(Self::All);
        }

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        let mut id_excluded = false;
        for (field, keep) in pairs {
            match (field.as_str(), keep) {
                ("_id", false) => id_excluded = true,
                ("_id", true) => {}
                (_, true) => include.push(field),
                (_, false) => exclude.push(field),
            }
        }

        match (include.is_empty(), exclude.is_empty()) {
            (false, false) => Err(QueryError::MixedProjection),
            (false, true) => Ok(Self::Include {
                fields: include,
                with_id: !id_excluded,
            }),
            (true, _) => {
                if id_excluded {
                    exclude.push("_id".to_string());
                }
                if exclude.is_empty() {
                    Ok(Self::All)
                } else {
                    Ok(Self::Exclude(exclude))
                }
            }
        }
    }
}

impl TryFrom<Value> for Projection {
    type Error = QueryError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(Self::All),
            Value::String(s) => Self::from_pairs(
                s.split_whitespace()
                    .map(|f| match f.strip_prefix('-') {
                        Some(name) => (name.to_string(), false),
                        None => (f.to_string(), true),
                    })
                    .collect(),
            ),
            Value::Object(map) => {
                let pairs = map
                    .into_iter()
                    .map(|(field, flag)| {
                        let keep = match &flag {
                            Value::Bool(b) => *b,
                            Value::Number(n) if n.as_i64() == Some(1) => true,
                            Value::Number(n) if n.as_i64() == Some(0) => false,
                            other => {
                                return Err(QueryError::InvalidProjection(format!(
                                    "`{field}` must be 0 or 1, got {other}"
                                )));
                            }
                        };
                        Ok((field, keep))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Self::from_pairs(pairs)
            }
            other => Err(QueryError::InvalidProjection(format!(
                "expected an object or string, got {other}"
            ))),
        }
    }
}

impl From<Projection> for Value {
    fn from(value: Projection) -> Self {
        match value {
            Projection::All => Value::String(String::new()),
            Projection::Include { fields, with_id } => {
                let mut parts = fields;
                if !with_id {
                    parts.push("-_id".to_string());
                }
                Value::String(parts.join(" "))
            }
            Projection::Exclude(fields) => Value::String(
                fields
                    .into_iter()
                    .map(|f| format!("-{f}"))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Document {
        json!({"_id": "p1", "key": "tee", "label": "T", "cost": 3, "price": 10})
            .as_object()
            .cloned()
            .unwrap()
    }

    fn projection(v: Value) -> Projection {
        Projection::try_from(v).unwrap()
    }

    #[test]
    fn empty_string_selects_everything() {
        assert_eq!(projection(json!("")), Projection::All);
        assert_eq!(projection(json!("")).apply(doc()), doc());
    }

    #[test]
    fn inclusion_keeps_id() {
        let out = projection(json!("key price")).apply(doc());
        assert_eq!(Value::Object(out), json!({"_id": "p1", "key": "tee", "price": 10}));
    }

    #[test]
    fn inclusion_can_drop_id() {
        let out = projection(json!({"key": 1, "_id": 0})).apply(doc());
        assert_eq!(Value::Object(out), json!({"key": "tee"}));
    }

    #[test]
    fn exclusion_removes_fields() {
        let out = projection(json!("-cost -label")).apply(doc());
        assert_eq!(Value::Object(out), json!({"_id": "p1", "key": "tee", "price": 10}));
    }

    #[test]
    fn mixing_is_rejected() {
        assert_eq!(
            Projection::try_from(json!("key -cost")),
            Err(QueryError::MixedProjection)
        );
    }

    #[test]
    fn string_form_survives_serialization() {
        let p = projection(json!("key label -_id"));
        let back: Projection = serde_json::from_value(serde_json::to_value(&p).unwrap()).unwrap();
        assert_eq!(p, back);
    }
}
