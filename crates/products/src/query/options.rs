use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Document, QueryError, compare, lookup};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Sort specification, applied key by key.
///
/// Accepts `{"price": 1, "stock": -1}` or the string form `"price -stock"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Sort(Vec<(String, SortOrder)>);

impl Sort {
    pub fn by(field: impl Into<String>, order: SortOrder) -> Self {
        Self(vec![(field.into(), order)])
    }

    pub fn then(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.0.push((field.into(), order));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Order two documents. Missing values sort before present ones.
    pub fn order(&self, a: &Document, b: &Document) -> core::cmp::Ordering {
        use core::cmp::Ordering;

        for (field, order) in &self.0 {
            let ord = match (lookup(a, field), lookup(b, field)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
            };
            let ord = match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl TryFrom<Value> for Sort {
    type Error = QueryError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::String(s) => Ok(Self(
                s.split_whitespace()
                    .map(|f| match f.strip_prefix('-') {
                        Some(name) => (name.to_string(), SortOrder::Desc),
                        None => (f.to_string(), SortOrder::Asc),
                    })
                    .collect(),
            )),
            Value::Object(map) => map
                .into_iter()
                .map(|(field, dir)| {
                    let order = match &dir {
                        Value::Number(n) if n.as_i64() == Some(1) => SortOrder::Asc,
                        Value::Number(n) if n.as_i64() == Some(-1) => SortOrder::Desc,
                        Value::String(s) if s == "asc" || s == "ascending" => SortOrder::Asc,
                        Value::String(s) if s == "desc" || s == "descending" => SortOrder::Desc,
                        other => {
                            return Err(QueryError::InvalidSort(format!(
                                "direction for `{field}` must be 1 or -1, got {other}"
                            )));
                        }
                    };
                    Ok((field, order))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self),
            other => Err(QueryError::InvalidSort(format!(
                "expected an object or string, got {other}"
            ))),
        }
    }
}

impl From<Sort> for Value {
    fn from(value: Sort) -> Self {
        let map: Map<String, Value> = value
            .0
            .into_iter()
            .map(|(field, order)| {
                let dir = match order {
                    SortOrder::Asc => 1,
                    SortOrder::Desc => -1,
                };
                (field, Value::from(dir))
            })
            .collect();
        Value::Object(map)
    }
}

/// Query options.
///
/// - `lean`: return stored documents without schema hydration
/// - `multi`: updates apply to every match instead of the first
/// - `include_deleted`: make soft-deleted documents visible
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub lean: bool,
    #[serde(skip_serializing_if = "Sort::is_empty")]
    pub sort: Sort,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    pub multi: bool,
    pub include_deleted: bool,
}

impl QueryOptions {
    /// Sort, skip and limit already-selected documents.
    pub fn window(&self, mut docs: Vec<Document>) -> Vec<Document> {
        if !self.sort.is_empty() {
            // Stable: ties keep insertion order.
            docs.sort_by(|a, b| self.sort.order(a, b));
        }
        let skip = self.skip.unwrap_or(0);
        let limit = self.limit.filter(|l| *l > 0).unwrap_or(usize::MAX);
        docs.into_iter().skip(skip).take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs(prices: &[i64]) -> Vec<Document> {
        prices
            .iter()
            .map(|p| json!({"price": p}).as_object().cloned().unwrap())
            .collect()
    }

    fn prices(docs: &[Document]) -> Vec<i64> {
        docs.iter().map(|d| d["price"].as_i64().unwrap()).collect()
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let o: QueryOptions = serde_json::from_value(json!({"lean": true, "limit": 2})).unwrap();
        assert!(o.lean);
        assert_eq!(o.limit, Some(2));
        assert!(!o.multi);
        assert!(o.sort.is_empty());
    }

    #[test]
    fn sort_accepts_string_and_object_forms() {
        let a: Sort = serde_json::from_value(json!("price -stock")).unwrap();
        let b: Sort = serde_json::from_value(json!({"price": 1, "stock": -1})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, Sort::by("price", SortOrder::Asc).then("stock", SortOrder::Desc));
    }

    #[test]
    fn object_sort_keeps_key_order() {
        let sort: Sort = serde_json::from_value(json!({"stock": -1, "price": 1})).unwrap();
        assert_eq!(sort, Sort::by("stock", SortOrder::Desc).then("price", SortOrder::Asc));

        let doc = |key: &str, price: i64, stock: i64| {
            json!({"key": key, "price": price, "stock": stock})
                .as_object()
                .cloned()
                .unwrap()
        };
        let o = QueryOptions {
            sort,
            ..QueryOptions::default()
        };
        let keys: Vec<_> = o
            .window(vec![doc("a", 1, 5), doc("b", 2, 9), doc("c", 2, 1)])
            .iter()
            .map(|d| d["key"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys, ["b", "a", "c"]);
    }

    #[test]
    fn bad_sort_direction_is_rejected() {
        assert!(serde_json::from_value::<Sort>(json!({"price": 2})).is_err());
        assert!(serde_json::from_value::<Sort>(json!(3)).is_err());
    }

    #[test]
    fn window_sorts_then_skips_then_limits() {
        let o = QueryOptions {
            sort: Sort::by("price", SortOrder::Desc),
            skip: Some(1),
            limit: Some(2),
            ..QueryOptions::default()
        };
        assert_eq!(prices(&o.window(docs(&[3, 9, 1, 7]))), vec![7, 3]);
    }

    #[test]
    fn zero_limit_means_no_limit() {
        let o = QueryOptions {
            limit: Some(0),
            ..QueryOptions::default()
        };
        assert_eq!(o.window(docs(&[1, 2, 3])).len(), 3);
    }

    #[test]
    fn missing_fields_sort_first() {
        let mut all = docs(&[5]);
        all.push(Document::new());
        let o = QueryOptions {
            sort: Sort::by("price", SortOrder::Asc),
            ..QueryOptions::default()
        };
        let out = o.window(all);
        assert!(out[0].is_empty());
    }
}
