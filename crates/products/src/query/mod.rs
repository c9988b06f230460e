//! Document query language for the `Product` collection.
//!
//! A small, Mongo-flavoured dialect: conditions select documents, a
//! projection trims fields, options page/sort/shape the result and updates
//! describe in-place modifications. Every store evaluates queries through
//! this module so the semantics are identical across backends.

mod conditions;
mod options;
mod projection;
mod update;

use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;

pub use conditions::Conditions;
pub use options::{QueryOptions, Sort, SortOrder};
pub use projection::Projection;
pub use update::Updates;

use crate::schema::Product;

/// A stored document.
pub type Document = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("unknown operator {0}")]
    UnknownOperator(String),

    #[error("invalid operand for {op}: {reason}")]
    InvalidOperand { op: String, reason: String },

    #[error("conditions must be an object")]
    InvalidConditions,

    #[error("updates must be an object")]
    InvalidUpdates,

    #[error("Projection cannot have a mix of inclusion and exclusion.")]
    MixedProjection,

    #[error("invalid projection: {0}")]
    InvalidProjection(String),

    #[error("invalid sort: {0}")]
    InvalidSort(String),

    #[error("Mod on {0} not allowed")]
    ImmutableField(String),

    #[error("Cannot apply {op} to a non-{expected} value at path `{path}`")]
    TypeMismatch {
        op: String,
        expected: &'static str,
        path: String,
    },
}

/// A read query: conditions + projection + options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub conditions: Conditions,
    pub projection: Projection,
    pub options: QueryOptions,
}

impl Query {
    pub fn new(conditions: Conditions, projection: Projection, options: QueryOptions) -> Self {
        Self {
            conditions,
            projection,
            options,
        }
    }

    /// Whether `doc` is selected (soft-deleted documents are hidden unless asked for).
    pub fn selects(&self, doc: &Document) -> Result<bool, QueryError> {
        if !self.options.include_deleted && is_soft_deleted(doc) {
            return Ok(false);
        }
        self.conditions.matches(doc)
    }

    /// Filter, sort and page `docs`. Shaping is left to [`Query::shape`].
    pub fn evaluate<I>(&self, docs: I) -> Result<Vec<Document>, QueryError>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut selected = Vec::new();
        for doc in docs {
            if self.selects(&doc)? {
                selected.push(doc);
            }
        }
        Ok(self.options.window(selected))
    }

    /// Shape a selected document for the caller.
    ///
    /// Non-lean results go through the schema (defaults filled, unknown keys
    /// dropped); lean results are returned as stored. The projection applies
    /// to both.
    pub fn shape(&self, doc: Document) -> Document {
        let doc = if self.options.lean {
            doc
        } else {
            match Product::from_document(&doc, Utc::now()) {
                Ok(product) => product.to_document(),
                Err(e) => {
                    tracing::warn!(error = %e, "stored product failed hydration; returning it lean");
                    doc
                }
            }
        };
        self.projection.apply(doc)
    }
}

/// A document is soft-deleted when `date_deleted` is set to anything but null.
pub fn is_soft_deleted(doc: &Document) -> bool {
    doc.get("date_deleted").is_some_and(|v| !v.is_null())
}

/// Resolve a dotted path (`custom.color`, `attributes.0.key`) inside a document.
pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = doc.get(first)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Numbers compare numerically regardless of integer/float representation.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Ordering between two scalars of the same kind; `None` when incomparable.
pub(crate) fn compare(a: &Value, b: &Value) -> Option<core::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
