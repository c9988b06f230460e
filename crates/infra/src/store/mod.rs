//! Document storage for the `Product` collection.
//!
//! Stores hold plain JSON documents and evaluate the shared query language
//! from `facet-products`, so every backend answers a query the same way.
//! Shaping results for callers (hydration, projection) is left to the caller.
//!
//! ## Write semantics
//!
//! - `insert` validates every record against the schema before writing any.
//! - `update` applies the update to each selected document, re-validates the
//!   result and writes all of them or none.
//! - `soft_delete` only stamps `date_deleted`; rows are never removed.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use facet_core::ProductId;
use facet_products::{
    Conditions, Document, Product, Query, QueryError, QueryOptions, RemoveResult, SchemaError,
    UpdateResult, Updates,
};

pub use in_memory::InMemoryProductStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresProductStore;

/// Storage failure.
///
/// Display output is what callers see after the operation's error prefix, so
/// schema and query messages are passed through verbatim.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Query(String),

    #[error("{0}")]
    Validation(SchemaError),

    #[error("{0}")]
    Backend(String),
}

impl From<QueryError> for StoreError {
    fn from(value: QueryError) -> Self {
        StoreError::Query(value.to_string())
    }
}

impl From<SchemaError> for StoreError {
    fn from(value: SchemaError) -> Self {
        StoreError::Validation(value)
    }
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Every document selected by `query`, sorted and paged.
    async fn find(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// The first document selected by `query`.
    async fn find_one(&self, query: &Query) -> Result<Option<Document>, StoreError>;

    /// Fetch by `_id`; soft-deleted documents follow `query.options`.
    async fn find_by_id(&self, id: &str, query: &Query) -> Result<Option<Document>, StoreError>;

    /// Validate and store new records, returning them as stored.
    async fn insert(&self, records: Vec<Document>) -> Result<Vec<Document>, StoreError>;

    async fn update(
        &self,
        conditions: &Conditions,
        updates: &Updates,
        options: &QueryOptions,
    ) -> Result<UpdateResult, StoreError>;

    async fn soft_delete(&self, conditions: &Conditions) -> Result<RemoveResult, StoreError>;
}

#[async_trait]
impl<S> ProductStore for Arc<S>
where
    S: ProductStore + ?Sized,
{
    async fn find(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        (**self).find(query).await
    }

    async fn find_one(&self, query: &Query) -> Result<Option<Document>, StoreError> {
        (**self).find_one(query).await
    }

    async fn find_by_id(&self, id: &str, query: &Query) -> Result<Option<Document>, StoreError> {
        (**self).find_by_id(id, query).await
    }

    async fn insert(&self, records: Vec<Document>) -> Result<Vec<Document>, StoreError> {
        (**self).insert(records).await
    }

    async fn update(
        &self,
        conditions: &Conditions,
        updates: &Updates,
        options: &QueryOptions,
    ) -> Result<UpdateResult, StoreError> {
        (**self).update(conditions, updates, options).await
    }

    async fn soft_delete(&self, conditions: &Conditions) -> Result<RemoveResult, StoreError> {
        (**self).soft_delete(conditions).await
    }
}

/// Parse an `_id` the way a lookup by id expects it.
pub(crate) fn parse_id(id: &str) -> Result<ProductId, StoreError> {
    id.parse::<ProductId>().map_err(|_| {
        StoreError::Query(format!(
            "Cast to ProductId failed for value \"{id}\" at path \"_id\""
        ))
    })
}

/// Cast incoming records into canonical stored documents.
pub(crate) fn prepare_inserts(
    records: Vec<Document>,
    now: DateTime<Utc>,
) -> Result<Vec<(ProductId, Document)>, StoreError> {
    records
        .iter()
        .map(|record| {
            let product = Product::from_document(record, now)?;
            Ok((product.id, product.to_document()))
        })
        .collect()
}

/// Apply `updates` to one document and re-validate it.
///
/// `None` when the update leaves the document unchanged.
pub(crate) fn prepare_update(
    doc: &Document,
    updates: &Updates,
    now: DateTime<Utc>,
) -> Result<Option<Document>, StoreError> {
    let mut next = doc.clone();
    if !updates.apply(&mut next, now)? {
        return Ok(None);
    }
    let product = Product::from_document(&next, now)?;
    Ok(Some(product.to_document()))
}

/// Stamp a document as soft-deleted.
pub(crate) fn mark_deleted(doc: &mut Document, now: DateTime<Utc>) {
    let stamp = serde_json::Value::String(now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true));
    doc.insert("date_deleted".to_string(), stamp.clone());
    doc.insert("date_modified".to_string(), stamp);
}

/// A selection that only sees live documents.
pub(crate) fn live(conditions: &Conditions) -> Query {
    Query {
        conditions: conditions.clone(),
        ..Query::default()
    }
}

/// A selection honouring the caller's visibility option, without paging.
pub(crate) fn selection(conditions: &Conditions, options: &QueryOptions) -> Query {
    Query {
        conditions: conditions.clone(),
        options: QueryOptions {
            include_deleted: options.include_deleted,
            ..QueryOptions::default()
        },
        ..Query::default()
    }
}
