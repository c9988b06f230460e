//! Postgres-backed product collection.
//!
//! Documents live in a single JSONB column:
//!
//! ```sql
//! CREATE TABLE products (id uuid PRIMARY KEY, document jsonb NOT NULL);
//! ```
//!
//! Top-level scalar equalities are pushed down as a `document @> $1`
//! containment filter; the candidates are then evaluated by the shared query
//! evaluator, so results match the in-memory store exactly. Array fields are
//! never pushed down because containment of a scalar in an array does not
//! mean the same thing in JSONB.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | Database, unique violation (`23505`) | `Query` (duplicate key) |
//! | Database, other | `Backend` |
//! | PoolClosed / other | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use facet_core::ProductId;
use facet_products::{
    Conditions, Document, Query, QueryOptions, RemoveResult, UpdateResult, Updates,
};

use super::{
    ProductStore, StoreError, live, mark_deleted, parse_id, prepare_inserts, prepare_update,
    selection,
};

/// Fields stored as arrays; equality on them is "any element equals".
const ARRAY_FIELDS: [&str; 6] = [
    "products",
    "categories",
    "visibility",
    "attributes",
    "files",
    "media",
];

#[derive(Debug, Clone)]
pub struct PostgresProductStore {
    pool: Arc<PgPool>,
}

impl PostgresProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the `products` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS products (
                id uuid PRIMARY KEY,
                document jsonb NOT NULL
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    /// Candidate documents for `conditions`, in id (creation) order.
    async fn candidates(&self, conditions: &Conditions) -> Result<Vec<Document>, StoreError> {
        let filter = Value::Object(conditions.scalar_equalities(&ARRAY_FIELDS));
        let rows = sqlx::query(
            r#"
            SELECT document
            FROM products
            WHERE document @> $1
            ORDER BY id
            "#,
        )
        .bind(filter)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("select_products", e))?;

        rows.iter().map(document_from_row).collect()
    }

    /// Same as [`Self::candidates`] but row-locked inside `tx`.
    async fn candidates_for_update(
        tx: &mut Transaction<'_, Postgres>,
        conditions: &Conditions,
    ) -> Result<Vec<(ProductId, Document)>, StoreError> {
        let filter = Value::Object(conditions.scalar_equalities(&ARRAY_FIELDS));
        let rows = sqlx::query(
            r#"
            SELECT id, document
            FROM products
            WHERE document @> $1
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(filter)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("select_products_for_update", e))?;

        rows.iter()
            .map(|row| {
                let id: uuid::Uuid = row
                    .try_get("id")
                    .map_err(|e| map_sqlx_error("decode_id", e))?;
                Ok((ProductId::from_uuid(id), document_from_row(row)?))
            })
            .collect()
    }

    async fn write(
        tx: &mut Transaction<'_, Postgres>,
        id: ProductId,
        doc: Document,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE products SET document = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(Value::Object(doc))
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("update_product", e))?;
        Ok(())
    }
}

#[async_trait]
impl ProductStore for PostgresProductStore {
    #[instrument(skip_all, err)]
    async fn find(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let docs = self.candidates(&query.conditions).await?;
        Ok(query.evaluate(docs)?)
    }

    #[instrument(skip_all, err)]
    async fn find_one(&self, query: &Query) -> Result<Option<Document>, StoreError> {
        let docs = self.candidates(&query.conditions).await?;
        let first = Query {
            options: QueryOptions {
                limit: Some(1),
                ..query.options.clone()
            },
            ..query.clone()
        };
        Ok(first.evaluate(docs)?.into_iter().next())
    }

    #[instrument(skip(self, query), err)]
    async fn find_by_id(&self, id: &str, query: &Query) -> Result<Option<Document>, StoreError> {
        let id = parse_id(id)?;
        let row = sqlx::query("SELECT document FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_id", e))?;

        match row {
            Some(row) => {
                let doc = document_from_row(&row)?;
                Ok(query.selects(&doc)?.then_some(doc))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip_all, fields(count = records.len()), err)]
    async fn insert(&self, records: Vec<Document>) -> Result<Vec<Document>, StoreError> {
        let prepared = prepare_inserts(records, Utc::now())?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut stored = Vec::with_capacity(prepared.len());
        for (id, doc) in prepared {
            sqlx::query("INSERT INTO products (id, document) VALUES ($1, $2)")
                .bind(id.as_uuid())
                .bind(Value::Object(doc.clone()))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_product", e))?;
            stored.push(doc);
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(stored)
    }

    #[instrument(skip_all, err)]
    async fn update(
        &self,
        conditions: &Conditions,
        updates: &Updates,
        options: &QueryOptions,
    ) -> Result<UpdateResult, StoreError> {
        let query = selection(conditions, options);
        let now = Utc::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut matched = 0u64;
        let mut modified = 0u64;
        for (id, doc) in Self::candidates_for_update(&mut tx, conditions).await? {
            if !query.selects(&doc)? {
                continue;
            }
            matched += 1;
            if let Some(next) = prepare_update(&doc, updates, now)? {
                Self::write(&mut tx, id, next).await?;
                modified += 1;
            }
            if !options.multi {
                break;
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(UpdateResult { matched, modified })
    }

    #[instrument(skip_all, err)]
    async fn soft_delete(&self, conditions: &Conditions) -> Result<RemoveResult, StoreError> {
        let query = live(conditions);
        let now = Utc::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut removed = 0u64;
        for (id, mut doc) in Self::candidates_for_update(&mut tx, conditions).await? {
            if !query.selects(&doc)? {
                continue;
            }
            mark_deleted(&mut doc, now);
            Self::write(&mut tx, id, doc).await?;
            removed += 1;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(RemoveResult {
            matched: removed,
            removed,
        })
    }
}

fn document_from_row(row: &sqlx::postgres::PgRow) -> Result<Document, StoreError> {
    match row.try_get::<Value, _>("document") {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Backend(format!(
            "stored product is not an object: {other}"
        ))),
        Err(e) => Err(map_sqlx_error("decode_document", e)),
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Query(format!("duplicate key in {operation}")),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
