use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use facet_core::ProductId;
use facet_products::{
    Conditions, Document, Query, QueryOptions, RemoveResult, UpdateResult, Updates,
};

use super::{
    ProductStore, StoreError, live, mark_deleted, parse_id, prepare_inserts, prepare_update,
    selection,
};

/// In-memory product collection for tests/dev.
///
/// Documents are keyed by `_id`; UUIDv7 ids keep iteration in creation order.
#[derive(Debug, Default)]
pub struct InMemoryProductStore {
    inner: RwLock<BTreeMap<ProductId, Document>>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents, soft-deleted ones included.
    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Result<Vec<Document>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.values().cloned().collect())
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("product store lock poisoned".to_string())
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn find(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        Ok(query.evaluate(self.snapshot()?)?)
    }

    async fn find_one(&self, query: &Query) -> Result<Option<Document>, StoreError> {
        let first = Query {
            options: QueryOptions {
                limit: Some(1),
                ..query.options.clone()
            },
            ..query.clone()
        };
        Ok(first.evaluate(self.snapshot()?)?.into_iter().next())
    }

    async fn find_by_id(&self, id: &str, query: &Query) -> Result<Option<Document>, StoreError> {
        let id = parse_id(id)?;
        let map = self.inner.read().map_err(|_| poisoned())?;
        match map.get(&id) {
            Some(doc) if query.selects(doc)? => Ok(Some(doc.clone())),
            _ => Ok(None),
        }
    }

    async fn insert(&self, records: Vec<Document>) -> Result<Vec<Document>, StoreError> {
        let prepared = prepare_inserts(records, Utc::now())?;

        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let mut batch = HashSet::with_capacity(prepared.len());
        if let Some((id, _)) = prepared
            .iter()
            .find(|(id, _)| map.contains_key(id) || !batch.insert(*id))
        {
            return Err(StoreError::Query(format!("duplicate key: _id \"{id}\"")));
        }
        let mut stored = Vec::with_capacity(prepared.len());
        for (id, doc) in prepared {
            map.insert(id, doc.clone());
            stored.push(doc);
        }
        Ok(stored)
    }

    async fn update(
        &self,
        conditions: &Conditions,
        updates: &Updates,
        options: &QueryOptions,
    ) -> Result<UpdateResult, StoreError> {
        let query = selection(conditions, options);
        let now = Utc::now();

        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let mut matched = 0u64;
        let mut writes = Vec::new();
        for (id, doc) in map.iter() {
            if !query.selects(doc)? {
                continue;
            }
            matched += 1;
            if let Some(next) = prepare_update(doc, updates, now)? {
                writes.push((*id, next));
            }
            if !options.multi {
                break;
            }
        }

        let modified = writes.len() as u64;
        for (id, next) in writes {
            map.insert(id, next);
        }
        Ok(UpdateResult { matched, modified })
    }

    async fn soft_delete(&self, conditions: &Conditions) -> Result<RemoveResult, StoreError> {
        let query = live(conditions);
        let now = Utc::now();

        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let mut selected = Vec::new();
        for (id, doc) in map.iter() {
            if query.selects(doc)? {
                selected.push(*id);
            }
        }
        for id in &selected {
            if let Some(doc) = map.get_mut(id) {
                mark_deleted(doc, now);
            }
        }
        let n = selected.len() as u64;
        Ok(RemoveResult {
            matched: n,
            removed: n,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_products::Sort;
    use facet_products::query::SortOrder;
    use serde_json::{Value, json};

    fn record(key: &str, price: i64) -> Document {
        json!({"key": key, "label": key.to_uppercase(), "price": price, "description": "d"})
            .as_object()
            .cloned()
            .unwrap()
    }

    fn conditions(v: Value) -> Conditions {
        Conditions::try_from(v).unwrap()
    }

    async fn seeded() -> InMemoryProductStore {
        let store = InMemoryProductStore::new();
        store
            .insert(vec![record("tee", 10), record("mug", 5), record("cap", 15)])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_defaults() {
        let store = InMemoryProductStore::new();
        let stored = store.insert(vec![record("tee", 10)]).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0]["_id"].is_string());
        assert_eq!(stored[0]["product_type"], json!("simple"));
        assert_eq!(stored[0]["visibility"], json!(["search", "catalog"]));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn invalid_batches_write_nothing() {
        let store = InMemoryProductStore::new();
        let mut bad = record("x", 1);
        bad.remove("label");
        let err = store.insert(vec![record("ok", 1), bad]).await.unwrap_err();
        assert_eq!(err.to_string(), "The label field is required.");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn repeated_ids_within_a_batch_write_nothing() {
        let store = InMemoryProductStore::new();
        let id = ProductId::new().to_string();
        let mut first = record("a", 1);
        first.insert("_id".into(), json!(id));
        let mut second = record("b", 2);
        second.insert("_id".into(), json!(id));

        let err = store.insert(vec![first, second]).await.unwrap_err();
        assert_eq!(err.to_string(), format!("duplicate key: _id \"{id}\""));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn find_sorts_and_pages() {
        let store = seeded().await;
        let query = Query {
            options: QueryOptions {
                sort: Sort::by("price", SortOrder::Desc),
                limit: Some(2),
                ..QueryOptions::default()
            },
            ..Query::default()
        };
        let out = store.find(&query).await.unwrap();
        let keys: Vec<_> = out.iter().map(|d| d["key"].clone()).collect();
        assert_eq!(keys, vec![json!("cap"), json!("tee")]);
    }

    #[tokio::test]
    async fn update_without_multi_touches_the_first_match() {
        let store = seeded().await;
        let all = conditions(json!({"price": {"$gte": 1}}));
        let updates = Updates::try_from(json!({"$inc": {"stock": 3}})).unwrap();

        let single = store
            .update(&all, &updates, &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(single, UpdateResult { matched: 1, modified: 1 });

        let multi = QueryOptions {
            multi: true,
            ..QueryOptions::default()
        };
        let many = store.update(&all, &updates, &multi).await.unwrap();
        assert_eq!(many, UpdateResult { matched: 3, modified: 3 });
    }

    #[tokio::test]
    async fn updates_that_break_the_schema_are_rejected() {
        let store = seeded().await;
        let err = store
            .update(
                &conditions(json!({"key": "tee"})),
                &Updates::try_from(json!({"$set": {"product_type": "service"}})).unwrap(),
                &QueryOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "`service` is not a valid enum value for path `product_type`"
        );
    }

    #[tokio::test]
    async fn soft_delete_hides_documents_but_keeps_them() {
        let store = seeded().await;
        let removed = store
            .soft_delete(&conditions(json!({"key": "mug"})))
            .await
            .unwrap();
        assert_eq!(removed, RemoveResult { matched: 1, removed: 1 });
        assert_eq!(store.len(), 3);

        assert_eq!(store.find(&Query::default()).await.unwrap().len(), 2);
        let with_deleted = Query {
            options: QueryOptions {
                include_deleted: true,
                ..QueryOptions::default()
            },
            ..Query::default()
        };
        assert_eq!(store.find(&with_deleted).await.unwrap().len(), 3);

        let again = store
            .soft_delete(&conditions(json!({"key": "mug"})))
            .await
            .unwrap();
        assert_eq!(again.removed, 0);
    }

    #[tokio::test]
    async fn soft_delete_marks_every_match() {
        let store = seeded().await;
        let removed = store
            .soft_delete(&conditions(json!({"price": {"$gte": 10}})))
            .await
            .unwrap();
        assert_eq!(removed, RemoveResult { matched: 2, removed: 2 });
        assert_eq!(store.find(&Query::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn find_by_id_rejects_malformed_ids() {
        let store = seeded().await;
        let err = store.find_by_id("nope", &Query::default()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cast to ProductId failed for value \"nope\" at path \"_id\""
        );

        let tee = store
            .find_one(&Query {
                conditions: conditions(json!({"key": "tee"})),
                ..Query::default()
            })
            .await
            .unwrap()
            .unwrap();
        let id = tee["_id"].as_str().unwrap();
        let found = store.find_by_id(id, &Query::default()).await.unwrap();
        assert_eq!(found, Some(tee));
    }
}
