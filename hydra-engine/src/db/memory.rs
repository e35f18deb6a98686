//! In-memory document store

use super::{index_fields, Collection, DocumentQuery, DocumentStore, DocumentWrite, IndexFields};
use async_trait::async_trait;
use hydra_common::Result;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// `DocumentStore` held in process memory
///
/// Batches are applied under one write lock, so they are atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection
    pub async fn len(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .await
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>> {
        Ok(self
            .collections
            .read()
            .await
            .get(&collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    async fn set(&self, collection: Collection, key: &str, value: Value) -> Result<()> {
        self.collections
            .write()
            .await
            .entry(collection)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn query(&self, query: &DocumentQuery) -> Result<Vec<Value>> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(&query.collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<(IndexFields, &String, &Value)> = docs
            .iter()
            .map(|(key, value)| (index_fields(value), key, value))
            .filter(|(index, _, _)| query.matches(index))
            .collect();
        hits.sort_by(|a, b| (a.0.recorded_at_ms, a.1).cmp(&(b.0.recorded_at_ms, b.1)));

        Ok(hits.into_iter().map(|(_, _, value)| value.clone()).collect())
    }

    async fn write_batch(&self, writes: Vec<DocumentWrite>) -> Result<()> {
        let mut collections = self.collections.write().await;
        for write in writes {
            collections
                .entry(write.collection)
                .or_default()
                .insert(write.key, write.value);
        }
        Ok(())
    }
}
