use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document must be a JSON object")]
    NotAnObject,
}

/// Collection-oriented document storage the lead forms write into.
pub trait DocumentStore: Send + Sync {
    fn add(&self, collection: &str, doc: Value) -> Result<String, StoreError>;
    #[cfg(test)]
    fn get(&self, collection: &str, id: &str) -> Option<Value>;
    fn count(&self, collection: &str) -> usize;
}

// In-process store - collection -> (id -> document)
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: DashMap<String, DashMap<String, Value>>,
    next_id: AtomicU64,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn add(&self, collection: &str, mut doc: Value) -> Result<String, StoreError> {
        let fields = doc.as_object_mut().ok_or(StoreError::NotAnObject)?;
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("{}-{:06}", collection, seq);
        fields.insert("id".into(), Value::String(id.clone()));
        fields.insert("createdAt".into(), Value::String(chrono::Utc::now().to_rfc3339()));

        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), doc);
        Ok(id)
    }

    #[cfg(test)]
    fn get(&self, collection: &str, id: &str) -> Option<Value> {
        self.collections
            .get(collection)
            .and_then(|docs| docs.get(id).map(|d| d.clone()))
    }

    fn count(&self, collection: &str) -> usize {
        self.collections.get(collection).map(|docs| docs.len()).unwrap_or(0)
    }
}
