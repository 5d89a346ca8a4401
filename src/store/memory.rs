use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{Document, DocumentStore, StoreError};

/// In-process store with the same merge / append semantics as Firestore.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, HashMap<String, Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, collection: &str, doc_id: &str) -> Option<Document> {
        let guard = self.collections.lock().ok()?;
        guard.get(collection)?.get(doc_id).cloned()
    }

    pub fn documents(&self, collection: &str) -> Vec<(String, Document)> {
        let Ok(guard) = self.collections.lock() else { return vec![] };
        let mut out: Vec<(String, Document)> = guard
            .get(collection)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .map(|g| g.get(collection).map_or(0, |c| c.len()))
            .unwrap_or(0)
    }

    /// Writes `doc` verbatim, bypassing merge. Used to simulate out-of-band edits.
    pub fn put(&self, collection: &str, doc_id: &str, doc: Document) {
        if let Ok(mut guard) = self.collections.lock() {
            guard
                .entry(collection.to_string())
                .or_default()
                .insert(doc_id.to_string(), doc);
        }
    }
}

fn poisoned() -> StoreError {
    StoreError::Protocol("memory store lock poisoned".to_string())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn commit_merge(
        &self,
        collection: &str,
        docs: Vec<(String, Document)>,
    ) -> Result<(), StoreError> {
        let mut guard = self.collections.lock().map_err(|_| poisoned())?;
        let coll = guard.entry(collection.to_string()).or_default();
        for (id, fields) in docs {
            coll.entry(id).or_default().extend(fields);
        }
        Ok(())
    }

    async fn append(&self, collection: &str, doc: Document) -> Result<String, StoreError> {
        let mut guard = self.collections.lock().map_err(|_| poisoned())?;
        let coll = guard.entry(collection.to_string()).or_default();
        let id = Uuid::new_v4().to_string();
        coll.insert(id.clone(), doc);
        Ok(id)
    }
}
