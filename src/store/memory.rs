use super::{Backend, DocumentDb, StoredDoc};
use crate::core::store::StoreError;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Volatile backend, used for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryBackend {
    docs: RwLock<BTreeMap<String, StoredDoc>>,
}

pub type MemoryStore = DocumentDb<MemoryBackend>;

impl MemoryStore {
    pub fn new() -> Self {
        DocumentDb::with_backend(MemoryBackend::default())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("memory store lock poisoned".to_string())
}

impl Backend for MemoryBackend {
    fn read(&self, path: &str) -> Result<Option<StoredDoc>, StoreError> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.get(path).cloned())
    }

    fn write(&self, path: &str, doc: &StoredDoc) -> Result<(), StoreError> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        docs.insert(path.to_string(), doc.clone());
        Ok(())
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, StoredDoc)>, StoreError> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, doc)| (path.clone(), doc.clone()))
            .collect())
    }
}
