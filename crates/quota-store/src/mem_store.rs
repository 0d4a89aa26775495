use crate::{PersistenceStore, StoreResult, validate_key};
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

#[derive(Clone, Default)]
pub struct MemStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl std::fmt::Debug for MemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.blobs.read().map(|guard| guard.len()).unwrap_or(0);
        f.debug_struct("MemStore").field("blobs", &len).finish()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PersistenceStore for MemStore {
    fn load(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        validate_key(key)?;
        let guard = self.blobs.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(guard.get(key).cloned())
    }

    fn save(&self, key: &str, blob: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        let mut guard = self
            .blobs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.insert(key.to_string(), blob.to_vec());
        Ok(())
    }
}
