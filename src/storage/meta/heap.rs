use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StoreError;

use super::{MetaBackend, Variant};

/// In-memory metadata backend backed by a hash map.
#[derive(Debug, Default)]
pub struct HeapMetaStore {
    entries: RwLock<HashMap<String, Vec<Variant>>>,
}

impl HeapMetaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetaBackend for HeapMetaStore {
    async fn read(&self, key: &str) -> Result<Vec<Variant>, StoreError> {
        Ok(self.entries.read().get(key).cloned().unwrap_or_default())
    }

    async fn write(&self, key: &str, variants: Vec<Variant>) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_string(), variants);
        Ok(())
    }

    async fn purge(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }
}
