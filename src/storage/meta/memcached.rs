use async_trait::async_trait;

use crate::digest::ContentDigest;
use crate::error::StoreError;
use crate::storage::MemcachedClient;

use super::{MetaBackend, Variant};

/// Remote metadata backend on a memcached-style daemon. Variant lists are
/// JSON documents keyed by the digest of the cache key, so arbitrary URIs
/// stay within the daemon's key length and character limits.
#[derive(Debug, Clone)]
pub struct MemcachedMetaStore {
    client: MemcachedClient,
}

impl MemcachedMetaStore {
    pub fn new(client: MemcachedClient) -> Self {
        Self { client }
    }

    fn entry_key(key: &str) -> String {
        format!("meta:{}", ContentDigest::of(key.as_bytes()))
    }
}

#[async_trait]
impl MetaBackend for MemcachedMetaStore {
    async fn read(&self, key: &str) -> Result<Vec<Variant>, StoreError> {
        match self.client.get(&Self::entry_key(key)).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    async fn write(&self, key: &str, variants: Vec<Variant>) -> Result<(), StoreError> {
        let document = serde_json::to_vec(&variants)?;
        self.client.set(&Self::entry_key(key), document).await
    }

    async fn purge(&self, key: &str) -> Result<(), StoreError> {
        self.client.delete(&Self::entry_key(key)).await
    }
}
