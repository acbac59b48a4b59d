use async_trait::async_trait;
use bytes::Bytes;

use crate::body::Body;
use crate::digest::ContentDigest;
use crate::error::StoreError;
use crate::storage::MemcachedClient;

use super::ContentStore;

/// Remote blob store on a memcached-style daemon. Bodies are buffered fully
/// before the round-trip; the daemon's own expiry policy is its business
/// (eviction is a backend concern).
#[derive(Debug, Clone)]
pub struct MemcachedContentStore {
    client: MemcachedClient,
}

impl MemcachedContentStore {
    pub fn new(client: MemcachedClient) -> Self {
        Self { client }
    }

    fn blob_key(digest: &ContentDigest) -> String {
        format!("content:{digest}")
    }
}

#[async_trait]
impl ContentStore for MemcachedContentStore {
    async fn write(&self, body: Body) -> Result<(ContentDigest, u64), StoreError> {
        let bytes = body.into_bytes().await?;
        let digest = ContentDigest::of(&bytes);
        let size = bytes.len() as u64;
        let key = Self::blob_key(&digest);
        // Same-content writes race benignly: both store identical bytes
        // under the same key.
        if self.client.get(&key).await?.is_none() {
            self.client.set(&key, bytes.to_vec()).await?;
        }
        Ok((digest, size))
    }

    async fn read(&self, digest: &ContentDigest) -> Result<Option<Bytes>, StoreError> {
        Ok(self
            .client
            .get(&Self::blob_key(digest))
            .await?
            .map(Bytes::from))
    }

    async fn open(&self, digest: &ContentDigest) -> Result<Option<Body>, StoreError> {
        Ok(self.read(digest).await?.map(Body::from))
    }

    async fn exists(&self, digest: &ContentDigest) -> Result<bool, StoreError> {
        Ok(self.client.get(&Self::blob_key(digest)).await?.is_some())
    }

    async fn purge(&self, digest: &ContentDigest) -> Result<(), StoreError> {
        self.client.delete(&Self::blob_key(digest)).await
    }
}
