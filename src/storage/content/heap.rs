use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::body::Body;
use crate::digest::ContentDigest;
use crate::error::StoreError;

use super::ContentStore;

/// In-memory blob store backed by a hash map.
#[derive(Debug, Default)]
pub struct HeapContentStore {
    blobs: RwLock<HashMap<ContentDigest, Bytes>>,
}

impl HeapContentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for HeapContentStore {
    async fn write(&self, body: Body) -> Result<(ContentDigest, u64), StoreError> {
        let bytes = body.into_bytes().await?;
        let digest = ContentDigest::of(&bytes);
        let size = bytes.len() as u64;
        let mut blobs = self.blobs.write();
        // Identical content converges on one entry; never rewrite.
        blobs.entry(digest.clone()).or_insert(bytes);
        Ok((digest, size))
    }

    async fn read(&self, digest: &ContentDigest) -> Result<Option<Bytes>, StoreError> {
        Ok(self.blobs.read().get(digest).cloned())
    }

    async fn open(&self, digest: &ContentDigest) -> Result<Option<Body>, StoreError> {
        Ok(self.read(digest).await?.map(Body::from))
    }

    async fn exists(&self, digest: &ContentDigest) -> Result<bool, StoreError> {
        Ok(self.blobs.read().contains_key(digest))
    }

    async fn purge(&self, digest: &ContentDigest) -> Result<(), StoreError> {
        self.blobs.write().remove(digest);
        Ok(())
    }
}
