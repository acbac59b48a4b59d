//! Content-addressable body storage. Blobs are keyed by the digest of their
//! bytes, never rewritten once present, and shared freely between metadata
//! variants; only an explicit purge removes one.

mod disk;
mod heap;
mod memcached;

use async_trait::async_trait;
use bytes::Bytes;

use crate::body::Body;
use crate::digest::ContentDigest;
use crate::error::StoreError;

pub use disk::DiskContentStore;
pub use heap::HeapContentStore;
pub use memcached::MemcachedContentStore;

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Consume the body, hashing while buffering or streaming, and place the
    /// bytes under their digest. Writing content that is already present is
    /// a no-op beyond confirming existence. Sources may be iterable only
    /// once; the bytes are observed exactly one time.
    async fn write(&self, body: Body) -> Result<(ContentDigest, u64), StoreError>;

    /// All bytes for the digest, or `None` when absent.
    async fn read(&self, digest: &ContentDigest) -> Result<Option<Bytes>, StoreError>;

    /// A streamable body for the digest, or `None` when absent.
    async fn open(&self, digest: &ContentDigest) -> Result<Option<Body>, StoreError>;

    async fn exists(&self, digest: &ContentDigest) -> Result<bool, StoreError>;

    /// Remove the blob. Idempotent; absent digests are not an error.
    async fn purge(&self, digest: &ContentDigest) -> Result<(), StoreError>;
}
