//! Negotiation metadata storage: for each canonical cache key, an ordered
//! list of variants — one per distinct `Vary` fingerprint — referencing
//! their bodies in the content store by digest.

mod disk;
mod heap;
mod memcached;

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::StoreError;
use crate::headers::{headermap_to_vec, is_hop_by_hop, vec_to_headermap};
use crate::key::{requests_match, vary_fingerprint};
use crate::request::CacheRequest;
use crate::response::CacheResponse;
use crate::storage::content::ContentStore;

pub use disk::DiskMetaStore;
pub use heap::HeapMetaStore;
pub use memcached::MemcachedMetaStore;

/// One cached response under a key: the request header fields its `Vary`
/// named at store time, plus the persisted response head. The body lives in
/// the content store, referenced by the digest bookkeeping header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub request_fingerprint: Vec<(String, String)>,
    pub status: u16,
    pub response_headers: Vec<(String, String)>,
}

impl Variant {
    fn vary(&self) -> Option<&str> {
        self.response_headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("vary"))
            .map(|(_, value)| value.as_str())
    }

    fn matches(&self, request: &CacheRequest) -> bool {
        requests_match(self.vary(), &self.request_fingerprint, &request.headers)
    }
}

/// Low-level metadata persistence. Implementations keep these dumb: read a
/// variant list, write one back verbatim, drop a key. The read-modify-write
/// done above them is last-write-wins by contract.
#[async_trait]
pub trait MetaBackend: Send + Sync {
    /// The variant list for a key; empty when the key has never been stored.
    async fn read(&self, key: &str) -> Result<Vec<Variant>, StoreError>;

    async fn write(&self, key: &str, variants: Vec<Variant>) -> Result<(), StoreError>;

    /// Remove all variants under the key. Quiet when the key is absent.
    async fn purge(&self, key: &str) -> Result<(), StoreError>;
}

/// Backend-agnostic metadata operations: variant selection on lookup,
/// replace-then-prepend on store, in-place expiry on invalidate.
#[derive(Clone)]
pub struct MetaStore {
    backend: Arc<dyn MetaBackend>,
}

impl MetaStore {
    pub fn new(backend: Arc<dyn MetaBackend>) -> Self {
        Self { backend }
    }

    /// Locate a cached response for the request. The first variant whose
    /// own `Vary` matches wins; a populated key with no matching variant is
    /// a negotiation miss. A missing or unopenable body blob is also a miss:
    /// the metadata entry is left in place for a later overwrite or purge.
    pub async fn lookup(
        &self,
        key: &str,
        request: &CacheRequest,
        content: &dyn ContentStore,
        now: SystemTime,
    ) -> Result<Option<CacheResponse>, StoreError> {
        let variants = self.backend.read(key).await?;
        if variants.is_empty() {
            return Ok(None);
        }

        let Some(variant) = variants.iter().find(|variant| variant.matches(request)) else {
            trace!(key, "no variant matched request negotiation headers");
            return Ok(None);
        };

        let headers = vec_to_headermap(&variant.response_headers);
        let mut response = CacheResponse::new(
            StatusCode::from_u16(variant.status).unwrap_or(StatusCode::OK),
        );
        response.headers = headers;

        let Some(digest) = response.content_digest() else {
            warn!(key, "cached variant carries no content digest; treating as miss");
            return Ok(None);
        };
        match content.open(&digest).await {
            Ok(Some(body)) => response.body = body,
            Ok(None) => {
                warn!(key, digest = %digest, "cached body missing from content store");
                return Ok(None);
            }
            Err(err) => {
                warn!(key, digest = %digest, error = %err, "content store failed on open");
                return Ok(None);
            }
        }

        response.refresh_age(now);
        Ok(Some(response))
    }

    /// Persist a response under the key. Writes the body to the content
    /// store only when this is an original response (no digest attached
    /// yet); drops any existing variant with the same `Vary` fingerprint and
    /// prepends the new one, so the freshest variant is scanned first.
    pub async fn store(
        &self,
        key: &str,
        request: &CacheRequest,
        response: &mut CacheResponse,
        content: &dyn ContentStore,
    ) -> Result<(), StoreError> {
        let names: Vec<String> = response
            .headers
            .keys()
            .filter(|name| is_hop_by_hop(name.as_str()))
            .map(|name| name.as_str().to_string())
            .collect();
        for name in names {
            response.headers.remove(name);
        }

        if response.content_digest().is_none() {
            let body = std::mem::take(&mut response.body);
            let (digest, size) = content.write(body).await?;
            response.set_content_digest(&digest, size);
            response.body = content.open(&digest).await?.ok_or_else(|| {
                StoreError::MissingContent {
                    digest: digest.to_string(),
                }
            })?;
        }

        let vary = response.vary().map(str::to_string);
        let fingerprint = match &vary {
            Some(vary) => vary_fingerprint(vary, &request.headers),
            None => Vec::new(),
        };
        let variant = Variant {
            request_fingerprint: fingerprint,
            status: response.status.as_u16(),
            response_headers: headermap_to_vec(&response.headers),
        };

        let mut variants = self.backend.read(key).await?;
        variants.retain(|existing| {
            !(existing.vary() == vary.as_deref()
                && requests_match(
                    vary.as_deref(),
                    &existing.request_fingerprint,
                    &request.headers,
                ))
        });
        variants.insert(0, variant);
        trace!(key, variants = variants.len(), "persisting variant list");
        self.backend.write(key, variants).await
    }

    /// Expire every still-fresh variant under the key in place, so the next
    /// lookup falls through to revalidation. Quiet no-op for unknown keys.
    /// Entries are rewritten, never deleted; bodies stay addressable.
    pub async fn invalidate(&self, key: &str, now: SystemTime) -> Result<(), StoreError> {
        let variants = self.backend.read(key).await?;
        if variants.is_empty() {
            return Ok(());
        }

        let mut modified = false;
        let variants = variants
            .into_iter()
            .map(|mut variant| {
                let mut response = CacheResponse::new(
                    StatusCode::from_u16(variant.status).unwrap_or(StatusCode::OK),
                );
                response.headers = vec_to_headermap(&variant.response_headers);
                if response.is_fresh(now) {
                    response.expire(now);
                    variant.response_headers = headermap_to_vec(&response.headers);
                    modified = true;
                }
                variant
            })
            .collect();

        if modified {
            trace!(key, "invalidated cached variants");
            self.backend.write(key, variants).await?;
        }
        Ok(())
    }

    /// Drop the whole record for a key.
    pub async fn purge(&self, key: &str) -> Result<(), StoreError> {
        self.backend.purge(key).await
    }

    #[cfg(test)]
    pub(crate) async fn raw_read(&self, key: &str) -> Result<Vec<Variant>, StoreError> {
        self.backend.read(key).await
    }

    #[cfg(test)]
    pub(crate) async fn raw_write_for_tests(
        &self,
        key: &str,
        variants: Vec<Variant>,
    ) -> Result<(), StoreError> {
        self.backend.write(key, variants).await
    }
}
