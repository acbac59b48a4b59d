use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::StoreError;

use super::content::{ContentStore, DiskContentStore, HeapContentStore, MemcachedContentStore};
use super::meta::{DiskMetaStore, HeapMetaStore, MemcachedMetaStore, MetaBackend, MetaStore};
use super::MemcachedClient;

const DEFAULT_MEMCACHED_PORT: u16 = 11211;

/// A parsed storage backend address. The scheme selects the backend family;
/// the rest locates the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageUri {
    /// `heap:/` — process-local, lost on restart.
    Heap,
    /// `file:/var/cache/...` or `disk:/var/cache/...` — filesystem-backed.
    Disk(PathBuf),
    /// `memcached://host:port[/namespace]` — remote daemon.
    Memcached {
        address: String,
        namespace: Option<String>,
    },
}

impl StorageUri {
    /// Parse a backend URI. Unknown schemes and malformed locators are
    /// construction-time errors; nothing here degrades at request time.
    pub fn parse(uri: &str) -> Result<Self, StoreError> {
        let (scheme, rest) = uri.split_once(':').ok_or_else(|| StoreError::InvalidUri {
            uri: uri.to_string(),
            reason: "missing scheme".to_string(),
        })?;

        match scheme {
            "heap" => Ok(StorageUri::Heap),
            "file" | "disk" => {
                let path = rest.trim_start_matches("//");
                if path.is_empty() {
                    return Err(StoreError::InvalidUri {
                        uri: uri.to_string(),
                        reason: "missing directory path".to_string(),
                    });
                }
                Ok(StorageUri::Disk(PathBuf::from(path)))
            }
            "memcached" | "memcache" => {
                let rest = rest.strip_prefix("//").ok_or_else(|| StoreError::InvalidUri {
                    uri: uri.to_string(),
                    reason: "expected memcached://host[:port][/namespace]".to_string(),
                })?;
                let (address, namespace) = match rest.split_once('/') {
                    Some((address, namespace)) if !namespace.is_empty() => {
                        (address, Some(namespace.to_string()))
                    }
                    Some((address, _)) => (address, None),
                    None => (rest, None),
                };
                if address.is_empty() {
                    return Err(StoreError::InvalidUri {
                        uri: uri.to_string(),
                        reason: "missing daemon address".to_string(),
                    });
                }
                let address = if address.contains(':') {
                    address.to_string()
                } else {
                    format!("{address}:{DEFAULT_MEMCACHED_PORT}")
                };
                Ok(StorageUri::Memcached { address, namespace })
            }
            _ => Err(StoreError::UnknownScheme {
                uri: uri.to_string(),
            }),
        }
    }
}

/// Resolves backend URIs to live store instances and hands out the same
/// instance for the same URI every time, so several engines pointed at
/// `heap:/` share one in-process cache.
#[derive(Default)]
pub struct Storage {
    meta: Mutex<HashMap<String, Arc<dyn MetaBackend>>>,
    content: Mutex<HashMap<String, Arc<dyn ContentStore>>>,
    clients: Mutex<HashMap<String, MemcachedClient>>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("meta", &self.meta.lock().keys().collect::<Vec<_>>())
            .field("content", &self.content.lock().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// The metadata store for a backend URI, constructing it on first use.
    pub fn resolve_meta(&self, uri: &str) -> Result<MetaStore, StoreError> {
        let parsed = StorageUri::parse(uri)?;
        let mut cached = self.meta.lock();
        if let Some(backend) = cached.get(uri) {
            return Ok(MetaStore::new(backend.clone()));
        }
        let backend: Arc<dyn MetaBackend> = match parsed {
            StorageUri::Heap => Arc::new(HeapMetaStore::new()),
            StorageUri::Disk(path) => Arc::new(DiskMetaStore::new(path)?),
            StorageUri::Memcached { address, namespace } => Arc::new(MemcachedMetaStore::new(
                self.memcached_client(&address, namespace)?,
            )),
        };
        trace!(uri, "constructed metadata backend");
        cached.insert(uri.to_string(), backend.clone());
        Ok(MetaStore::new(backend))
    }

    /// The content store for a backend URI, constructing it on first use.
    pub fn resolve_content(&self, uri: &str) -> Result<Arc<dyn ContentStore>, StoreError> {
        let parsed = StorageUri::parse(uri)?;
        let mut cached = self.content.lock();
        if let Some(store) = cached.get(uri) {
            return Ok(store.clone());
        }
        let store: Arc<dyn ContentStore> = match parsed {
            StorageUri::Heap => Arc::new(HeapContentStore::new()),
            StorageUri::Disk(path) => Arc::new(DiskContentStore::new(path)?),
            StorageUri::Memcached { address, namespace } => Arc::new(MemcachedContentStore::new(
                self.memcached_client(&address, namespace)?,
            )),
        };
        trace!(uri, "constructed content backend");
        cached.insert(uri.to_string(), store.clone());
        Ok(store)
    }

    /// One protocol client per daemon address and namespace, shared between
    /// the metadata and content backends pointed at it.
    fn memcached_client(
        &self,
        address: &str,
        namespace: Option<String>,
    ) -> Result<MemcachedClient, StoreError> {
        let slot = format!("{address}/{}", namespace.as_deref().unwrap_or(""));
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(&slot) {
            return Ok(client.clone());
        }
        let client = MemcachedClient::connect(address, namespace)?;
        clients.insert(slot, client.clone());
        Ok(client)
    }
}
