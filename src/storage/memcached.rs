use tokio::task;

use crate::error::StoreError;

/// Shared memcached access for the remote metadata and content backends.
/// The protocol client is blocking, so every call is pushed onto the
/// blocking pool; the engine's contract treats store calls as blocking
/// anyway. Keys are namespaced when the backend URI carried a path segment.
#[derive(Clone)]
pub struct MemcachedClient {
    client: memcache::Client,
    namespace: Option<String>,
}

impl MemcachedClient {
    /// Connect to `host:port`. Fails fast: an unreachable daemon is a
    /// construction-time configuration error, not a per-request one.
    pub fn connect(address: &str, namespace: Option<String>) -> Result<Self, StoreError> {
        let url = format!("memcache://{address}");
        let client = memcache::Client::connect(url.as_str()).map_err(remote_error)?;
        Ok(Self { client, namespace })
    }

    fn scoped_key(&self, key: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}:{key}"),
            None => key.to_string(),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let client = self.client.clone();
        let key = self.scoped_key(key);
        run_blocking(move || client.get::<Vec<u8>>(&key)).await
    }

    pub async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let client = self.client.clone();
        let key = self.scoped_key(key);
        run_blocking(move || client.set(&key, value.as_slice(), 0)).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let client = self.client.clone();
        let key = self.scoped_key(key);
        run_blocking(move || client.delete(&key).map(|_| ())).await
    }
}

impl std::fmt::Debug for MemcachedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemcachedClient")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

async fn run_blocking<T, F>(call: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, memcache::MemcacheError> + Send + 'static,
{
    task::spawn_blocking(call)
        .await
        .map_err(|err| StoreError::Remote(format!("blocking task failed: {err}")))?
        .map_err(remote_error)
}

fn remote_error(err: memcache::MemcacheError) -> StoreError {
    StoreError::Remote(err.to_string())
}
