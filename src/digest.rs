use std::fmt;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Content digest used to address blobs in the content store: the
/// lowercase-hex SHA-1 of the body bytes. The value is the storage key and
/// must be identical across backends for identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(bytes);
        hasher.finish()
    }

    /// Accepts a previously rendered digest, e.g. read back from a stored
    /// `X-Content-Digest` header.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        ContentDigest(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental digest state for hash-while-writing paths.
pub struct Hasher {
    inner: Sha1,
}

impl Hasher {
    pub fn new() -> Self {
        Self { inner: Sha1::new() }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    pub fn finish(self) -> ContentDigest {
        ContentDigest(hex::encode(self.inner.finalize()))
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_sha1_hex() {
        let digest = ContentDigest::of(b"Hello World");
        assert_eq!(digest.as_str(), "0a4d55a8d778e5022fab701977c5d840bbc486d0");
    }

    #[test]
    fn incremental_hashing_matches_one_shot() {
        let mut hasher = Hasher::new();
        hasher.update(b"Hello ");
        hasher.update(b"World");
        assert_eq!(hasher.finish(), ContentDigest::of(b"Hello World"));
    }
}
