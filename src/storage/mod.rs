//! Storage backends: the content-addressable blob store, the negotiation
//! metadata store, and the URI-based resolver that constructs and caches
//! backend instances.

pub mod content;
pub mod meta;
mod memcached;
mod resolver;

pub use memcached::MemcachedClient;
pub use resolver::{Storage, StorageUri};
