//! An HTTP-semantics-aware caching engine. Sits between a server adapter
//! and an origin application, deciding per request whether to serve a
//! stored response, revalidate one, or forward untouched, and which origin
//! responses to keep.
//!
//! The engine is transport-agnostic: it consumes a parsed
//! [`CacheRequest`], calls an injected [`Origin`] capability when it needs
//! the backend, and produces a [`Delivery`] holding the response and the
//! ordered trace of decisions taken. Storage backends (in-memory,
//! filesystem, memcached) are addressed by URI through [`Storage`].

pub mod body;
pub mod digest;
pub mod engine;
pub mod error;
pub mod freshness;
pub mod headers;
pub mod key;
pub mod request;
pub mod response;
pub mod storage;

pub use body::Body;
pub use digest::ContentDigest;
pub use engine::{CacheOptions, Delivery, Engine, Origin, Overrides, Trace, TraceEvent};
pub use error::{EngineError, OriginError, StoreError};
pub use key::{canonical_key, KeyFn};
pub use request::CacheRequest;
pub use response::CacheResponse;
pub use storage::{Storage, StorageUri};
