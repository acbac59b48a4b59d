use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, Uri};

use crate::headers::header_str;

/// A parsed inbound request as the engine sees it. The engine keeps the
/// original immutable for the whole request lifecycle and derives a separate
/// forward copy that may be altered (conditional headers added or stripped)
/// before it is sent to the origin.
///
/// The body is opaque to the engine and forwarded untouched; adapters buffer
/// it (cacheable requests carry none).
#[derive(Debug, Clone)]
pub struct CacheRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CacheRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Whether the request carries a `no-cache` directive (`Cache-Control`
    /// or the legacy `Pragma` form), signalling a client-demanded reload.
    pub fn demands_reload(&self) -> bool {
        if crate::headers::CacheControl::parse(&self.headers).no_cache() {
            return true;
        }
        matches!(
            header_str(&self.headers, "pragma"),
            Some(value) if value.eq_ignore_ascii_case("no-cache")
        )
    }

    /// The request's own `max-age` directive, used to force revalidation of
    /// entries older than the client tolerates.
    pub fn max_age(&self) -> Option<i64> {
        crate::headers::CacheControl::parse(&self.headers).max_age()
    }

    /// True for methods whose responses the cache may serve: GET and HEAD.
    pub fn is_cacheable_method(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }

    /// True for methods that mutate origin state and therefore invalidate
    /// any cached entry under the same key before being passed through.
    pub fn is_unsafe_method(&self) -> bool {
        matches!(
            self.method,
            Method::POST | Method::PUT | Method::DELETE | Method::PATCH
        )
    }
}
