use std::time::SystemTime;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};

use crate::body::Body;
use crate::digest::ContentDigest;
use crate::freshness;
use crate::headers::{
    header_str, set_header_date, CacheControl, CONTENT_DIGEST_HEADER, ORIGIN_STATUS_HEADER,
};

/// Headers that describe a body and are dropped when one is removed (client
/// 304 downgrade). `Content-Length` is deliberately absent: HEAD delivery
/// preserves it.
const BODY_DESCRIBING_HEADERS: &[&str] = &[
    "content-type",
    "content-encoding",
    "content-language",
    "content-range",
];

/// A response flowing through the engine: fresh from the origin, or restored
/// from cache with its body referenced by content digest.
#[derive(Debug)]
pub struct CacheResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl CacheResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn cache_control(&self) -> CacheControl {
        CacheControl::parse(&self.headers)
    }

    /// Stamp a `Date` header when the origin supplied none, so that age
    /// arithmetic is always defined.
    pub fn ensure_date(&mut self, now: SystemTime) {
        if freshness::date(&self.headers).is_none() {
            set_header_date(&mut self.headers, http::header::DATE, now);
        }
    }

    pub fn age(&self, now: SystemTime) -> i64 {
        freshness::age(&self.headers, now)
    }

    pub fn ttl(&self, now: SystemTime) -> Option<i64> {
        freshness::ttl(&self.headers, now)
    }

    pub fn is_fresh(&self, now: SystemTime) -> bool {
        freshness::is_fresh(&self.headers, now)
    }

    pub fn has_freshness_info(&self) -> bool {
        freshness::max_age(&self.headers).is_some()
    }

    pub fn must_revalidate(&self) -> bool {
        freshness::must_revalidate(&self.headers)
    }

    /// Assign a freshness lifetime of `seconds` from now by adjusting
    /// `max-age` (and `s-maxage`, when present) relative to the current age.
    pub fn set_ttl(&mut self, seconds: i64, now: SystemTime) {
        let target = self.age(now) + seconds;
        let mut cc = self.cache_control();
        cc.set_max_age(target);
        if cc.s_maxage().is_some() {
            cc.set_s_maxage(target);
        }
        cc.apply(&mut self.headers);
    }

    /// Force the response to be immediately stale by zeroing its freshness
    /// lifetime. `Age` stays derived from `Date`; it is never written as a
    /// static number.
    pub fn expire(&mut self, now: SystemTime) {
        if !self.is_fresh(now) {
            return;
        }
        let mut cc = self.cache_control();
        cc.set_max_age(0);
        if cc.s_maxage().is_some() {
            cc.set_s_maxage(0);
        }
        cc.apply(&mut self.headers);
        if self.headers.contains_key(http::header::EXPIRES) {
            if let Some(date) = freshness::date(&self.headers) {
                set_header_date(&mut self.headers, http::header::EXPIRES, date);
            }
        }
    }

    pub fn etag(&self) -> Option<&str> {
        header_str(&self.headers, "etag")
    }

    pub fn last_modified(&self) -> Option<&str> {
        header_str(&self.headers, "last-modified")
    }

    pub fn vary(&self) -> Option<&str> {
        header_str(&self.headers, "vary")
    }

    pub fn is_validateable(&self) -> bool {
        freshness::is_validateable(&self.headers)
    }

    /// Whether the response may be entered into a shared cache: cacheable
    /// status, not `no-store`, not `private`, and either fresh or carrying a
    /// validator to revalidate with later.
    pub fn is_cacheable(&self, now: SystemTime) -> bool {
        if !freshness::is_cacheable_status(self.status) {
            return false;
        }
        let cc = self.cache_control();
        if cc.no_store() || cc.private() {
            return false;
        }
        self.is_validateable() || self.is_fresh(now)
    }

    /// Mark the response private so it is withheld from the shared cache.
    pub fn mark_private(&mut self) {
        let mut cc = self.cache_control();
        cc.remove("public");
        cc.set("private", None);
        cc.apply(&mut self.headers);
    }

    pub fn content_digest(&self) -> Option<ContentDigest> {
        header_str(&self.headers, CONTENT_DIGEST_HEADER).map(ContentDigest::from_hex)
    }

    pub fn set_content_digest(&mut self, digest: &ContentDigest, size: u64) {
        if let Ok(value) = HeaderValue::from_str(digest.as_str()) {
            self.headers.insert(CONTENT_DIGEST_HEADER, value);
        }
        self.headers
            .insert(http::header::CONTENT_LENGTH, HeaderValue::from(size));
    }

    /// Recompute the visible `Age` from `Date`. Stored `Age` values are
    /// never trusted verbatim.
    pub fn refresh_age(&mut self, now: SystemTime) {
        let age = self.age(now);
        self.headers
            .insert(http::header::AGE, HeaderValue::from(age.max(0) as u64));
    }

    /// Fold the revalidation headers of a 304 onto this cached response and
    /// mark where it came from. `Age` is dropped; it is recomputed from the
    /// merged `Date` at delivery.
    pub fn merge_revalidation(&mut self, revalidation_headers: &HeaderMap) {
        for name in ["date", "expires", "cache-control", "etag", "last-modified"] {
            if let Some(value) = revalidation_headers.get(name) {
                if let Ok(header) = http::header::HeaderName::try_from(name) {
                    self.headers.insert(header, value.clone());
                }
            }
        }
        self.headers.remove(http::header::AGE);
        self.headers.insert(
            ORIGIN_STATUS_HEADER,
            HeaderValue::from_static("304"),
        );
    }

    /// Downgrade to a client-facing 304: empty body, body-describing headers
    /// removed, validators left intact.
    pub fn not_modified(&mut self) {
        self.status = StatusCode::NOT_MODIFIED;
        self.body = Body::Empty;
        self.headers.remove(http::header::CONTENT_LENGTH);
        for name in BODY_DESCRIBING_HEADERS {
            self.headers.remove(*name);
        }
    }

    /// Replace the body with an already-buffered copy, e.g. after draining a
    /// stream for storage.
    pub fn set_body_bytes(&mut self, bytes: Bytes) {
        self.body = bytes.into();
    }
}
