use std::time::SystemTime;

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;

/// Bookkeeping header naming the content store blob that holds the body of a
/// cached response. Required internally; deployments that want it hidden
/// strip it at the adapter.
pub const CONTENT_DIGEST_HEADER: &str = "x-content-digest";

/// Set on a cached entry that was revived via a 304 revalidation, for
/// diagnostics.
pub const ORIGIN_STATUS_HEADER: &str = "x-origin-status";

/// Hop-by-hop headers (RFC 2616 §13.5.1) that must never be persisted with a
/// cached response.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|hop| hop.eq_ignore_ascii_case(name))
}

/// Parsed `Cache-Control` header: directive names (lowercased) mapped to
/// their optional values, in a deterministic order so mutation re-renders
/// stably.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    directives: std::collections::BTreeMap<String, Option<String>>,
}

impl CacheControl {
    pub fn parse(headers: &HeaderMap) -> Self {
        let mut directives = std::collections::BTreeMap::new();
        for value in headers.get_all(http::header::CACHE_CONTROL) {
            let Ok(text) = value.to_str() else { continue };
            for part in text.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                match part.split_once('=') {
                    Some((name, value)) => {
                        directives.insert(
                            name.trim().to_ascii_lowercase(),
                            Some(value.trim().trim_matches('"').to_string()),
                        );
                    }
                    None => {
                        directives.insert(part.to_ascii_lowercase(), None);
                    }
                }
            }
        }
        Self { directives }
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    pub fn has(&self, directive: &str) -> bool {
        self.directives.contains_key(directive)
    }

    fn seconds(&self, directive: &str) -> Option<i64> {
        self.directives
            .get(directive)?
            .as_deref()
            .and_then(|value| value.parse().ok())
    }

    pub fn max_age(&self) -> Option<i64> {
        self.seconds("max-age")
    }

    pub fn s_maxage(&self) -> Option<i64> {
        self.seconds("s-maxage")
    }

    pub fn no_cache(&self) -> bool {
        self.has("no-cache")
    }

    pub fn no_store(&self) -> bool {
        self.has("no-store")
    }

    pub fn public(&self) -> bool {
        self.has("public")
    }

    pub fn private(&self) -> bool {
        self.has("private")
    }

    pub fn must_revalidate(&self) -> bool {
        self.has("must-revalidate") || self.has("proxy-revalidate")
    }

    pub fn set(&mut self, directive: &str, value: Option<String>) {
        self.directives.insert(directive.to_string(), value);
    }

    pub fn set_max_age(&mut self, seconds: i64) {
        self.set("max-age", Some(seconds.to_string()));
    }

    pub fn set_s_maxage(&mut self, seconds: i64) {
        self.set("s-maxage", Some(seconds.to_string()));
    }

    pub fn remove(&mut self, directive: &str) {
        self.directives.remove(directive);
    }

    pub fn render(&self) -> String {
        let mut parts = Vec::with_capacity(self.directives.len());
        for (name, value) in &self.directives {
            match value {
                Some(value) => parts.push(format!("{name}={value}")),
                None => parts.push(name.clone()),
            }
        }
        parts.join(", ")
    }

    /// Write the directive set back onto the header map, removing the header
    /// entirely when no directives remain.
    pub fn apply(&self, headers: &mut HeaderMap) {
        if self.directives.is_empty() {
            headers.remove(http::header::CACHE_CONTROL);
            return;
        }
        if let Ok(value) = HeaderValue::from_str(&self.render()) {
            headers.insert(http::header::CACHE_CONTROL, value);
        }
    }
}

/// Read a header as an HTTP date.
pub fn header_date(headers: &HeaderMap, name: &HeaderName) -> Option<SystemTime> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|text| httpdate::parse_http_date(text).ok())
}

/// Write a header as an HTTP date.
pub fn set_header_date(headers: &mut HeaderMap, name: HeaderName, time: SystemTime) {
    if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(time)) {
        headers.insert(name, value);
    }
}

pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Flatten a header map into persistable string pairs. Values that are not
/// valid UTF-8 are dropped; cached responses only carry textual headers.
pub fn headermap_to_vec(map: &HeaderMap) -> Vec<(String, String)> {
    let mut items = Vec::with_capacity(map.len());
    for (name, value) in map.iter() {
        if let Ok(text) = value.to_str() {
            items.push((name.as_str().to_string(), text.to_string()));
        }
    }
    items
}

pub fn vec_to_headermap(items: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in items {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::from_str(value),
        ) {
            map.append(name, value);
        }
    }
    map
}
