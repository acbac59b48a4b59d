//! Pure freshness and validator arithmetic over header data. All functions
//! take an explicit `now` so the engine observes one consistent clock per
//! request and tests can pin time.

use std::time::SystemTime;

use http::HeaderMap;

use crate::headers::{header_date, header_str, CacheControl};

/// Status codes that a shared cache may store (RFC 2616).
pub const CACHEABLE_STATUSES: &[u16] = &[200, 203, 300, 301, 302, 404, 410];

pub fn is_cacheable_status(status: http::StatusCode) -> bool {
    CACHEABLE_STATUSES.contains(&status.as_u16())
}

/// The response `Date`, when present and parseable.
pub fn date(headers: &HeaderMap) -> Option<SystemTime> {
    header_date(headers, &http::header::DATE)
}

/// Seconds elapsed since the response `Date`, floored at zero. A response
/// without a `Date` has no measurable age. Age is always derived here, never
/// read back from a stored header.
pub fn age(headers: &HeaderMap, now: SystemTime) -> i64 {
    match date(headers) {
        Some(date) => match now.duration_since(date) {
            Ok(elapsed) => elapsed.as_secs() as i64,
            Err(_) => 0,
        },
        None => 0,
    }
}

/// Freshness lifetime in seconds: `s-maxage`, else `max-age`, else
/// `Expires - Date`. Negative when `Expires` is already in the past.
pub fn max_age(headers: &HeaderMap) -> Option<i64> {
    let cc = CacheControl::parse(headers);
    if let Some(seconds) = cc.s_maxage() {
        return Some(seconds);
    }
    if let Some(seconds) = cc.max_age() {
        return Some(seconds);
    }
    let expires = header_date(headers, &http::header::EXPIRES)?;
    let date = date(headers)?;
    Some(signed_seconds_between(date, expires))
}

/// Remaining time to live: `max_age - age`. `None` when the response carries
/// no freshness information at all.
pub fn ttl(headers: &HeaderMap, now: SystemTime) -> Option<i64> {
    Some(max_age(headers)? - age(headers, now))
}

pub fn is_fresh(headers: &HeaderMap, now: SystemTime) -> bool {
    matches!(ttl(headers, now), Some(remaining) if remaining > 0)
}

/// Whether the response forbids default-TTL assignment.
pub fn must_revalidate(headers: &HeaderMap) -> bool {
    CacheControl::parse(headers).must_revalidate()
}

/// Whether the response carries anything a conditional request could
/// revalidate against.
pub fn is_validateable(headers: &HeaderMap) -> bool {
    headers.contains_key(http::header::ETAG)
        || headers.contains_key(http::header::LAST_MODIFIED)
}

/// Match a response's validators against a client's conditional headers.
///
/// Comparison is exact string equality, per the storage model: validators
/// round-trip through the cache verbatim. When the client sent both
/// conditionals, both must match; when it sent neither, there is no match.
pub fn validators_match(response_headers: &HeaderMap, request_headers: &HeaderMap) -> bool {
    let if_none_match = header_str(request_headers, "if-none-match");
    let if_modified_since = header_str(request_headers, "if-modified-since");
    if if_none_match.is_none() && if_modified_since.is_none() {
        return false;
    }

    if let Some(candidate) = if_none_match {
        match header_str(response_headers, "etag") {
            Some(etag) if etag == candidate => {}
            _ => return false,
        }
    }
    if let Some(candidate) = if_modified_since {
        match header_str(response_headers, "last-modified") {
            Some(last_modified) if last_modified == candidate => {}
            _ => return false,
        }
    }
    true
}

fn signed_seconds_between(from: SystemTime, to: SystemTime) -> i64 {
    match to.duration_since(from) {
        Ok(forward) => forward.as_secs() as i64,
        Err(err) => -(err.duration().as_secs() as i64),
    }
}
