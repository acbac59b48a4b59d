//! Canonical cache keys and `Vary`-based request equivalence.

use std::borrow::Cow;
use std::sync::Arc;

use http::HeaderMap;
use percent_encoding::percent_decode_str;

use crate::headers::header_str;
use crate::request::CacheRequest;

/// Caller-supplied replacement for the default canonical key.
pub type KeyFn = Arc<dyn Fn(&CacheRequest) -> String + Send + Sync>;

/// Canonicalize a request into its cache key:
/// `scheme://host[:port]path[?query]`, with the default port elided and
/// query parameters sorted by decoded key then decoded value. Each pair's
/// percent-encoding is preserved verbatim; decoding is used only to order
/// them. The `?` is omitted entirely when there is no query string.
pub fn canonical_key(request: &CacheRequest) -> String {
    let uri = &request.uri;
    let scheme = uri.scheme_str().unwrap_or("http");
    let host = uri.host().unwrap_or("");
    let mut key = format!("{scheme}://{host}");

    if let Some(port) = uri.port_u16() {
        let default = match scheme {
            "https" => 443,
            _ => 80,
        };
        if port != default {
            key.push(':');
            key.push_str(&port.to_string());
        }
    }

    let path = uri.path();
    if path.is_empty() {
        key.push('/');
    } else {
        key.push_str(path);
    }

    if let Some(query) = uri.query() {
        if let Some(sorted) = sorted_query(query) {
            key.push('?');
            key.push_str(&sorted);
        }
    }
    key
}

fn sorted_query(query: &str) -> Option<String> {
    if query.is_empty() {
        return None;
    }
    let mut pairs: Vec<&str> = query
        .split(['&', ';'])
        .filter(|pair| !pair.is_empty())
        .collect();
    if pairs.is_empty() {
        return None;
    }
    pairs.sort_by_key(|pair| {
        let (key, value) = match pair.split_once('=') {
            Some((key, value)) => (key, value),
            None => (*pair, ""),
        };
        (decode(key), decode(value))
    });
    Some(pairs.join("&"))
}

fn decode(text: &str) -> String {
    match percent_decode_str(text).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => Cow::Borrowed(text).into_owned(),
    }
}

/// Header names listed in a `Vary` value, lowercased. `*` is passed through
/// and handled by the matcher.
pub fn vary_fields(vary: &str) -> Vec<String> {
    vary.split([',', ' ', '\t'])
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

/// The subset of request headers named by `vary`, recorded with the stored
/// variant so later requests can be checked for equivalence.
pub fn vary_fingerprint(vary: &str, request_headers: &HeaderMap) -> Vec<(String, String)> {
    vary_fields(vary)
        .into_iter()
        .filter(|name| name != "*")
        .filter_map(|name| {
            let value = header_str(request_headers, &name)?.to_string();
            Some((name, value))
        })
        .collect()
}

/// Whether a request is equivalent to a stored fingerprint under the given
/// `Vary` value. An empty or absent `Vary` always matches; `Vary: *` never
/// matches, so such entries are always revalidated.
pub fn requests_match(
    vary: Option<&str>,
    fingerprint: &[(String, String)],
    request_headers: &HeaderMap,
) -> bool {
    let vary = match vary {
        None => return true,
        Some(value) if value.trim().is_empty() => return true,
        Some(value) => value,
    };
    let fields = vary_fields(vary);
    if fields.iter().any(|field| field == "*") {
        return false;
    }
    fields.iter().all(|field| {
        let stored = fingerprint
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str());
        let current = header_str(request_headers, field);
        stored == current
    })
}
