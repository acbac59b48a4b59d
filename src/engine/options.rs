use std::fmt;
use std::time::Duration;

use crate::key::KeyFn;

/// Engine-wide behavior knobs, fixed at construction and optionally adjusted
/// per request with [`Overrides`].
#[derive(Clone)]
pub struct CacheOptions {
    /// Forward every request to the origin untouched, never consulting or
    /// filling the cache.
    pub force_pass: bool,

    /// Honor a client `no-cache` directive by refetching unconditionally.
    /// Off by default: clients cannot force origin traffic unless the
    /// deployment opts in.
    pub allow_reload: bool,

    /// Honor a client `max-age` tighter than the cached entry's age by
    /// revalidating instead of serving fresh.
    pub allow_revalidate: bool,

    /// Serve a stale cached entry when revalidation cannot reach the origin,
    /// instead of propagating the failure.
    pub fault_tolerant: bool,

    /// Freshness lifetime in seconds assigned to cacheable responses that
    /// carry no freshness information of their own. `None` stores such
    /// responses only when they carry a validator.
    pub default_ttl: Option<i64>,

    /// Further origin attempts after a connection failure, before giving up
    /// (or falling back to a stale entry when fault tolerant).
    pub max_retries: u32,

    /// Deadline for a single origin attempt. Expiry counts as a connection
    /// failure and feeds the retry path.
    pub origin_timeout: Option<Duration>,

    /// Response headers stripped before storing.
    pub ignore_headers: Vec<String>,

    /// Request headers that mark a request as personal: responses to such
    /// requests are withheld from the cache unless explicitly public.
    pub private_headers: Vec<String>,

    /// Replacement for the default canonical key derivation.
    pub cache_key: Option<KeyFn>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            force_pass: false,
            allow_reload: false,
            allow_revalidate: false,
            fault_tolerant: false,
            default_ttl: None,
            max_retries: 0,
            origin_timeout: None,
            ignore_headers: vec!["set-cookie".to_string()],
            private_headers: vec!["authorization".to_string(), "cookie".to_string()],
            cache_key: None,
        }
    }
}

impl CacheOptions {
    /// The effective options for one request: these options with the sparse
    /// overrides applied on top.
    pub fn merged(&self, overrides: &Overrides) -> CacheOptions {
        let mut options = self.clone();
        if let Some(force_pass) = overrides.force_pass {
            options.force_pass = force_pass;
        }
        if let Some(allow_reload) = overrides.allow_reload {
            options.allow_reload = allow_reload;
        }
        if let Some(allow_revalidate) = overrides.allow_revalidate {
            options.allow_revalidate = allow_revalidate;
        }
        if let Some(fault_tolerant) = overrides.fault_tolerant {
            options.fault_tolerant = fault_tolerant;
        }
        if let Some(default_ttl) = overrides.default_ttl {
            options.default_ttl = Some(default_ttl);
        }
        if let Some(max_retries) = overrides.max_retries {
            options.max_retries = max_retries;
        }
        if let Some(origin_timeout) = overrides.origin_timeout {
            options.origin_timeout = Some(origin_timeout);
        }
        if let Some(ignore_headers) = &overrides.ignore_headers {
            options.ignore_headers = ignore_headers.clone();
        }
        if let Some(private_headers) = &overrides.private_headers {
            options.private_headers = private_headers.clone();
        }
        if let Some(cache_key) = &overrides.cache_key {
            options.cache_key = Some(cache_key.clone());
        }
        options
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("force_pass", &self.force_pass)
            .field("allow_reload", &self.allow_reload)
            .field("allow_revalidate", &self.allow_revalidate)
            .field("fault_tolerant", &self.fault_tolerant)
            .field("default_ttl", &self.default_ttl)
            .field("max_retries", &self.max_retries)
            .field("origin_timeout", &self.origin_timeout)
            .field("ignore_headers", &self.ignore_headers)
            .field("private_headers", &self.private_headers)
            .field("cache_key", &self.cache_key.as_ref().map(|_| "<custom>"))
            .finish()
    }
}

/// Sparse per-request adjustments to [`CacheOptions`]. Unset fields leave
/// the engine-wide value in force.
#[derive(Clone, Default)]
pub struct Overrides {
    pub force_pass: Option<bool>,
    pub allow_reload: Option<bool>,
    pub allow_revalidate: Option<bool>,
    pub fault_tolerant: Option<bool>,
    pub default_ttl: Option<i64>,
    pub max_retries: Option<u32>,
    pub origin_timeout: Option<Duration>,
    pub ignore_headers: Option<Vec<String>>,
    pub private_headers: Option<Vec<String>>,
    pub cache_key: Option<KeyFn>,
}

impl fmt::Debug for Overrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overrides")
            .field("force_pass", &self.force_pass)
            .field("allow_reload", &self.allow_reload)
            .field("allow_revalidate", &self.allow_revalidate)
            .field("fault_tolerant", &self.fault_tolerant)
            .field("default_ttl", &self.default_ttl)
            .field("max_retries", &self.max_retries)
            .field("origin_timeout", &self.origin_timeout)
            .field("ignore_headers", &self.ignore_headers)
            .field("private_headers", &self.private_headers)
            .field("cache_key", &self.cache_key.as_ref().map(|_| "<custom>"))
            .finish()
    }
}
