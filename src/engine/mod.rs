//! The per-request decision state machine: pass, lookup, validate, fetch,
//! store, deliver, with an ordered trace of every decision taken.

mod options;
mod trace;

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use http::{HeaderValue, Method, StatusCode};
use tracing::{debug, warn};

use crate::body::Body;
use crate::error::{EngineError, OriginError};
use crate::key::canonical_key;
use crate::request::CacheRequest;
use crate::response::CacheResponse;
use crate::storage::content::ContentStore;
use crate::storage::meta::MetaStore;

pub use options::{CacheOptions, Overrides};
pub use trace::{Trace, TraceEvent};

/// The forward path: whatever can turn a request into an origin response.
/// Transport is the adapter's business; the engine only needs this one
/// capability.
#[async_trait]
pub trait Origin: Send + Sync {
    async fn fetch(&self, request: &CacheRequest) -> Result<CacheResponse, OriginError>;
}

/// The outcome of one handled request: the response to send and the decision
/// trace that produced it.
#[derive(Debug)]
pub struct Delivery {
    pub response: CacheResponse,
    pub trace: Trace,
}

/// Shared, immutable request-handling configuration: store handles, the
/// origin capability, and options. Cheap to share across concurrent
/// requests; all per-request mutable state lives in a fresh [`RequestState`].
pub struct Engine {
    meta: MetaStore,
    content: Arc<dyn ContentStore>,
    origin: Arc<dyn Origin>,
    options: CacheOptions,
}

impl Engine {
    pub fn new(
        meta: MetaStore,
        content: Arc<dyn ContentStore>,
        origin: Arc<dyn Origin>,
        options: CacheOptions,
    ) -> Self {
        Self {
            meta,
            content,
            origin,
            options,
        }
    }

    pub async fn handle(&self, request: CacheRequest) -> Result<Delivery, EngineError> {
        self.handle_with(request, &Overrides::default()).await
    }

    /// Handle one request with sparse per-request option overrides.
    pub async fn handle_with(
        &self,
        request: CacheRequest,
        overrides: &Overrides,
    ) -> Result<Delivery, EngineError> {
        let options = self.options.merged(overrides);
        let method = request.method.clone();
        let uri = request.uri.clone();
        let state = RequestState::new(self, options, request);
        let result = state.run().await;
        match &result {
            Ok(delivery) => debug!(
                method = %method,
                uri = %uri,
                status = %delivery.response.status,
                trace = %delivery.trace,
                "request handled"
            ),
            Err(err) => debug!(method = %method, uri = %uri, error = %err, "request failed"),
        }
        result
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// All mutable state for one request, allocated fresh per call so nothing
/// leaks between concurrent requests sharing an engine.
struct RequestState<'a> {
    engine: &'a Engine,
    options: CacheOptions,
    original: CacheRequest,
    key: String,
    now: SystemTime,
    trace: Trace,
}

impl<'a> RequestState<'a> {
    fn new(engine: &'a Engine, options: CacheOptions, original: CacheRequest) -> Self {
        let key = match &options.cache_key {
            Some(key_fn) => key_fn(&original),
            None => canonical_key(&original),
        };
        Self {
            engine,
            options,
            original,
            key,
            now: SystemTime::now(),
            trace: Trace::new(),
        }
    }

    async fn run(mut self) -> Result<Delivery, EngineError> {
        self.trace.push(TraceEvent::Receive);

        if self.original.is_unsafe_method() {
            self.trace.push(TraceEvent::Invalidate);
            if let Err(err) = self.engine.meta.invalidate(&self.key, self.now).await {
                warn!(key = %self.key, error = %err, "invalidate failed; passing anyway");
            }
            return self.pass().await;
        }
        if !self.original.is_cacheable_method() || self.options.force_pass {
            return self.pass().await;
        }
        self.lookup().await
    }

    /// Forward untouched and return the origin's answer verbatim. Never
    /// consults or fills the cache.
    async fn pass(mut self) -> Result<Delivery, EngineError> {
        self.trace.push(TraceEvent::Pass);
        let forward = self.original.clone();
        let response = self.forward(&forward).await?;
        Ok(Delivery {
            response,
            trace: self.trace,
        })
    }

    async fn lookup(mut self) -> Result<Delivery, EngineError> {
        self.trace.push(TraceEvent::Lookup);

        if self.original.demands_reload() && self.options.allow_reload {
            self.trace.push(TraceEvent::Reload);
            return self.fetch().await;
        }

        let entry = match self
            .engine
            .meta
            .lookup(&self.key, &self.original, self.engine.content.as_ref(), self.now)
            .await
        {
            Ok(entry) => entry,
            Err(err) => {
                // A broken cache must not break the request.
                warn!(key = %self.key, error = %err, "metadata lookup failed; degrading to pass");
                return self.pass().await;
            }
        };

        match entry {
            Some(entry) if self.fresh_enough(&entry) => {
                self.trace.push(TraceEvent::Fresh);
                Ok(self.deliver(entry))
            }
            Some(entry) => {
                self.trace.push(TraceEvent::Stale);
                self.validate(entry).await
            }
            None => {
                self.trace.push(TraceEvent::Miss);
                self.fetch().await
            }
        }
    }

    fn fresh_enough(&self, entry: &CacheResponse) -> bool {
        if !entry.is_fresh(self.now) {
            return false;
        }
        if entry.cache_control().no_cache() {
            return false;
        }
        if self.options.allow_revalidate {
            if let Some(max_age) = self.original.max_age() {
                // max-age=0 always forces revalidation, even of a
                // just-stored entry whose age is still zero.
                return max_age > 0 && max_age >= entry.age(self.now);
            }
        }
        true
    }

    /// Ask the origin whether the stale entry is still good, via a
    /// conditional request built from the entry's validators.
    async fn validate(mut self, mut entry: CacheResponse) -> Result<Delivery, EngineError> {
        let mut forward = self.forward_copy();
        if let Some(etag) = entry.etag() {
            if let Ok(value) = HeaderValue::from_str(etag) {
                forward.headers.insert(http::header::IF_NONE_MATCH, value);
            }
        }
        if let Some(last_modified) = entry.last_modified() {
            if let Ok(value) = HeaderValue::from_str(last_modified) {
                forward.headers.insert(http::header::IF_MODIFIED_SINCE, value);
            }
        }

        let origin_response = match self.forward(&forward).await {
            Ok(response) => response,
            Err(EngineError::Origin(err))
                if err.is_connection_failure() && self.options.fault_tolerant =>
            {
                warn!(key = %self.key, error = %err, "origin unreachable; serving stale entry");
                entry.refresh_age(self.now);
                return Ok(self.deliver(entry));
            }
            Err(err) => return Err(err),
        };

        let mut candidate = if origin_response.status == StatusCode::NOT_MODIFIED {
            self.trace.push(TraceEvent::Valid);
            entry.merge_revalidation(&origin_response.headers);
            entry
        } else {
            self.trace.push(TraceEvent::Invalid);
            origin_response
        };

        self.maybe_store(&mut candidate).await?;
        Ok(self.deliver(candidate))
    }

    /// Unconditional origin fetch for a miss or reload.
    async fn fetch(mut self) -> Result<Delivery, EngineError> {
        self.trace.push(TraceEvent::Fetch);
        let mut forward = self.forward_copy();
        forward.headers.remove(http::header::IF_NONE_MATCH);
        forward.headers.remove(http::header::IF_MODIFIED_SINCE);

        let mut candidate = self.forward(&forward).await?;
        self.maybe_store(&mut candidate).await?;
        Ok(self.deliver(candidate))
    }

    /// The mutable copy of the request that goes to the origin. HEAD is
    /// forwarded as GET; the body is discarded again at delivery.
    fn forward_copy(&self) -> CacheRequest {
        let mut forward = self.original.clone();
        if forward.method == Method::HEAD {
            forward.method = Method::GET;
        }
        forward
    }

    /// One origin round-trip with the configured deadline, plus bounded
    /// retries on connection failure. Every failed attempt is traced.
    async fn forward(&mut self, request: &CacheRequest) -> Result<CacheResponse, EngineError> {
        let limit = self.options.max_retries;
        let mut attempt = 0u32;
        loop {
            let result = match self.options.origin_timeout {
                Some(deadline) => {
                    match tokio::time::timeout(deadline, self.engine.origin.fetch(request)).await {
                        Ok(result) => result,
                        Err(_) => Err(OriginError::ConnectionFailed(format!(
                            "origin deadline of {deadline:?} expired"
                        ))),
                    }
                }
                None => self.engine.origin.fetch(request).await,
            };

            match result {
                Ok(mut response) => {
                    response.ensure_date(self.now);
                    return Ok(response);
                }
                Err(err) if err.is_connection_failure() => {
                    self.trace.push(TraceEvent::ConnectionFailed);
                    if attempt >= limit {
                        return Err(err.into());
                    }
                    attempt += 1;
                    self.trace.push(TraceEvent::Retrying { attempt, limit });
                    warn!(
                        uri = %request.uri,
                        attempt,
                        limit,
                        error = %err,
                        "origin connection failed; retrying"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Store the candidate when cacheability rules allow it. Store-side
    /// failures are logged and swallowed; the candidate is delivered either
    /// way.
    async fn maybe_store(&mut self, response: &mut CacheResponse) -> Result<(), EngineError> {
        if self.request_is_personal() && !response.cache_control().public() {
            response.mark_private();
        }

        if !response.has_freshness_info() && !response.must_revalidate() {
            if let Some(seconds) = self.options.default_ttl {
                if seconds > 0 {
                    response.set_ttl(seconds, self.now);
                }
            }
        }

        if !response.is_cacheable(self.now) {
            return Ok(());
        }

        // Buffer a streamed origin body up front so a storage failure cannot
        // lose it mid-write.
        if response.content_digest().is_none() {
            let body = std::mem::take(&mut response.body);
            let bytes = body.into_bytes().await.map_err(|err| {
                EngineError::Origin(OriginError::Other(format!(
                    "reading origin body failed: {err}"
                )))
            })?;
            response.set_body_bytes(bytes);
        }

        let mut stripped = false;
        for name in &self.options.ignore_headers {
            stripped |= response.headers.remove(name.as_str()).is_some();
        }
        if stripped {
            self.trace.push(TraceEvent::Ignore);
        }

        self.trace.push(TraceEvent::Store);
        let backup = match &response.body {
            Body::Full(bytes) => Some(bytes.clone()),
            _ => None,
        };
        if let Err(err) = self
            .engine
            .meta
            .store(&self.key, &self.original, response, self.engine.content.as_ref())
            .await
        {
            warn!(key = %self.key, error = %err, "store failed; delivering uncached");
            if response.body.is_empty_hint() {
                if let Some(bytes) = backup {
                    response.set_body_bytes(bytes);
                }
            }
        }
        response.refresh_age(self.now);
        Ok(())
    }

    fn request_is_personal(&self) -> bool {
        self.options
            .private_headers
            .iter()
            .any(|name| self.original.headers.contains_key(name.as_str()))
    }

    /// Final client-facing adjustments: a 304 when the client's own
    /// conditionals match, and body suppression for HEAD.
    fn deliver(mut self, mut response: CacheResponse) -> Delivery {
        self.trace.push(TraceEvent::Deliver);

        if response.status.is_success()
            && crate::freshness::validators_match(&response.headers, &self.original.headers)
        {
            response.not_modified();
        }
        if self.original.method == Method::HEAD {
            response.body = Body::Empty;
        }

        Delivery {
            response,
            trace: self.trace,
        }
    }
}
