#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use http::{HeaderName, HeaderValue, Method, StatusCode};

use gatecache::engine::{CacheOptions, Engine, Origin};
use gatecache::error::OriginError;
use gatecache::{Body, CacheRequest, CacheResponse, Storage};

type Handler =
    dyn Fn(&CacheRequest, usize) -> Result<CacheResponse, OriginError> + Send + Sync;

/// Scripted origin that counts calls. The handler receives the forwarded
/// request and the zero-based call index.
pub struct MockOrigin {
    calls: AtomicUsize,
    handler: Box<Handler>,
}

impl MockOrigin {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&CacheRequest, usize) -> Result<CacheResponse, OriginError>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            handler: Box::new(handler),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Origin for MockOrigin {
    async fn fetch(&self, request: &CacheRequest) -> Result<CacheResponse, OriginError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.handler)(request, index)
    }
}

/// Install a test subscriber once so `RUST_LOG` filters apply to the suite.
pub fn init_logging() {
    static LOGGING: std::sync::Once = std::sync::Once::new();
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// An engine wired to fresh in-memory stores.
pub fn heap_engine(origin: Arc<MockOrigin>, options: CacheOptions) -> Engine {
    init_logging();
    let storage = Storage::new();
    let meta = storage.resolve_meta("heap:/").expect("heap meta backend");
    let content = storage
        .resolve_content("heap:/")
        .expect("heap content backend");
    Engine::new(meta, content, origin, options)
}

pub fn get(uri: &str) -> CacheRequest {
    CacheRequest::new(Method::GET, uri.parse().expect("test uri"))
}

pub fn request(method: Method, uri: &str) -> CacheRequest {
    CacheRequest::new(method, uri.parse().expect("test uri"))
}

pub fn with_header(mut request: CacheRequest, name: &str, value: &str) -> CacheRequest {
    request.headers.insert(
        HeaderName::try_from(name).expect("test header name"),
        HeaderValue::from_str(value).expect("test header value"),
    );
    request
}

pub fn response(status: u16, headers: &[(&str, &str)], body: &str) -> CacheResponse {
    let mut response = CacheResponse::new(StatusCode::from_u16(status).expect("test status"));
    for (name, value) in headers {
        response.headers.append(
            HeaderName::try_from(*name).expect("test header name"),
            HeaderValue::from_str(value).expect("test header value"),
        );
    }
    response.body = Body::from(body.to_string());
    response
}

/// An HTTP-date string offset from the current time, for responses that need
/// a measurable age.
pub fn http_date(offset: i64) -> String {
    let at = if offset >= 0 {
        SystemTime::now() + Duration::from_secs(offset as u64)
    } else {
        SystemTime::now() - Duration::from_secs(offset.unsigned_abs())
    };
    httpdate::fmt_http_date(at)
}

pub fn header<'a>(response: &'a CacheResponse, name: &str) -> Option<&'a str> {
    response
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
}

pub async fn body_text(response: CacheResponse) -> String {
    let bytes = response.body.into_bytes().await.expect("readable body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
