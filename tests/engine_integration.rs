mod support;

use std::sync::Arc;

use async_trait::async_trait;
use http::Method;

use gatecache::engine::{CacheOptions, TraceEvent};
use gatecache::error::{EngineError, OriginError, StoreError};
use gatecache::storage::meta::{MetaBackend, MetaStore, Variant};

use support::*;

const HELLO_WORLD_SHA1: &str = "0a4d55a8d778e5022fab701977c5d840bbc486d0";

#[tokio::test]
async fn fresh_hit_is_served_without_a_second_origin_call() {
    let date = http_date(-3);
    let origin = MockOrigin::new(move |_, _| {
        Ok(response(
            200,
            &[("date", date.as_str()), ("cache-control", "max-age=60")],
            "Hello World",
        ))
    });
    let engine = heap_engine(origin.clone(), CacheOptions::default());

    let first = engine.handle(get("http://example.com/x")).await.unwrap();
    assert!(first.trace.contains(TraceEvent::Miss));
    assert!(first.trace.contains(TraceEvent::Store));
    assert_eq!(first.response.status, 200);
    assert_eq!(
        header(&first.response, "x-content-digest"),
        Some(HELLO_WORLD_SHA1)
    );
    assert_eq!(body_text(first.response).await, "Hello World");

    let second = engine.handle(get("http://example.com/x")).await.unwrap();
    assert!(second.trace.contains(TraceEvent::Fresh));
    assert!(!second.trace.contains(TraceEvent::Fetch));
    let age: i64 = header(&second.response, "age").unwrap().parse().unwrap();
    assert!(age >= 3, "age should be measured from the origin date");
    assert_eq!(body_text(second.response).await, "Hello World");

    assert_eq!(origin.calls(), 1);
}

#[tokio::test]
async fn post_invalidates_and_passes() {
    let origin = MockOrigin::new(|request, _| {
        if request.method == Method::POST {
            Ok(response(200, &[], "updated"))
        } else {
            Ok(response(
                200,
                &[("cache-control", "max-age=60"), ("etag", "\"v1\"")],
                "Hello World",
            ))
        }
    });
    let engine = heap_engine(origin.clone(), CacheOptions::default());

    let prime = engine.handle(get("http://example.com/x")).await.unwrap();
    assert!(prime.trace.contains(TraceEvent::Store));

    let post = engine
        .handle(request(Method::POST, "http://example.com/x"))
        .await
        .unwrap();
    assert!(post.trace.contains(TraceEvent::Invalidate));
    assert!(post.trace.contains(TraceEvent::Pass));
    assert!(!post.trace.contains(TraceEvent::Store));

    // The previously fresh entry now needs revalidation.
    let after = engine.handle(get("http://example.com/x")).await.unwrap();
    assert!(after.trace.contains(TraceEvent::Stale));
    assert!(!after.trace.contains(TraceEvent::Fresh));
    assert_eq!(origin.calls(), 3);
}

#[tokio::test]
async fn vary_serves_each_request_its_own_variant() {
    let origin = MockOrigin::new(|request, _| {
        let agent = request
            .headers
            .get("user-agent")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("none")
            .to_string();
        Ok(response(
            200,
            &[("cache-control", "max-age=60"), ("vary", "User-Agent")],
            &format!("content for {agent}"),
        ))
    });
    let engine = heap_engine(origin.clone(), CacheOptions::default());

    let mobile = || with_header(get("http://example.com/x"), "user-agent", "mobile");
    let desktop = || with_header(get("http://example.com/x"), "user-agent", "desktop");

    let first = engine.handle(mobile()).await.unwrap();
    assert_eq!(body_text(first.response).await, "content for mobile");
    let second = engine.handle(desktop()).await.unwrap();
    assert_eq!(body_text(second.response).await, "content for desktop");
    assert_eq!(origin.calls(), 2);

    let hit = engine.handle(mobile()).await.unwrap();
    assert!(hit.trace.contains(TraceEvent::Fresh));
    assert_eq!(body_text(hit.response).await, "content for mobile");
    let hit = engine.handle(desktop()).await.unwrap();
    assert!(hit.trace.contains(TraceEvent::Fresh));
    assert_eq!(body_text(hit.response).await, "content for desktop");
    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn revalidation_304_keeps_cached_body_and_origin_metadata() {
    let origin = MockOrigin::new(|request, index| {
        if index == 0 {
            return Ok(response(200, &[("etag", "\"12345\"")], "Hello World"));
        }
        assert_eq!(
            request
                .headers
                .get("if-none-match")
                .and_then(|value| value.to_str().ok()),
            Some("\"12345\""),
            "revalidation must carry the cached validator"
        );
        Ok(response(
            304,
            &[("etag", "\"12345\""), ("cache-control", "max-age=60")],
            "",
        ))
    });
    let engine = heap_engine(origin.clone(), CacheOptions::default());

    let prime = engine.handle(get("http://example.com/x")).await.unwrap();
    assert!(prime.trace.contains(TraceEvent::Miss));
    assert!(prime.trace.contains(TraceEvent::Store));

    let revalidated = engine.handle(get("http://example.com/x")).await.unwrap();
    assert!(revalidated.trace.contains(TraceEvent::Stale));
    assert!(revalidated.trace.contains(TraceEvent::Valid));
    assert_eq!(revalidated.response.status, 200);
    assert_eq!(
        header(&revalidated.response, "cache-control"),
        Some("max-age=60")
    );
    assert_eq!(header(&revalidated.response, "x-origin-status"), Some("304"));
    assert_eq!(body_text(revalidated.response).await, "Hello World");
    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn matching_client_conditional_yields_304_with_empty_body() {
    let origin = MockOrigin::new(|_, _| {
        Ok(response(
            200,
            &[("etag", "\"12345\""), ("cache-control", "max-age=60")],
            "Hello World",
        ))
    });
    let engine = heap_engine(origin.clone(), CacheOptions::default());

    let conditional = with_header(get("http://example.com/x"), "if-none-match", "\"12345\"");
    let delivery = engine.handle(conditional).await.unwrap();
    assert!(delivery.trace.contains(TraceEvent::Miss));
    assert!(delivery.trace.contains(TraceEvent::Store));
    assert_eq!(delivery.response.status, 304);
    assert_eq!(header(&delivery.response, "etag"), Some("\"12345\""));
    assert!(delivery.response.body.is_empty_hint());
}

#[tokio::test]
async fn identical_bodies_share_one_content_digest() {
    let origin = MockOrigin::new(|_, _| {
        Ok(response(200, &[("cache-control", "max-age=60")], "Hello World"))
    });
    let engine = heap_engine(origin.clone(), CacheOptions::default());

    let a = engine.handle(get("http://example.com/a")).await.unwrap();
    let b = engine.handle(get("http://example.com/b")).await.unwrap();
    assert_eq!(header(&a.response, "x-content-digest"), Some(HELLO_WORLD_SHA1));
    assert_eq!(
        header(&a.response, "x-content-digest"),
        header(&b.response, "x-content-digest")
    );
}

#[tokio::test]
async fn fault_tolerance_serves_stale_after_retries_exhaust() {
    let origin = MockOrigin::new(|_, index| {
        if index == 0 {
            Ok(response(200, &[("etag", "\"v1\"")], "Hello World"))
        } else {
            Err(OriginError::ConnectionFailed("origin down".to_string()))
        }
    });
    let options = CacheOptions {
        fault_tolerant: true,
        max_retries: 1,
        ..CacheOptions::default()
    };
    let engine = heap_engine(origin.clone(), options);

    engine.handle(get("http://example.com/x")).await.unwrap();

    let delivery = engine.handle(get("http://example.com/x")).await.unwrap();
    assert!(delivery.trace.contains(TraceEvent::Stale));
    assert!(delivery.trace.contains(TraceEvent::ConnectionFailed));
    assert!(delivery
        .trace
        .contains(TraceEvent::Retrying { attempt: 1, limit: 1 }));
    assert_eq!(delivery.response.status, 200);
    assert_eq!(body_text(delivery.response).await, "Hello World");
    // Prime, failed attempt, one retry.
    assert_eq!(origin.calls(), 3);
}

#[tokio::test]
async fn miss_with_unreachable_origin_propagates() {
    let origin =
        MockOrigin::new(|_, _| Err(OriginError::ConnectionFailed("origin down".to_string())));
    let engine = heap_engine(origin.clone(), CacheOptions::default());

    let result = engine.handle(get("http://example.com/x")).await;
    assert!(matches!(
        result,
        Err(EngineError::Origin(OriginError::ConnectionFailed(_)))
    ));
    assert_eq!(origin.calls(), 1);
}

struct FailingMeta;

#[async_trait]
impl MetaBackend for FailingMeta {
    async fn read(&self, _key: &str) -> Result<Vec<Variant>, StoreError> {
        Err(StoreError::Remote("backend offline".to_string()))
    }

    async fn write(&self, _key: &str, _variants: Vec<Variant>) -> Result<(), StoreError> {
        Err(StoreError::Remote("backend offline".to_string()))
    }

    async fn purge(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Remote("backend offline".to_string()))
    }
}

#[tokio::test]
async fn broken_metadata_backend_degrades_to_pass() {
    let origin = MockOrigin::new(|_, _| {
        Ok(response(200, &[("cache-control", "max-age=60")], "Hello World"))
    });
    let storage = gatecache::Storage::new();
    let engine = gatecache::Engine::new(
        MetaStore::new(Arc::new(FailingMeta)),
        storage.resolve_content("heap:/").unwrap(),
        origin.clone(),
        CacheOptions::default(),
    );

    let delivery = engine.handle(get("http://example.com/x")).await.unwrap();
    assert!(delivery.trace.contains(TraceEvent::Pass));
    assert_eq!(delivery.response.status, 200);
    assert_eq!(body_text(delivery.response).await, "Hello World");
    assert_eq!(origin.calls(), 1);
}

#[tokio::test]
async fn default_ttl_makes_bare_responses_cacheable() {
    let origin = MockOrigin::new(|_, _| Ok(response(200, &[], "Hello World")));
    let options = CacheOptions {
        default_ttl: Some(60),
        ..CacheOptions::default()
    };
    let engine = heap_engine(origin.clone(), options);

    let first = engine.handle(get("http://example.com/x")).await.unwrap();
    assert!(first.trace.contains(TraceEvent::Store));

    let second = engine.handle(get("http://example.com/x")).await.unwrap();
    assert!(second.trace.contains(TraceEvent::Fresh));
    assert_eq!(origin.calls(), 1);
}

#[tokio::test]
async fn personal_requests_are_never_stored() {
    let origin = MockOrigin::new(|_, _| {
        Ok(response(200, &[("cache-control", "max-age=60")], "secret"))
    });
    let engine = heap_engine(origin.clone(), CacheOptions::default());

    let personal = || with_header(get("http://example.com/x"), "authorization", "Bearer t");
    let first = engine.handle(personal()).await.unwrap();
    assert!(!first.trace.contains(TraceEvent::Store));
    assert!(header(&first.response, "cache-control")
        .unwrap()
        .contains("private"));

    let second = engine.handle(personal()).await.unwrap();
    assert!(second.trace.contains(TraceEvent::Miss));
    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn explicitly_public_responses_are_stored_for_personal_requests() {
    let origin = MockOrigin::new(|_, _| {
        Ok(response(
            200,
            &[("cache-control", "public, max-age=60")],
            "shared",
        ))
    });
    let engine = heap_engine(origin.clone(), CacheOptions::default());

    let personal = || with_header(get("http://example.com/x"), "authorization", "Bearer t");
    let first = engine.handle(personal()).await.unwrap();
    assert!(first.trace.contains(TraceEvent::Store));
    let second = engine.handle(personal()).await.unwrap();
    assert!(second.trace.contains(TraceEvent::Fresh));
    assert_eq!(origin.calls(), 1);
}

#[tokio::test]
async fn ignored_headers_are_stripped_before_storing() {
    let origin = MockOrigin::new(|_, _| {
        Ok(response(
            200,
            &[("cache-control", "max-age=60"), ("set-cookie", "sid=1")],
            "Hello World",
        ))
    });
    let engine = heap_engine(origin.clone(), CacheOptions::default());

    let first = engine.handle(get("http://example.com/x")).await.unwrap();
    assert!(first.trace.contains(TraceEvent::Ignore));
    assert!(header(&first.response, "set-cookie").is_none());

    let hit = engine.handle(get("http://example.com/x")).await.unwrap();
    assert!(header(&hit.response, "set-cookie").is_none());
}

#[tokio::test]
async fn reload_refetches_when_allowed() {
    let origin = MockOrigin::new(|_, _| {
        Ok(response(200, &[("cache-control", "max-age=60")], "Hello World"))
    });
    let options = CacheOptions {
        allow_reload: true,
        ..CacheOptions::default()
    };
    let engine = heap_engine(origin.clone(), options);

    engine.handle(get("http://example.com/x")).await.unwrap();
    let reload = engine
        .handle(with_header(
            get("http://example.com/x"),
            "cache-control",
            "no-cache",
        ))
        .await
        .unwrap();
    assert!(reload.trace.contains(TraceEvent::Reload));
    assert!(reload.trace.contains(TraceEvent::Fetch));
    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn reload_is_ignored_by_default() {
    let origin = MockOrigin::new(|_, _| {
        Ok(response(200, &[("cache-control", "max-age=60")], "Hello World"))
    });
    let engine = heap_engine(origin.clone(), CacheOptions::default());

    engine.handle(get("http://example.com/x")).await.unwrap();
    let second = engine
        .handle(with_header(
            get("http://example.com/x"),
            "cache-control",
            "no-cache",
        ))
        .await
        .unwrap();
    assert!(second.trace.contains(TraceEvent::Fresh));
    assert_eq!(origin.calls(), 1);
}

#[tokio::test]
async fn head_is_fetched_as_get_and_delivered_without_body() {
    let origin = MockOrigin::new(|request, _| {
        assert_eq!(request.method, Method::GET, "HEAD must forward as GET");
        Ok(response(200, &[("cache-control", "max-age=60")], "Hello World"))
    });
    let engine = heap_engine(origin.clone(), CacheOptions::default());

    let delivery = engine
        .handle(request(Method::HEAD, "http://example.com/x"))
        .await
        .unwrap();
    assert!(delivery.trace.contains(TraceEvent::Store));
    assert!(delivery.response.body.is_empty_hint());
    assert_eq!(header(&delivery.response, "content-length"), Some("11"));

    // The stored body serves a later GET in full.
    let follow_up = engine.handle(get("http://example.com/x")).await.unwrap();
    assert!(follow_up.trace.contains(TraceEvent::Fresh));
    assert_eq!(body_text(follow_up.response).await, "Hello World");
    assert_eq!(origin.calls(), 1);
}

#[tokio::test]
async fn force_pass_skips_the_cache_entirely() {
    let origin = MockOrigin::new(|_, _| {
        Ok(response(200, &[("cache-control", "max-age=60")], "Hello World"))
    });
    let options = CacheOptions {
        force_pass: true,
        ..CacheOptions::default()
    };
    let engine = heap_engine(origin.clone(), options);

    let first = engine.handle(get("http://example.com/x")).await.unwrap();
    assert!(first.trace.contains(TraceEvent::Pass));
    let second = engine.handle(get("http://example.com/x")).await.unwrap();
    assert!(second.trace.contains(TraceEvent::Pass));
    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn options_requests_pass_without_invalidating() {
    let origin = MockOrigin::new(|request, _| {
        if request.method == Method::OPTIONS {
            Ok(response(204, &[("allow", "GET, HEAD")], ""))
        } else {
            Ok(response(200, &[("cache-control", "max-age=60")], "Hello World"))
        }
    });
    let engine = heap_engine(origin.clone(), CacheOptions::default());

    engine.handle(get("http://example.com/x")).await.unwrap();
    let options_delivery = engine
        .handle(request(Method::OPTIONS, "http://example.com/x"))
        .await
        .unwrap();
    assert!(options_delivery.trace.contains(TraceEvent::Pass));
    assert!(!options_delivery.trace.contains(TraceEvent::Invalidate));

    // The cached entry is untouched.
    let hit = engine.handle(get("http://example.com/x")).await.unwrap();
    assert!(hit.trace.contains(TraceEvent::Fresh));
    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn revalidate_directive_is_honored_when_allowed() {
    let date = http_date(-30);
    let origin = MockOrigin::new(move |_, index| {
        if index == 0 {
            Ok(response(
                200,
                &[
                    ("date", date.as_str()),
                    ("cache-control", "max-age=3600"),
                    ("etag", "\"v1\""),
                ],
                "Hello World",
            ))
        } else {
            Ok(response(304, &[("etag", "\"v1\"")], ""))
        }
    });
    let options = CacheOptions {
        allow_revalidate: true,
        ..CacheOptions::default()
    };
    let engine = heap_engine(origin.clone(), options);

    engine.handle(get("http://example.com/x")).await.unwrap();

    // The entry is ~30s old; a client demanding max-age=5 forces
    // revalidation even though the entry is still fresh.
    let strict = with_header(get("http://example.com/x"), "cache-control", "max-age=5");
    let delivery = engine.handle(strict).await.unwrap();
    assert!(delivery.trace.contains(TraceEvent::Stale));
    assert!(delivery.trace.contains(TraceEvent::Valid));
    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn max_age_zero_forces_revalidation_of_a_just_stored_entry() {
    let origin = MockOrigin::new(|_, index| {
        if index == 0 {
            Ok(response(
                200,
                &[("cache-control", "max-age=3600"), ("etag", "\"v1\"")],
                "Hello World",
            ))
        } else {
            Ok(response(304, &[("etag", "\"v1\"")], ""))
        }
    });
    let options = CacheOptions {
        allow_revalidate: true,
        ..CacheOptions::default()
    };
    let engine = heap_engine(origin.clone(), options);

    engine.handle(get("http://example.com/x")).await.unwrap();

    // The entry's age is still zero; max-age=0 must revalidate anyway.
    let strict = with_header(get("http://example.com/x"), "cache-control", "max-age=0");
    let delivery = engine.handle(strict).await.unwrap();
    assert!(delivery.trace.contains(TraceEvent::Stale));
    assert!(delivery.trace.contains(TraceEvent::Valid));
    assert!(!delivery.trace.contains(TraceEvent::Fresh));
    assert_eq!(body_text(delivery.response).await, "Hello World");
    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn expires_window_is_served_from_cache_with_measured_age() {
    let date = http_date(-3);
    let expires = http_date(5);
    let origin = MockOrigin::new(move |_, _| {
        Ok(response(
            200,
            &[("date", date.as_str()), ("expires", expires.as_str())],
            "Hello World",
        ))
    });
    let engine = heap_engine(origin.clone(), CacheOptions::default());

    let first = engine.handle(get("http://example.com/x")).await.unwrap();
    assert!(first.trace.contains(TraceEvent::Store));
    assert_eq!(body_text(first.response).await, "Hello World");

    let second = engine.handle(get("http://example.com/x")).await.unwrap();
    assert!(second.trace.contains(TraceEvent::Fresh));
    assert!(!second.trace.contains(TraceEvent::Fetch));
    let age: i64 = header(&second.response, "age").unwrap().parse().unwrap();
    assert!(age >= 3, "age should be measured from the origin date");
    assert_eq!(body_text(second.response).await, "Hello World");
    assert_eq!(origin.calls(), 1);
}

#[tokio::test]
async fn custom_cache_key_overrides_canonicalization() {
    let origin = MockOrigin::new(|_, _| {
        Ok(response(200, &[("cache-control", "max-age=60")], "Hello World"))
    });
    let options = CacheOptions {
        cache_key: Some(Arc::new(|request: &gatecache::CacheRequest| {
            // Collapse the query string away entirely.
            format!(
                "{}://{}{}",
                request.uri.scheme_str().unwrap_or("http"),
                request.uri.host().unwrap_or(""),
                request.uri.path()
            )
        })),
        ..CacheOptions::default()
    };
    let engine = heap_engine(origin.clone(), options);

    engine
        .handle(get("http://example.com/x?session=1"))
        .await
        .unwrap();
    let hit = engine
        .handle(get("http://example.com/x?session=2"))
        .await
        .unwrap();
    assert!(hit.trace.contains(TraceEvent::Fresh));
    assert_eq!(origin.calls(), 1);
}
