//! Acquisition over real HTTP: status classification and signed-URL refresh.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::http::{StatusCode, header};
use axum::routing::get;
use clipstitch_core::config::FetchConfig;
use clipstitch_core::engine::SimulationEngine;
use clipstitch_core::source::{ClipFetcher, ClipReference, FetchError, SignedUrlProvider};
use clipstitch_core::{AssemblyConfig, AssemblyError, SandboxEngine, VideoAssembler};
use url::Url;

use crate::support::{mp4_payload, spawn_fixture};

fn fixture_router() -> Router {
    let clip = mp4_payload(4096, b'X');
    Router::new()
        .route(
            "/ok.mp4",
            get(move || {
                let clip = clip.clone();
                async move { ([(header::CONTENT_TYPE, "video/mp4")], clip) }
            }),
        )
        .route("/missing.mp4", get(|| async { StatusCode::NOT_FOUND }))
        .route("/forbidden.mp4", get(|| async { StatusCode::FORBIDDEN }))
        .route("/empty.mp4", get(|| async { Vec::<u8>::new() }))
}

#[tokio::test]
async fn test_fetch_classifies_http_statuses() {
    let base = spawn_fixture(fixture_router()).await;
    let fetcher = ClipFetcher::new(FetchConfig::default());

    let payload = fetcher
        .fetch_clip(&ClipReference::from_url(format!("{base}/ok.mp4")), 0)
        .await
        .unwrap();
    assert_eq!(payload.data.len(), 4096);
    assert_eq!(payload.mime, "video/mp4");

    let missing = fetcher
        .fetch_clip(&ClipReference::from_url(format!("{base}/missing.mp4")), 1)
        .await;
    assert!(matches!(missing, Err(FetchError::NotFound { index: 1 })));

    let forbidden = fetcher
        .fetch_clip(&ClipReference::from_url(format!("{base}/forbidden.mp4")), 2)
        .await;
    assert!(matches!(forbidden, Err(FetchError::Unauthorized { index: 2 })));

    let empty = fetcher
        .fetch_clip(&ClipReference::from_url(format!("{base}/empty.mp4")), 3)
        .await;
    assert!(matches!(empty, Err(FetchError::EmptyPayload { index: 3 })));
}

struct FixtureUrlProvider {
    base: String,
}

#[async_trait]
impl SignedUrlProvider for FixtureUrlProvider {
    async fn fresh_url(
        &self,
        storage_path: &str,
    ) -> Result<Url, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Url::parse(&format!("{}/{storage_path}", self.base))?)
    }
}

#[tokio::test]
async fn test_expired_signed_url_is_refreshed_from_storage_path() {
    let base = spawn_fixture(fixture_router()).await;
    let provider = Arc::new(FixtureUrlProvider { base: base.clone() });
    let fetcher = ClipFetcher::new(FetchConfig::default()).with_url_provider(provider);

    // The presented URL is stale and would be rejected; the stable storage
    // path must win.
    let clip = ClipReference::from_url(format!("{base}/forbidden.mp4"))
        .with_storage_path("ok.mp4");

    let payload = fetcher.fetch_clip(&clip, 0).await.unwrap();
    assert_eq!(payload.data.len(), 4096);
}

#[tokio::test]
async fn test_clip_not_found_aborts_before_any_normalization() {
    let base = spawn_fixture(fixture_router()).await;
    let engine = Arc::new(SimulationEngine::new());
    let assembler =
        VideoAssembler::new(AssemblyConfig::default()).with_engine(engine.clone());

    let clips = vec![
        ClipReference::from_url(format!("{base}/ok.mp4")),
        ClipReference::from_url(format!("{base}/missing.mp4")),
        ClipReference::from_url(format!("{base}/ok.mp4")),
    ];

    let result = assembler.combine_clips(&clips, None).await;

    match result {
        Err(AssemblyError::Fetch(FetchError::NotFound { index })) => assert_eq!(index, 1),
        other => panic!("expected NotFound for clip 1, got {other:?}"),
    }
    // The engine was never touched: no normalization, nothing to clean up.
    assert_eq!(engine.invocation_count(), 0);
    assert!(engine.list_files().await.is_empty());
}
