//! Model registry behaviour against a mock upstream.

use std::time::Duration;

use ollama_deproxy::models::{ModelRegistry, OllamaModelRegistry};
use ollama_deproxy::upstream::UpstreamSession;

mod common;

use common::{start_mock_upstream, test_config, MockUpstream};

fn registry(upstream: &MockUpstream, refresh_after: Option<Duration>) -> OllamaModelRegistry {
    let session = UpstreamSession::from_config(&test_config(&upstream.url()).upstream).unwrap();
    OllamaModelRegistry::new(session, refresh_after)
}

#[tokio::test]
async fn test_listing_fetched_lazily_once() {
    let upstream = start_mock_upstream().await;
    let registry = registry(&upstream, None);
    assert_eq!(upstream.calls("/api/tags"), 0);

    assert_eq!(registry.model_name(0).await.as_deref(), Some("newest:latest"));
    assert_eq!(registry.model_name(2).await.as_deref(), Some("old:latest"));
    assert_eq!(registry.model_name(3).await, None);
    assert_eq!(registry.model_id("mid:latest").await, Some(1));
    assert_eq!(registry.model_id("unknown").await, None);

    assert_eq!(upstream.calls("/api/tags"), 1);
}

#[tokio::test]
async fn test_concurrent_first_lookups_share_fetch() {
    let upstream = start_mock_upstream().await;
    let registry = registry(&upstream, None);

    let (a, b, c) = tokio::join!(
        registry.model_name(0),
        registry.model_name(1),
        registry.model_id("old:latest"),
    );
    assert_eq!(a.as_deref(), Some("newest:latest"));
    assert_eq!(b.as_deref(), Some("mid:latest"));
    assert_eq!(c, Some(2));
    assert_eq!(upstream.calls("/api/tags"), 1);
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let upstream = start_mock_upstream().await;
    let registry = registry(&upstream, None);

    registry.model_name(0).await;
    registry.invalidate().await;
    assert_eq!(upstream.calls("/api/tags"), 1);

    assert_eq!(registry.model_id("newest:latest").await, Some(0));
    assert_eq!(upstream.calls("/api/tags"), 2);
}

#[tokio::test]
async fn test_refresh_interval_refetches_stale_listing() {
    let upstream = start_mock_upstream().await;
    let registry = registry(&upstream, Some(Duration::from_millis(50)));

    registry.model_name(0).await;
    registry.model_name(1).await;
    assert_eq!(upstream.calls("/api/tags"), 1);

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(registry.model_name(0).await.as_deref(), Some("newest:latest"));
    assert_eq!(upstream.calls("/api/tags"), 2);
}

#[tokio::test]
async fn test_failed_fetch_retried_on_next_lookup() {
    let upstream = start_mock_upstream().await;
    let registry = registry(&upstream, None);
    upstream.fail_tags(1);

    assert_eq!(registry.model_name(0).await, None);
    assert_eq!(upstream.calls("/api/tags"), 1);

    assert_eq!(registry.model_name(0).await.as_deref(), Some("newest:latest"));
    assert_eq!(upstream.calls("/api/tags"), 2);
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_listing() {
    let upstream = start_mock_upstream().await;
    let registry = registry(&upstream, Some(Duration::from_millis(50)));

    assert_eq!(registry.model_name(2).await.as_deref(), Some("old:latest"));

    upstream.fail_tags(1);
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(registry.model_name(2).await.as_deref(), Some("old:latest"));
    assert_eq!(upstream.calls("/api/tags"), 2);

    // Still stale, so the next lookup fetches again and succeeds.
    assert_eq!(registry.model_id("mid:latest").await, Some(1));
    assert_eq!(upstream.calls("/api/tags"), 3);
}
