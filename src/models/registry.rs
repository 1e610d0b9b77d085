//! Upstream model registry.
//!
//! # Responsibilities
//! - Fetch the upstream model listing (`api/tags`) on first use
//! - Order models by recency so numeric indices are stable for users
//! - Resolve index → name and name → index
//!
//! # Design Decisions
//! - Fetched lazily, at most once, then kept until invalidated (or until the
//!   optional refresh interval elapses); newly pulled models stay invisible
//!   to index lookups until then
//! - A failed fetch keeps whatever was loaded before; the next lookup retries
//! - Concurrent first lookups share a single fetch

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::upstream::UpstreamSession;

/// Path of the upstream model listing.
pub const MODEL_LIST_PATH: &str = "api/tags";

/// Resolves numeric model indices to model names.
#[async_trait]
pub trait ModelRegistry: Send + Sync + std::fmt::Debug {
    /// Name of the model at `index`, most recently modified first.
    async fn model_name(&self, index: usize) -> Option<String>;

    /// Index of the model called `name`.
    async fn model_id(&self, name: &str) -> Option<usize>;
}

/// Parse an Ollama `{"models": [...]}` listing, newest first.
///
/// Entries are kept as raw JSON; malformed entries simply fail to resolve.
pub fn parse_model_listing(body: &[u8]) -> Option<Vec<Value>> {
    let listing: Value = serde_json::from_slice(body).ok()?;
    let mut models = listing.get("models")?.as_array()?.clone();
    models.sort_by(|a, b| modified_at(b).cmp(modified_at(a)));
    Some(models)
}

fn modified_at(model: &Value) -> &str {
    model
        .get("modified_at")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn model_name_of(model: &Value) -> Option<&str> {
    model.as_object()?.get("name")?.as_str()
}

#[derive(Debug)]
struct Snapshot {
    models: Arc<Vec<Value>>,
    fetched_at: Instant,
}

/// Registry backed by the upstream Ollama listing.
#[derive(Debug)]
pub struct OllamaModelRegistry {
    session: UpstreamSession,
    refresh_after: Option<Duration>,
    state: Mutex<Option<Snapshot>>,
}

impl OllamaModelRegistry {
    pub fn new(session: UpstreamSession, refresh_after: Option<Duration>) -> Self {
        Self {
            session,
            refresh_after,
            state: Mutex::new(None),
        }
    }

    /// Drop the cached listing; the next lookup fetches again.
    pub async fn invalidate(&self) {
        *self.state.lock().await = None;
        tracing::debug!("Model registry invalidated");
    }

    /// Current listing, fetching it if absent or stale.
    pub async fn models(&self) -> Option<Arc<Vec<Value>>> {
        let mut state = self.state.lock().await;

        if let Some(snapshot) = state.as_ref() {
            let stale = self
                .refresh_after
                .is_some_and(|refresh| snapshot.fetched_at.elapsed() >= refresh);
            if !stale {
                return Some(snapshot.models.clone());
            }
        }

        match self.fetch().await {
            Some(models) => {
                let models = Arc::new(models);
                *state = Some(Snapshot {
                    models: models.clone(),
                    fetched_at: Instant::now(),
                });
                Some(models)
            }
            // Keep serving a stale listing rather than none.
            None => state.as_ref().map(|snapshot| snapshot.models.clone()),
        }
    }

    async fn fetch(&self) -> Option<Vec<Value>> {
        let response = match self.session.get(MODEL_LIST_PATH).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch model listing");
                return None;
            }
        };

        if !response.status.is_success() {
            tracing::error!(
                status = response.status.as_u16(),
                body = %String::from_utf8_lossy(&response.body),
                "Model listing returned error"
            );
            return None;
        }

        let Some(models) = parse_model_listing(&response.body) else {
            tracing::warn!("Model listing is not valid JSON");
            return None;
        };

        for (index, model) in models.iter().enumerate() {
            tracing::debug!(index, name = model_name_of(model).unwrap_or("<invalid>"), "Model");
        }
        tracing::info!(count = models.len(), "Model listing loaded");
        Some(models)
    }
}

#[async_trait]
impl ModelRegistry for OllamaModelRegistry {
    async fn model_name(&self, index: usize) -> Option<String> {
        let models = self.models().await?;
        let Some(model) = models.get(index) else {
            tracing::debug!(index, available = models.len(), "Model index does not exist");
            return None;
        };
        let name = model_name_of(model);
        if name.is_none() {
            tracing::debug!(index, "Model entry is malformed");
        }
        name.map(str::to_string)
    }

    async fn model_id(&self, name: &str) -> Option<usize> {
        let models = self.models().await?;
        models
            .iter()
            .position(|model| model_name_of(model) == Some(name))
    }
}
