//! Numeric model-name rewriting.
//!
//! Lets clients address models by position (`"model": "2"`) in the
//! recency-ordered upstream listing. Anything that is not a JSON object with a
//! purely numeric `model` string passes through byte-identical.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::models::registry::ModelRegistry;

/// Bodies larger than this are parsed on the blocking pool.
const OFFLOAD_THRESHOLD: usize = 64 * 1024;

/// JSON request body whose `model` field is a numeric index.
#[derive(Debug)]
struct NumericModel {
    object: Map<String, Value>,
    index: usize,
}

fn parse_numeric_model(body: &[u8]) -> Option<NumericModel> {
    // Cheap rejection before a full parse.
    if !body.iter().any(|b| b.is_ascii_digit()) {
        return None;
    }

    let Value::Object(object) = serde_json::from_slice::<Value>(body).ok()? else {
        return None;
    };
    let model = object.get("model")?.as_str()?;
    if model.is_empty() || !model.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    match model.parse::<usize>() {
        Ok(index) => Some(NumericModel { object, index }),
        Err(_) => {
            tracing::debug!(model, "Numeric model index overflows");
            None
        }
    }
}

/// Rewrites numeric `model` fields into registry names.
#[derive(Debug, Clone)]
pub struct ModelNameRewriter {
    registry: Arc<dyn ModelRegistry>,
}

impl ModelNameRewriter {
    pub fn new(registry: Arc<dyn ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<dyn ModelRegistry> {
        &self.registry
    }

    /// Rewritten body, or `None` when the input should be forwarded as-is.
    pub async fn rewrite(&self, body: &Bytes) -> Option<Bytes> {
        if body.is_empty() {
            return None;
        }

        let parsed = if body.len() > OFFLOAD_THRESHOLD {
            let body = body.clone();
            tokio::task::spawn_blocking(move || parse_numeric_model(&body))
                .await
                .ok()
                .flatten()
        } else {
            parse_numeric_model(body)
        };

        let NumericModel { mut object, index } = parsed?;
        let name = self.registry.model_name(index).await?;
        tracing::debug!(index, model = %name, "Rewriting numeric model name");

        object.insert("model".to_string(), Value::String(name));
        match serde_json::to_vec(&object) {
            Ok(rewritten) => Some(Bytes::from(rewritten)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize rewritten body");
                None
            }
        }
    }

    /// Rewritten body if applicable, otherwise the original bytes.
    pub async fn maybe_rewrite(&self, body: Bytes) -> Bytes {
        match self.rewrite(&body).await {
            Some(rewritten) => rewritten,
            None => body,
        }
    }
}
