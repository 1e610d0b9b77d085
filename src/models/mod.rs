//! Upstream model listing and numeric model-name rewriting.

pub mod registry;
pub mod rewriter;

pub use registry::{parse_model_listing, ModelRegistry, OllamaModelRegistry, MODEL_LIST_PATH};
pub use rewriter::ModelNameRewriter;
