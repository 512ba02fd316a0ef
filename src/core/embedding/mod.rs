mod worker;

pub use worker::EmbeddingWorker;

use anyhow::Result;
use async_trait::async_trait;

/// Turns text into a fixed-dimension vector. Production uses the OpenAI
/// embeddings endpoint; tests substitute deterministic vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
