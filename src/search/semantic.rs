//! Optional semantic search support.
//!
//! An embedder is a capability configured at startup; when absent, semantic
//! search surfaces a first-class `capability_disabled` error rather than a
//! silent no-op.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::CoreError;

/// Text embedding capability.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError>;
    /// Identifier recorded alongside results for diagnostics.
    fn id(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Embedder backed by an HTTP embedding service.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEmbedder {
    pub fn new(endpoint: String, timeout: std::time::Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Internal(format!("build embedder client: {}", e)))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "input": text }))
            .send()
            .await
            .map_err(|e| CoreError::TransientUpstream(format!("embedder request: {}", e)))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(CoreError::PermanentUpstream(format!(
                "embedder returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(CoreError::TransientUpstream(format!(
                "embedder returned {}",
                status
            )));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| CoreError::PermanentUpstream(format!("embedder response: {}", e)))?;
        Ok(body.embedding)
    }

    fn id(&self) -> &str {
        &self.endpoint
    }
}

/// Cosine similarity; zero for mismatched or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na <= 0.0 || nb <= 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![0.5, 0.2, -0.3];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
