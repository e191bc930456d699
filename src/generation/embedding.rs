// src/generation/embedding.rs
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;
use crate::generation::EmbeddingService;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Single-text embedder backed by an Ollama `/api/embed` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimensions,
        }
    }
}

/// Throttling and server-side failures are worth retrying; anything else
/// (bad request, unknown model, auth) will fail the same way again.
pub fn classify_status(status: StatusCode, detail: String) -> Option<EmbeddingError> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Some(EmbeddingError::Transient(detail))
    } else {
        Some(EmbeddingError::Permanent(detail))
    }
}

fn classify_transport(err: &reqwest::Error) -> EmbeddingError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        EmbeddingError::Transient(err.to_string())
    } else {
        EmbeddingError::Permanent(err.to_string())
    }
}

#[async_trait]
impl EmbeddingService for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let request = EmbedRequest {
            model: &self.model,
            input: text,
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = format!("embedding service returned {}: {}", status, body);
            return Err(classify_status(status, detail.clone())
                .unwrap_or(EmbeddingError::Permanent(detail)));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Permanent(format!("failed to parse embedding response: {}", e)))?;

        parsed
            .embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| EmbeddingError::Permanent("embedding response contained no vector".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let classify = |status| classify_status(status, "x".to_string());
        assert!(classify(StatusCode::OK).is_none());
        assert!(classify(StatusCode::TOO_MANY_REQUESTS).unwrap().is_transient());
        assert!(classify(StatusCode::SERVICE_UNAVAILABLE).unwrap().is_transient());
        assert!(!classify(StatusCode::BAD_REQUEST).unwrap().is_transient());
        assert!(!classify(StatusCode::NOT_FOUND).unwrap().is_transient());
    }
}
