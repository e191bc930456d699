// src/generation/mod.rs
//! Contracts for the remote text-generation and embedding services, plus
//! their Ollama-backed implementations.

pub mod embedding;
pub mod ollama;
pub mod prompt;

use async_trait::async_trait;

use crate::error::{EmbeddingError, PromoResult};

pub use embedding::OllamaEmbedder;
pub use ollama::OllamaGenerator;
pub use prompt::GenerationPrompt;

/// Produces candidate message strings for a prompt.
///
/// Implementations own their retry policy and return
/// `PromoError::Generation` once it is exhausted or the result is empty.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, prompt: &GenerationPrompt) -> PromoResult<Vec<String>>;
}

/// Turns one text into a fixed-length vector.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}
