// src/refresh/embedding_batch.rs
use futures::future::try_join_all;
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::error::{EmbeddingError, PromoError, PromoResult};
use crate::generation::EmbeddingService;
use crate::utils::retry::RetryPolicy;

pub const DEFAULT_EMBEDDING_CONCURRENCY: usize = 4;

/// Embeds a batch of texts through a bounded pool of concurrent requests.
///
/// Output vector `i` always belongs to input text `i`. A single item that
/// fails permanently, or exhausts its retries, fails the whole batch.
#[derive(Clone)]
pub struct BatchEmbedder {
    service: Arc<dyn EmbeddingService>,
    concurrency: usize,
    retry: RetryPolicy,
}

impl BatchEmbedder {
    pub fn new(service: Arc<dyn EmbeddingService>, concurrency: usize, retry: RetryPolicy) -> Self {
        Self {
            service,
            concurrency: concurrency.max(1),
            retry,
        }
    }

    pub async fn embed_all(&self, texts: &[String]) -> PromoResult<Vec<Vec<f32>>> {
        let semaphore = Semaphore::new(self.concurrency);
        let semaphore = &semaphore;

        let requests = texts.iter().enumerate().map(|(index, text)| async move {
            let _permit = semaphore.acquire().await.map_err(|e| PromoError::Embedding {
                index,
                source: EmbeddingError::Permanent(format!("embedding pool closed: {}", e)),
            })?;
            self.embed_with_retry(index, text).await
        });

        // try_join_all keeps input order and drops outstanding requests on the
        // first error.
        let vectors = try_join_all(requests).await?;
        debug!(
            "Embedded {} texts with concurrency {}",
            vectors.len(),
            self.concurrency
        );
        Ok(vectors)
    }

    async fn embed_with_retry(&self, index: usize, text: &str) -> PromoResult<Vec<f32>> {
        let mut attempt = 1;
        loop {
            match self.service.embed(text).await {
                Ok(vector) => return Ok(vector),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self
                        .retry
                        .backoff_with_jitter(attempt, &mut rand::thread_rng());
                    warn!(
                        "Embedding item {} attempt {}/{} failed ({}); retrying in {:?}",
                        index, attempt, self.retry.max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(
                        "Embedding item {} failed after {} attempt(s): {}",
                        index, attempt, err
                    );
                    return Err(PromoError::Embedding { index, source: err });
                }
            }
        }
    }
}
