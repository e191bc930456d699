// src/refresh/mod.rs
//! Per-profile content refresh: candidate generation, batched embedding,
//! similarity ranking and the refresh-state cache in front of it.

pub mod cache;
pub mod embedding_batch;
pub mod pipeline;
pub mod state_store;

pub use cache::{RefreshCache, RefreshHandle};
pub use embedding_batch::{BatchEmbedder, DEFAULT_EMBEDDING_CONCURRENCY};
pub use pipeline::{assign_ranked, ContentRefreshPipeline, DEFAULT_CANDIDATE_COUNT};
pub use state_store::{InMemoryRefreshStore, RefreshStateStore};
