// src/refresh/state_store.rs
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::ProfileRefreshState;

/// Key-value home of per-profile refresh state.
///
/// Kept behind a trait so the cache can be backed by a shared store later;
/// `put_if_current` must be atomic with respect to other writers.
#[async_trait]
pub trait RefreshStateStore: Send + Sync {
    async fn get(&self, profile_key: &str) -> Option<ProfileRefreshState>;

    /// Unconditional write, used when a new refresh starts.
    async fn put(&self, profile_key: &str, state: ProfileRefreshState);

    /// Writes `state` only if the stored state belongs to the same
    /// generation. Returns whether the write happened.
    async fn put_if_current(&self, profile_key: &str, state: ProfileRefreshState) -> bool;
}

#[derive(Debug, Default)]
pub struct InMemoryRefreshStore {
    states: RwLock<HashMap<String, ProfileRefreshState>>,
}

impl InMemoryRefreshStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshStateStore for InMemoryRefreshStore {
    async fn get(&self, profile_key: &str) -> Option<ProfileRefreshState> {
        self.states.read().await.get(profile_key).cloned()
    }

    async fn put(&self, profile_key: &str, state: ProfileRefreshState) {
        self.states
            .write()
            .await
            .insert(profile_key.to_string(), state);
    }

    async fn put_if_current(&self, profile_key: &str, state: ProfileRefreshState) -> bool {
        let mut states = self.states.write().await;
        match states.get(profile_key) {
            Some(existing) if existing.generation == state.generation => {
                states.insert(profile_key.to_string(), state);
                true
            }
            _ => false,
        }
    }
}
