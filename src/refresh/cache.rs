// src/refresh/cache.rs
use log::{error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

use crate::models::{Assignment, ProfileRefreshState};
use crate::refresh::pipeline::ContentRefreshPipeline;
use crate::refresh::state_store::RefreshStateStore;

/// Returned by `start_refresh`. Dropping it leaves the run going.
#[derive(Debug)]
pub struct RefreshHandle {
    pub profile_key: String,
    pub generation: u64,
    pub run_id: Uuid,
    join: JoinHandle<()>,
}

impl RefreshHandle {
    /// Waits for the run and its state update to finish.
    pub async fn wait(self) -> Result<(), JoinError> {
        self.join.await
    }
}

/// One scheduled pipeline run. Its completion writes the result into the
/// state store unless a newer refresh for the same key has started since.
struct RefreshTask {
    profile_key: String,
    generation: u64,
    run_id: Uuid,
    pipeline: Arc<ContentRefreshPipeline>,
    store: Arc<dyn RefreshStateStore>,
}

impl RefreshTask {
    async fn run(self) {
        let started = Instant::now();
        info!(
            "[refresh {}] Starting content refresh for '{}' (generation {})",
            self.run_id, self.profile_key, self.generation
        );
        let result = self.pipeline.run(&self.profile_key).await;
        let state = match result {
            Ok(assignment) => {
                info!(
                    "[refresh {}] '{}' complete: {} arms assigned in {:.2?}",
                    self.run_id,
                    self.profile_key,
                    assignment.len(),
                    started.elapsed()
                );
                ProfileRefreshState::complete(self.generation, assignment)
            }
            Err(e) => {
                error!(
                    "[refresh {}] '{}' failed after {:.2?}: {}",
                    self.run_id,
                    self.profile_key,
                    started.elapsed(),
                    e
                );
                ProfileRefreshState::failed(self.generation, e.to_string())
            }
        };
        self.complete(state).await;
    }

    async fn complete(&self, state: ProfileRefreshState) {
        if !self.store.put_if_current(&self.profile_key, state).await {
            warn!(
                "[refresh {}] Discarding result for '{}': generation {} was superseded",
                self.run_id, self.profile_key, self.generation
            );
        }
    }
}

/// Per-profile refresh state machine in front of the content pipeline.
///
/// Readers that get `None` from `get_assignment` must serve the default
/// content of the profile's category.
pub struct RefreshCache {
    store: Arc<dyn RefreshStateStore>,
    pipeline: Arc<ContentRefreshPipeline>,
    next_generation: AtomicU64,
}

impl RefreshCache {
    pub fn new(store: Arc<dyn RefreshStateStore>, pipeline: Arc<ContentRefreshPipeline>) -> Self {
        Self {
            store,
            pipeline,
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn pipeline(&self) -> &Arc<ContentRefreshPipeline> {
        &self.pipeline
    }

    /// Drops whatever is cached for `profile_key`, marks it processing and
    /// schedules a pipeline run on the current tokio runtime. Always starts a
    /// new run, even if one is already in flight.
    pub async fn start_refresh(&self, profile_key: &str) -> RefreshHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let run_id = Uuid::new_v4();

        self.store
            .put(profile_key, ProfileRefreshState::processing(generation))
            .await;

        let task = RefreshTask {
            profile_key: profile_key.to_string(),
            generation,
            run_id,
            pipeline: Arc::clone(&self.pipeline),
            store: Arc::clone(&self.store),
        };
        let join = tokio::spawn(task.run());

        RefreshHandle {
            profile_key: profile_key.to_string(),
            generation,
            run_id,
            join,
        }
    }

    pub async fn get_status(&self, profile_key: &str) -> ProfileRefreshState {
        self.store
            .get(profile_key)
            .await
            .unwrap_or_else(ProfileRefreshState::not_started)
    }

    pub async fn get_assignment(&self, profile_key: &str) -> Option<Assignment> {
        self.store
            .get(profile_key)
            .await
            .and_then(|state| state.assignment().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PromoError, PromoResult};
    use crate::generation::{GenerationPrompt, GenerationService};
    use crate::models::RefreshStatus;
    use crate::refresh::pipeline::tests::{pipeline_with, FixedGenerator, KeywordEmbedder};
    use crate::refresh::state_store::InMemoryRefreshStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tokio::sync::oneshot;

    const MESSAGES: [&str; 3] = [
        "A home of your own is closer than you think",
        "Start your home search with a plan",
        "Find the place that feels like home",
    ];

    /// Each call waits for its own release signal, then answers with the
    /// paired messages or an error.
    struct GatedGenerator {
        gates: Mutex<VecDeque<(oneshot::Receiver<()>, PromoResult<Vec<String>>)>>,
    }

    impl GatedGenerator {
        fn new() -> Self {
            Self {
                gates: Mutex::new(VecDeque::new()),
            }
        }

        fn push(&self, result: PromoResult<Vec<String>>) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().push_back((rx, result));
            tx
        }
    }

    #[async_trait]
    impl GenerationService for GatedGenerator {
        async fn generate(&self, _prompt: &GenerationPrompt) -> PromoResult<Vec<String>> {
            let next = self.gates.lock().pop_front();
            let (gate, result) = match next {
                Some(entry) => entry,
                None => return Err(PromoError::Generation("no scripted response".into())),
            };
            let _ = gate.await;
            result
        }
    }

    fn messages(texts: &[&str]) -> PromoResult<Vec<String>> {
        Ok(texts.iter().map(|m| m.to_string()).collect())
    }

    fn cache_with(generator: Arc<dyn GenerationService>) -> RefreshCache {
        let pipeline = Arc::new(pipeline_with(generator, Arc::new(KeywordEmbedder)));
        RefreshCache::new(Arc::new(InMemoryRefreshStore::new()), pipeline)
    }

    #[tokio::test]
    async fn test_unseen_profile_is_not_started() {
        let cache = cache_with(Arc::new(FixedGenerator::new(&MESSAGES)));
        let state = cache.get_status("nobody").await;
        assert_eq!(state.status, RefreshStatus::NotStarted);
        assert!(cache.get_assignment("nobody").await.is_none());
    }

    #[tokio::test]
    async fn test_processing_then_complete() {
        let generator = Arc::new(GatedGenerator::new());
        let release = generator.push(messages(&MESSAGES));
        let cache = cache_with(generator);

        let handle = cache.start_refresh("u1").await;
        assert_eq!(cache.get_status("u1").await.status, RefreshStatus::Processing);
        assert!(cache.get_assignment("u1").await.is_none());

        release.send(()).unwrap();
        handle.wait().await.unwrap();

        let state = cache.get_status("u1").await;
        assert_eq!(state.status.as_str(), "complete");
        let assignment = cache.get_assignment("u1").await.unwrap();
        let keys: Vec<&String> = assignment.keys().collect();
        assert_eq!(keys, vec!["headline_A", "headline_D", "headline_E"]);
    }

    #[tokio::test]
    async fn test_failure_records_error_without_assignment() {
        let cache = cache_with(Arc::new(FixedGenerator::failing()));
        cache.start_refresh("u1").await.wait().await.unwrap();
        let state = cache.get_status("u1").await;
        match &state.status {
            RefreshStatus::Error { message } => assert!(message.contains("model unavailable")),
            other => panic!("unexpected status {:?}", other),
        }
        assert!(cache.get_assignment("u1").await.is_none());
    }

    #[tokio::test]
    async fn test_restart_discards_previous_assignment() {
        let generator = Arc::new(GatedGenerator::new());
        let first = generator.push(messages(&MESSAGES));
        let second = generator.push(messages(&MESSAGES));
        let cache = cache_with(generator);

        let handle = cache.start_refresh("u1").await;
        first.send(()).unwrap();
        handle.wait().await.unwrap();
        let completed_at = cache.get_status("u1").await.updated_at;
        assert!(cache.get_assignment("u1").await.is_some());

        let handle = cache.start_refresh("u1").await;
        let state = cache.get_status("u1").await;
        assert_eq!(state.status, RefreshStatus::Processing);
        assert!(state.updated_at >= completed_at);
        assert!(cache.get_assignment("u1").await.is_none());

        second.send(()).unwrap();
        handle.wait().await.unwrap();
        assert!(cache.get_assignment("u1").await.is_some());
    }

    #[tokio::test]
    async fn test_superseded_run_cannot_overwrite_newer_one() {
        let generator = Arc::new(GatedGenerator::new());
        let slow = generator.push(Err(PromoError::Generation("stale failure".into())));
        let fast = generator.push(messages(&MESSAGES));
        let cache = cache_with(generator);

        let old = cache.start_refresh("u1").await;
        // Let the first run reach its gate before the second one starts.
        tokio::task::yield_now().await;
        let new = cache.start_refresh("u1").await;
        assert!(new.generation > old.generation);

        fast.send(()).unwrap();
        new.wait().await.unwrap();
        slow.send(()).unwrap();
        old.wait().await.unwrap();

        let state = cache.get_status("u1").await;
        assert_eq!(state.status.as_str(), "complete");
        assert_eq!(state.generation, 2);
    }

    #[tokio::test]
    async fn test_profiles_refresh_independently() {
        let cache = cache_with(Arc::new(FixedGenerator::new(&MESSAGES)));
        let a = cache.start_refresh("u1").await;
        let b = cache.start_refresh("u2").await;
        a.wait().await.unwrap();
        b.wait().await.unwrap();
        assert!(cache.get_assignment("u1").await.unwrap().contains_key("headline_A"));
        assert!(cache.get_assignment("u2").await.unwrap().contains_key("headline_C"));
    }
}
