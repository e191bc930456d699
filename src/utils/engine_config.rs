// src/utils/engine_config.rs
use log::info;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::bandit::posterior_store::{DEFAULT_STATE_DIR, DEFAULT_STATE_FILE};
use crate::refresh::{DEFAULT_CANDIDATE_COUNT, DEFAULT_EMBEDDING_CONCURRENCY};
use crate::utils::retry::RetryPolicy;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Runtime settings, every one overridable from the environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub state_dir: PathBuf,
    pub state_file: String,
    pub campaign_config_path: PathBuf,
    pub ollama_url: String,
    pub generation_model: String,
    pub generation_max_retries: usize,
    pub candidate_count: usize,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub embedding_concurrency: usize,
    pub embedding_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            state_file: DEFAULT_STATE_FILE.to_string(),
            campaign_config_path: PathBuf::from("config/campaign.json"),
            ollama_url: "http://localhost:11434".to_string(),
            generation_model: "llama3.1".to_string(),
            generation_max_retries: 3,
            candidate_count: DEFAULT_CANDIDATE_COUNT,
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dimensions: 768,
            embedding_concurrency: DEFAULT_EMBEDDING_CONCURRENCY,
            embedding_retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let embedding_retry = RetryPolicy {
            max_attempts: env_or("EMBEDDING_MAX_ATTEMPTS", defaults.embedding_retry.max_attempts).max(1),
            base_delay: Duration::from_millis(env_or(
                "EMBEDDING_BASE_DELAY_MS",
                defaults.embedding_retry.base_delay.as_millis() as u64,
            )),
            max_delay: Duration::from_millis(env_or(
                "EMBEDDING_MAX_DELAY_MS",
                defaults.embedding_retry.max_delay.as_millis() as u64,
            )),
        };

        Self {
            state_dir: env::var("BANDIT_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_dir),
            state_file: env_string("BANDIT_STATE_FILE", &defaults.state_file),
            campaign_config_path: env::var("CAMPAIGN_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.campaign_config_path),
            ollama_url: env_string("OLLAMA_URL", &defaults.ollama_url),
            generation_model: env_string("GENERATION_MODEL", &defaults.generation_model),
            generation_max_retries: env_or("GENERATION_MAX_RETRIES", defaults.generation_max_retries).max(1),
            candidate_count: env_or("CANDIDATE_COUNT", defaults.candidate_count).max(1),
            embedding_model: env_string("EMBEDDING_MODEL", &defaults.embedding_model),
            embedding_dimensions: env_or("EMBEDDING_DIMENSIONS", defaults.embedding_dimensions),
            embedding_concurrency: env_or("EMBEDDING_CONCURRENCY", defaults.embedding_concurrency).max(1),
            embedding_retry,
        }
    }

    pub fn log_config(&self) {
        info!("🎰 Bandit state: {}", self.state_dir.join(&self.state_file).display());
        info!("   Campaign config: {}", self.campaign_config_path.display());
        info!(
            "✍️  Generation: {} @ {} ({} candidates, {} retries)",
            self.generation_model, self.ollama_url, self.candidate_count, self.generation_max_retries
        );
        info!(
            "🧭 Embeddings: {} ({} dims), concurrency {}, {} attempts, backoff {:?}..{:?}",
            self.embedding_model,
            self.embedding_dimensions,
            self.embedding_concurrency,
            self.embedding_retry.max_attempts,
            self.embedding_retry.base_delay,
            self.embedding_retry.max_delay
        );
    }
}
