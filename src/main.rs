// src/main.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use promo_bandit::{
    bandit::{BanditEngine, Outcome, PosteriorStore},
    catalog::{load_campaign_config, StaticProfileDirectory},
    generation::{OllamaEmbedder, OllamaGenerator},
    refresh::{BatchEmbedder, ContentRefreshPipeline, InMemoryRefreshStore, RefreshCache},
    serving::PromoService,
    utils::{engine_config::EngineConfig, env::load_env},
};

const HTTP_TIMEOUT_SECS: u64 = 120;
const GENERATION_RETRY_DELAY_MS: u64 = 1000;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pick an arm by Thompson sampling
    Choose,

    /// Report a 0/1 outcome for an arm
    Reward {
        #[arg(long)]
        arm: String,

        /// 1 for a click/conversion, 0 otherwise
        #[arg(long)]
        outcome: i64,
    },

    /// Print the posterior of every arm
    State,

    /// Print the content a profile would be served
    Recommend {
        #[arg(long)]
        profile: String,
    },

    /// Regenerate content for a profile and print the result
    Refresh {
        #[arg(long)]
        profile: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{}", rendered);
    Ok(())
}

fn build_service(config: &EngineConfig) -> Result<PromoService> {
    let (campaign, catalog) = load_campaign_config(&config.campaign_config_path)?;
    let catalog = Arc::new(catalog);
    let profiles = Arc::new(StaticProfileDirectory::new(campaign.profiles));

    let store = PosteriorStore::new(config.state_dir.clone(), config.state_file.clone());
    let engine = Arc::new(BanditEngine::initialize(catalog.arm_keys(), store));

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .context("Failed to build HTTP client")?;
    let generator = OllamaGenerator::new(
        client.clone(),
        config.ollama_url.clone(),
        config.generation_model.clone(),
    )
    .with_retries(
        config.generation_max_retries,
        Duration::from_millis(GENERATION_RETRY_DELAY_MS),
    );
    let embedder = OllamaEmbedder::new(
        client,
        config.ollama_url.clone(),
        config.embedding_model.clone(),
        config.embedding_dimensions,
    );

    let pipeline = ContentRefreshPipeline::new(
        Arc::clone(&catalog),
        profiles.clone(),
        Arc::new(generator),
        BatchEmbedder::new(
            Arc::new(embedder),
            config.embedding_concurrency,
            config.embedding_retry.clone(),
        ),
    )
    .with_candidate_count(config.candidate_count);

    let refresh = RefreshCache::new(Arc::new(InMemoryRefreshStore::new()), Arc::new(pipeline));
    Ok(PromoService::new(engine, refresh, profiles))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();
    let cli = Cli::parse();

    let config = EngineConfig::from_env();
    config.log_config();

    let service = build_service(&config)?;

    match cli.command {
        Command::Choose => {
            let arm = service.choose().context("No arms configured")?;
            print_json(&serde_json::json!({ "arm_id": arm }))?;
        }
        Command::Reward { arm, outcome } => {
            let outcome = Outcome::from_reward(outcome)?;
            let stats = service
                .report_outcome(&arm, outcome)
                .with_context(|| format!("Failed to record outcome for '{}'", arm))?;
            print_json(&serde_json::json!({ "arm_id": arm, "stats": stats }))?;
        }
        Command::State => {
            print_json(&service.get_state())?;
        }
        Command::Recommend { profile } => {
            print_json(&service.recommend(&profile).await)?;
        }
        Command::Refresh { profile } => {
            let started = Instant::now();
            let handle = service.start_refresh(&profile).await;
            info!(
                "Refresh {} started for '{}' (generation {})",
                handle.run_id, handle.profile_key, handle.generation
            );
            handle.wait().await.context("Refresh task panicked")?;
            info!("Refresh for '{}' finished in {:.2?}", profile, started.elapsed());
            print_json(&service.get_status(&profile).await)?;
        }
    }

    if service.engine().has_pending_write() {
        warn!("Bandit state has an unsaved update; retrying write before exit");
        service
            .engine()
            .flush_pending()
            .context("Failed to persist bandit state")?;
    }

    Ok(())
}
