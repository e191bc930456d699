// src/refresh/pipeline.rs
use log::{debug, info, warn};
use std::sync::Arc;

use crate::catalog::{ArmCatalog, CategoryConfig, ProfileDirectory};
use crate::error::{PromoError, PromoResult};
use crate::generation::{GenerationPrompt, GenerationService};
use crate::models::{ArmContent, Assignment};
use crate::ranking::{RankedCandidate, SimilarityRanker};
use crate::refresh::embedding_batch::BatchEmbedder;

pub const DEFAULT_CANDIDATE_COUNT: usize = 10;
const UNKNOWN_PROFILE_RATIONALE: &str = "No profile details are available for this user";

/// Generate -> embed -> rank -> assign, for one profile.
pub struct ContentRefreshPipeline {
    catalog: Arc<ArmCatalog>,
    profiles: Arc<dyn ProfileDirectory>,
    generator: Arc<dyn GenerationService>,
    embedder: BatchEmbedder,
    ranker: SimilarityRanker,
    candidate_count: usize,
}

impl ContentRefreshPipeline {
    pub fn new(
        catalog: Arc<ArmCatalog>,
        profiles: Arc<dyn ProfileDirectory>,
        generator: Arc<dyn GenerationService>,
        embedder: BatchEmbedder,
    ) -> Self {
        Self {
            catalog,
            profiles,
            generator,
            embedder,
            ranker: SimilarityRanker::new(),
            candidate_count: DEFAULT_CANDIDATE_COUNT,
        }
    }

    pub fn with_candidate_count(mut self, candidate_count: usize) -> Self {
        self.candidate_count = candidate_count.max(1);
        self
    }

    pub fn catalog(&self) -> &Arc<ArmCatalog> {
        &self.catalog
    }

    /// The category a profile's content is drawn from: its configured
    /// category, or the default one for unknown profiles and unmapped
    /// categories.
    pub fn resolve_category(&self, profile_key: &str) -> &CategoryConfig {
        match self.profiles.resolve(profile_key) {
            Some(descriptor) => self.catalog.category_or_default(&descriptor.category),
            None => self.catalog.default_category(),
        }
    }

    pub async fn run(&self, profile_key: &str) -> PromoResult<Assignment> {
        // 1. Profile -> category + rationale.
        let (category_name, rationale) = match self.profiles.resolve(profile_key) {
            Some(descriptor) => (descriptor.category, descriptor.rationale),
            None => {
                let fallback = self.catalog.default_category().name.clone();
                info!(
                    "Profile '{}' unknown; using default category '{}'",
                    profile_key, fallback
                );
                (fallback, UNKNOWN_PROFILE_RATIONALE.to_string())
            }
        };

        let category = match self.catalog.category(&category_name) {
            Some(category) => category,
            None => {
                warn!(
                    "Profile '{}' maps to unconfigured category '{}'; serving defaults of '{}'",
                    profile_key,
                    category_name,
                    self.catalog.default_category().name
                );
                return Ok(self.catalog.default_category().default_assignment());
            }
        };

        // 2-3. Prompt and candidate generation.
        let prompt =
            GenerationPrompt::for_profile(category.display_label(), &rationale, self.candidate_count);
        let candidates = self.generator.generate(&prompt).await?;
        if candidates.is_empty() {
            return Err(PromoError::Generation(
                "generation service returned no candidates".to_string(),
            ));
        }
        debug!(
            "Profile '{}': {} candidates generated for category '{}'",
            profile_key,
            candidates.len(),
            category.name
        );

        // 4. Reference first, then every candidate, in order.
        let mut texts = Vec::with_capacity(candidates.len() + 1);
        texts.push(prompt.reference.clone());
        texts.extend(candidates.iter().cloned());
        let mut vectors = self.embedder.embed_all(&texts).await?;
        let reference_vector = vectors.remove(0);

        // 5. Rank.
        let ranked = self.ranker.rank(&reference_vector, &vectors, &candidates)?;

        // 6. Assign.
        Ok(assign_ranked(profile_key, category, &ranked))
    }
}

/// Puts the i-th ranked message on the i-th arm slot, keeping each slot's
/// url. With fewer candidates than slots every slot keeps its default.
pub fn assign_ranked(
    profile_key: &str,
    category: &CategoryConfig,
    ranked: &[RankedCandidate],
) -> Assignment {
    let slots = category.arms.len();
    if ranked.len() < slots {
        warn!(
            "Profile '{}': only {} ranked candidates for {} slots in '{}'; using default content",
            profile_key,
            ranked.len(),
            slots,
            category.name
        );
        return category.default_assignment();
    }

    category
        .arms
        .iter()
        .zip(ranked.iter())
        .map(|(slot, candidate)| {
            info!(
                "Profile '{}': {} <- candidate #{} (similarity {:.4})",
                profile_key, slot.key, candidate.index, candidate.similarity
            );
            (
                slot.key.clone(),
                ArmContent {
                    message: candidate.label.clone(),
                    url: slot.url.clone(),
                },
            )
        })
        .collect()
}
