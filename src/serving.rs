// src/serving.rs
//! Serving boundary: the bandit, the arm catalog and the refresh cache behind
//! one handle.

use log::{debug, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::bandit::{ArmStats, BanditEngine, Outcome};
use crate::catalog::{ArmCatalog, ProfileDirectory};
use crate::error::PromoResult;
use crate::models::{
    Assignment, ContentSource, ProfileRefreshState, Recommendation, RecommendedArm,
};
use crate::refresh::{RefreshCache, RefreshHandle};

pub struct PromoService {
    engine: Arc<BanditEngine>,
    refresh: RefreshCache,
    profiles: Arc<dyn ProfileDirectory>,
}

impl PromoService {
    pub fn new(
        engine: Arc<BanditEngine>,
        refresh: RefreshCache,
        profiles: Arc<dyn ProfileDirectory>,
    ) -> Self {
        Self {
            engine,
            refresh,
            profiles,
        }
    }

    pub fn engine(&self) -> &Arc<BanditEngine> {
        &self.engine
    }

    pub fn catalog(&self) -> &ArmCatalog {
        self.refresh.pipeline().catalog()
    }

    pub fn choose(&self) -> Option<String> {
        self.engine.choose()
    }

    pub fn report_outcome(&self, arm_key: &str, outcome: Outcome) -> PromoResult<ArmStats> {
        self.engine.report_outcome(arm_key, outcome)
    }

    pub fn report_reward(&self, arm_key: &str, reward: i64) -> PromoResult<ArmStats> {
        self.engine.report_reward(arm_key, reward)
    }

    pub fn get_state(&self) -> BTreeMap<String, ArmStats> {
        self.engine.get_state()
    }

    pub async fn start_refresh(&self, profile_key: &str) -> RefreshHandle {
        self.refresh.start_refresh(profile_key).await
    }

    pub async fn get_status(&self, profile_key: &str) -> ProfileRefreshState {
        self.refresh.get_status(profile_key).await
    }

    pub async fn get_assignment(&self, profile_key: &str) -> Option<Assignment> {
        self.refresh.get_assignment(profile_key).await
    }

    /// Content to show `profile_key`.
    ///
    /// Known profiles get every slot of their category, refreshed where a
    /// completed assignment covers the slot and default otherwise. Unknown
    /// profiles get the single arm the bandit picks, with its default content.
    pub async fn recommend(&self, profile_key: &str) -> Recommendation {
        let recommendations = if self.profiles.resolve(profile_key).is_some() {
            self.recommend_category(profile_key).await
        } else {
            self.recommend_explore(profile_key)
        };
        Recommendation {
            user_id: profile_key.to_string(),
            recommendations,
        }
    }

    async fn recommend_category(&self, profile_key: &str) -> Vec<RecommendedArm> {
        let category = self.refresh.pipeline().resolve_category(profile_key);
        let assignment = self.refresh.get_assignment(profile_key).await;

        category
            .arms
            .iter()
            .map(|slot| match assignment.as_ref().and_then(|a| a.get(&slot.key)) {
                Some(content) => RecommendedArm {
                    arm_id: slot.key.clone(),
                    message: content.message.clone(),
                    url: content.url.clone(),
                    source: ContentSource::Refreshed,
                },
                None => RecommendedArm {
                    arm_id: slot.key.clone(),
                    message: slot.message.clone(),
                    url: slot.url.clone(),
                    source: ContentSource::Default,
                },
            })
            .collect()
    }

    fn recommend_explore(&self, profile_key: &str) -> Vec<RecommendedArm> {
        let Some(arm_key) = self.engine.choose() else {
            warn!("No arms registered; nothing to recommend to '{}'", profile_key);
            return Vec::new();
        };
        debug!("Unknown profile '{}': bandit chose '{}'", profile_key, arm_key);
        match self.catalog().default_content(&arm_key) {
            Some(content) => vec![RecommendedArm {
                arm_id: arm_key,
                message: content.message,
                url: content.url,
                source: ContentSource::Default,
            }],
            None => {
                warn!("Bandit arm '{}' has no configured content", arm_key);
                Vec::new()
            }
        }
    }
}
