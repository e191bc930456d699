// src/models/content.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Message text and click-through target served for one arm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmContent {
    pub message: String,
    pub url: String,
}

/// Arm key -> content for every slot of one category.
pub type Assignment = BTreeMap<String, ArmContent>;

/// Where a served message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    Refreshed,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedArm {
    pub arm_id: String,
    pub message: String,
    pub url: String,
    pub source: ContentSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub user_id: String,
    pub recommendations: Vec<RecommendedArm>,
}
