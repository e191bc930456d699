// src/catalog.rs
//! Declarative campaign configuration: which categories exist, which arm
//! slots each category owns (in assignment order), their default content,
//! and the known profiles.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use url::Url;

use crate::error::PromoError;
use crate::models::{ArmContent, Assignment};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmSlot {
    pub key: String,
    pub message: String,
    pub url: String,
}

impl ArmSlot {
    pub fn default_content(&self) -> ArmContent {
        ArmContent {
            message: self.message.clone(),
            url: self.url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    /// Human-readable form used in generation prompts (e.g. "HELOC" ->
    /// "Home Equity Line of Credit"). Falls back to `name`.
    #[serde(default)]
    pub label: Option<String>,
    pub arms: Vec<ArmSlot>,
}

impl CategoryConfig {
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    pub fn default_assignment(&self) -> Assignment {
        self.arms
            .iter()
            .map(|slot| (slot.key.clone(), slot.default_content()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDescriptor {
    pub category: String,
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignConfig {
    pub default_category: String,
    pub categories: Vec<CategoryConfig>,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileDescriptor>,
}

/// Looks up the category and rationale for a profile key.
pub trait ProfileDirectory: Send + Sync {
    fn resolve(&self, profile_key: &str) -> Option<ProfileDescriptor>;
}

/// Profiles listed inline in the campaign configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticProfileDirectory {
    profiles: HashMap<String, ProfileDescriptor>,
}

impl StaticProfileDirectory {
    pub fn new(profiles: HashMap<String, ProfileDescriptor>) -> Self {
        Self { profiles }
    }
}

impl ProfileDirectory for StaticProfileDirectory {
    fn resolve(&self, profile_key: &str) -> Option<ProfileDescriptor> {
        self.profiles.get(profile_key).cloned()
    }
}

/// Validated view over [`CampaignConfig`].
#[derive(Debug, Clone)]
pub struct ArmCatalog {
    default_category: String,
    categories: Vec<CategoryConfig>,
    category_index: HashMap<String, usize>,
    arm_index: HashMap<String, (usize, usize)>,
}

impl ArmCatalog {
    pub fn from_config(config: &CampaignConfig) -> Result<Self, PromoError> {
        if config.categories.is_empty() {
            return Err(PromoError::Config("no categories configured".to_string()));
        }

        let mut category_index = HashMap::new();
        let mut arm_index = HashMap::new();
        for (ci, category) in config.categories.iter().enumerate() {
            if category.arms.is_empty() {
                return Err(PromoError::Config(format!(
                    "category '{}' has no arm slots",
                    category.name
                )));
            }
            if category_index.insert(category.name.clone(), ci).is_some() {
                return Err(PromoError::Config(format!(
                    "duplicate category '{}'",
                    category.name
                )));
            }
            for (si, slot) in category.arms.iter().enumerate() {
                Url::parse(&slot.url).map_err(|e| {
                    PromoError::Config(format!("arm '{}' has invalid url '{}': {}", slot.key, slot.url, e))
                })?;
                if arm_index.insert(slot.key.clone(), (ci, si)).is_some() {
                    return Err(PromoError::Config(format!(
                        "arm '{}' appears in more than one slot",
                        slot.key
                    )));
                }
            }
        }

        if !category_index.contains_key(&config.default_category) {
            return Err(PromoError::Config(format!(
                "default category '{}' is not configured",
                config.default_category
            )));
        }

        let known: HashSet<&String> = category_index.keys().collect();
        for (profile, descriptor) in &config.profiles {
            if !known.contains(&descriptor.category) {
                warn!(
                    "Profile '{}' maps to unconfigured category '{}'; it will receive default content",
                    profile, descriptor.category
                );
            }
        }

        Ok(Self {
            default_category: config.default_category.clone(),
            categories: config.categories.clone(),
            category_index,
            arm_index,
        })
    }

    /// Every arm key across all categories, in configuration order.
    pub fn arm_keys(&self) -> Vec<String> {
        self.categories
            .iter()
            .flat_map(|c| c.arms.iter().map(|slot| slot.key.clone()))
            .collect()
    }

    pub fn default_category(&self) -> &CategoryConfig {
        // Validated in from_config.
        &self.categories[self.category_index[&self.default_category]]
    }

    pub fn category(&self, name: &str) -> Option<&CategoryConfig> {
        self.category_index.get(name).map(|&i| &self.categories[i])
    }

    /// The named category, or the default category when it is unknown.
    pub fn category_or_default(&self, name: &str) -> &CategoryConfig {
        self.category(name).unwrap_or_else(|| self.default_category())
    }

    pub fn slot(&self, arm_key: &str) -> Option<&ArmSlot> {
        self.arm_index
            .get(arm_key)
            .map(|&(ci, si)| &self.categories[ci].arms[si])
    }

    pub fn default_content(&self, arm_key: &str) -> Option<ArmContent> {
        self.slot(arm_key).map(ArmSlot::default_content)
    }
}

/// Reads and validates the campaign file.
pub fn load_campaign_config(path: &Path) -> Result<(CampaignConfig, ArmCatalog)> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read campaign config {}", path.display()))?;
    let config: CampaignConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse campaign config {}", path.display()))?;
    let catalog = ArmCatalog::from_config(&config)
        .with_context(|| format!("Invalid campaign config {}", path.display()))?;
    info!(
        "Loaded campaign config: {} categories, {} arms, {} profiles (default category: {})",
        config.categories.len(),
        catalog.arm_keys().len(),
        config.profiles.len(),
        config.default_category
    );
    Ok((config, catalog))
}
