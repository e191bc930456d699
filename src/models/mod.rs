// src/models/mod.rs
pub mod content;
pub mod refresh_state;

pub use content::{ArmContent, Assignment, ContentSource, Recommendation, RecommendedArm};
pub use refresh_state::{ProfileRefreshState, RefreshStatus};
