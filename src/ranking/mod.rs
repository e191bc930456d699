// src/ranking/mod.rs
pub mod similarity;

pub use similarity::{RankedCandidate, SimilarityRanker};
