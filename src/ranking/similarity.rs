// src/ranking/similarity.rs
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{PromoError, PromoResult};
use crate::utils::candle::cosine_similarities_candle;

/// A generated message scored against the reference profile vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub label: String,
    /// Cosine similarity in [-1, 1].
    pub similarity: f64,
    /// Position of the candidate in the input sequence.
    pub index: usize,
}

/// Ranks candidate vectors by cosine similarity to a reference vector.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityRanker;

impl SimilarityRanker {
    pub fn new() -> Self {
        Self
    }

    /// Returns one entry per candidate, most similar first. Equal scores keep
    /// their input order. Inputs are not modified.
    pub fn rank(
        &self,
        reference: &[f32],
        candidates: &[Vec<f32>],
        labels: &[String],
    ) -> PromoResult<Vec<RankedCandidate>> {
        if candidates.len() != labels.len() {
            return Err(PromoError::DimensionMismatch(format!(
                "{} candidate vectors but {} labels",
                candidates.len(),
                labels.len()
            )));
        }
        if let Some((i, c)) = candidates
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() != reference.len())
        {
            return Err(PromoError::DimensionMismatch(format!(
                "candidate {} has {} dimensions, reference has {}",
                i,
                c.len(),
                reference.len()
            )));
        }

        let similarities = cosine_similarities_candle(reference, candidates)
            .map_err(|e| PromoError::Similarity(format!("{:#}", e)))?;

        let mut ranked: Vec<RankedCandidate> = labels
            .iter()
            .zip(similarities)
            .enumerate()
            .map(|(index, (label, similarity))| RankedCandidate {
                label: label.clone(),
                similarity,
                index,
            })
            .collect();

        // sort_by is stable, so ties stay in input order.
        ranked.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if let Some(top) = ranked.first() {
            debug!(
                "Ranked {} candidates; top #{} at {:.4}",
                ranked.len(),
                top.index,
                top.similarity
            );
        }
        Ok(ranked)
    }
}
