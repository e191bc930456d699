// src/bandit/mod.rs
//! Thompson-sampling bandit over message arms, with crash-safe persistence of
//! the Beta posteriors.

pub mod arm;
pub mod engine;
pub mod posterior_store;

pub use arm::{Arm, ArmStats, Outcome, PRIOR_SHAPE};
pub use engine::BanditEngine;
pub use posterior_store::{PosteriorSnapshot, PosteriorStore};
