// src/bandit/arm.rs
use log::warn;
use rand::Rng;
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};

use crate::error::{PromoError, PromoResult};

/// Shape value of the uniform Beta(1, 1) prior.
pub const PRIOR_SHAPE: f64 = 1.0;

/// A binary outcome reported for a served arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Failure,
    Success,
}

impl Outcome {
    pub fn from_reward(reward: i64) -> PromoResult<Self> {
        match reward {
            0 => Ok(Outcome::Failure),
            1 => Ok(Outcome::Success),
            other => Err(PromoError::InvalidOutcome(other)),
        }
    }

    pub fn reward(self) -> f64 {
        match self {
            Outcome::Success => 1.0,
            Outcome::Failure => 0.0,
        }
    }
}

/// Beta-Bernoulli posterior for a single arm.
///
/// `alpha` counts successes plus the prior, `beta` failures plus the prior.
/// Both only grow, so they stay at or above [`PRIOR_SHAPE`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Arm {
    pub alpha: f64,
    pub beta: f64,
    pub total_reward: f64,
    pub num_pulls: u64,
}

impl Default for Arm {
    fn default() -> Self {
        Self {
            alpha: PRIOR_SHAPE,
            beta: PRIOR_SHAPE,
            total_reward: 0.0,
            num_pulls: 0,
        }
    }
}

impl Arm {
    /// Draws one success probability from Beta(alpha, beta).
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match Beta::new(self.alpha, self.beta) {
            Ok(dist) => dist.sample(rng),
            Err(e) => {
                // Only reachable with corrupted parameters; fall back to the mean.
                warn!(
                    "Invalid Beta parameters (alpha={}, beta={}): {}. Using posterior mean.",
                    self.alpha, self.beta, e
                );
                self.posterior_mean()
            }
        }
    }

    pub fn update(&mut self, outcome: Outcome) {
        let reward = outcome.reward();
        self.alpha += reward;
        self.beta += 1.0 - reward;
        self.total_reward += reward;
        self.num_pulls += 1;
    }

    pub fn average_reward(&self) -> f64 {
        if self.num_pulls > 0 {
            self.total_reward / self.num_pulls as f64
        } else {
            0.0
        }
    }

    pub fn posterior_mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// A persisted arm is usable only if both shapes are finite and at or
    /// above the prior, and the reward total fits within the pull count.
    pub fn is_well_formed(&self) -> bool {
        self.alpha.is_finite()
            && self.beta.is_finite()
            && self.alpha >= PRIOR_SHAPE
            && self.beta >= PRIOR_SHAPE
            && self.total_reward.is_finite()
            && self.total_reward >= 0.0
            && self.total_reward <= self.num_pulls as f64
    }
}

/// Read-only view of an arm returned by `BanditEngine::get_state`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ArmStats {
    pub alpha: f64,
    pub beta: f64,
    pub total_reward: f64,
    pub num_pulls: u64,
    pub average_reward: f64,
}

impl From<&Arm> for ArmStats {
    fn from(arm: &Arm) -> Self {
        Self {
            alpha: arm.alpha,
            beta: arm.beta,
            total_reward: arm.total_reward,
            num_pulls: arm.num_pulls,
            average_reward: arm.average_reward(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_update_moves_both_shapes_by_one() {
        let mut arm = Arm::default();
        arm.update(Outcome::Success);
        arm.update(Outcome::Failure);
        assert_eq!(arm.alpha, 2.0);
        assert_eq!(arm.beta, 2.0);
        assert_eq!(arm.num_pulls, 2);
        assert_eq!(arm.total_reward, 1.0);
        assert!((arm.average_reward() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_outcome_rejects_non_binary_reward() {
        assert_eq!(Outcome::from_reward(1).unwrap(), Outcome::Success);
        assert_eq!(Outcome::from_reward(0).unwrap(), Outcome::Failure);
        assert!(matches!(
            Outcome::from_reward(2),
            Err(PromoError::InvalidOutcome(2))
        ));
    }

    #[test]
    fn test_samples_stay_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(7);
        let arm = Arm {
            alpha: 3.0,
            beta: 40.0,
            total_reward: 2.0,
            num_pulls: 41,
        };
        for _ in 0..1000 {
            let s = arm.sample(&mut rng);
            assert!((0.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn test_malformed_arm_detection() {
        let mut arm = Arm::default();
        assert!(arm.is_well_formed());
        arm.alpha = f64::NAN;
        assert!(!arm.is_well_formed());
        arm.alpha = 0.0;
        assert!(!arm.is_well_formed());
        arm.alpha = 0.5;
        assert!(!arm.is_well_formed());

        let mut arm = Arm::default();
        arm.update(Outcome::Success);
        assert!(arm.is_well_formed());
        arm.total_reward = 2.0;
        assert!(!arm.is_well_formed());
    }
}
