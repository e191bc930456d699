// src/bandit/engine.rs
use log::{debug, error, info};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::bandit::arm::{Arm, ArmStats, Outcome};
use crate::bandit::posterior_store::{PosteriorSnapshot, PosteriorStore};
use crate::error::{PromoError, PromoResult};

/// Arms in registration order plus a key index.
#[derive(Debug, Default)]
struct ArmTable {
    keys: Vec<String>,
    arms: Vec<Arm>,
    index: HashMap<String, usize>,
}

impl ArmTable {
    fn snapshot(&self) -> PosteriorSnapshot {
        PosteriorSnapshot::new(
            self.keys
                .iter()
                .cloned()
                .zip(self.arms.iter().cloned())
                .collect(),
        )
    }
}

/// Thompson-sampling bandit over a fixed set of arms.
///
/// `choose` and `get_state` take a shared read lock. `report_outcome` holds the
/// store mutex for the whole update-then-persist sequence, so updates and
/// state-file writes happen in a single global order; the arm table is only
/// write-locked for the in-memory mutation itself.
pub struct BanditEngine {
    table: RwLock<ArmTable>,
    store: Mutex<PosteriorStore>,
    pending_write: AtomicBool,
}

impl BanditEngine {
    /// Registers one Beta(1, 1) arm per key, then overlays any persisted
    /// posterior for matching keys. Duplicate keys are registered once.
    pub fn initialize<I, S>(arm_keys: I, store: PosteriorStore) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = ArmTable::default();
        for key in arm_keys {
            let key = key.into();
            if table.index.contains_key(&key) {
                continue;
            }
            table.index.insert(key.clone(), table.keys.len());
            table.keys.push(key);
            table.arms.push(Arm::default());
        }

        match store.load() {
            Some(snapshot) => {
                let mut loaded = 0usize;
                for (key, persisted) in &snapshot.arms {
                    if let Some(&idx) = table.index.get(key) {
                        table.arms[idx] = persisted.clone();
                        loaded += 1;
                        info!(
                            "  {}: alpha={:.2}, beta={:.2}, total_reward={}, pulls={}, avg={:.3}",
                            key,
                            persisted.alpha,
                            persisted.beta,
                            persisted.total_reward,
                            persisted.num_pulls,
                            persisted.average_reward()
                        );
                    } else {
                        debug!("Ignoring persisted arm '{}' (not configured)", key);
                    }
                }
                let new_arms: Vec<&String> = table
                    .keys
                    .iter()
                    .filter(|k| !snapshot.arms.contains_key(*k))
                    .collect();
                if !new_arms.is_empty() {
                    info!("New arms (not in saved state), starting at Beta(1,1): {:?}", new_arms);
                }
                info!(
                    "Bandit state loaded: {} of {} arms restored",
                    loaded,
                    table.keys.len()
                );
            }
            None => {
                info!(
                    "Initialized {} arms with uniform Beta(1,1) priors",
                    table.keys.len()
                );
            }
        }

        Self {
            table: RwLock::new(table),
            store: Mutex::new(store),
            pending_write: AtomicBool::new(false),
        }
    }

    /// Samples every posterior once and returns the arm with the highest draw.
    /// Ties keep the earliest registered arm. `None` only when no arms exist.
    pub fn choose(&self) -> Option<String> {
        self.choose_with_rng(&mut rand::thread_rng())
    }

    pub fn choose_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        let table = self.table.read();
        let mut best: Option<(usize, f64)> = None;
        for (idx, arm) in table.arms.iter().enumerate() {
            let draw = arm.sample(rng);
            match best {
                Some((_, best_draw)) if draw <= best_draw => {}
                _ => best = Some((idx, draw)),
            }
        }
        best.map(|(idx, _)| table.keys[idx].clone())
    }

    /// Applies one binary outcome and persists the full posterior.
    ///
    /// A failed write does not undo the in-memory update: the engine records a
    /// pending write, which the next successful save (or `flush_pending`)
    /// clears.
    pub fn report_outcome(&self, arm_key: &str, outcome: Outcome) -> PromoResult<ArmStats> {
        let store = self.store.lock();

        let (stats, snapshot) = {
            let mut table = self.table.write();
            let idx = *table
                .index
                .get(arm_key)
                .ok_or_else(|| PromoError::UnknownArm(arm_key.to_string()))?;
            let mut updated = table.arms[idx].clone();
            updated.update(outcome);
            table.arms[idx] = updated;
            let stats = ArmStats::from(&table.arms[idx]);
            (stats, table.snapshot())
        };

        debug!(
            "Reward updated: {} -> alpha={:.2}, beta={:.2}, avg={:.3} (pulls: {})",
            arm_key, stats.alpha, stats.beta, stats.average_reward, stats.num_pulls
        );

        self.persist(&store, &snapshot);
        Ok(stats)
    }

    /// Convenience wrapper taking the raw 0/1 reward.
    pub fn report_reward(&self, arm_key: &str, reward: i64) -> PromoResult<ArmStats> {
        let outcome = Outcome::from_reward(reward)?;
        self.report_outcome(arm_key, outcome)
    }

    pub fn get_state(&self) -> BTreeMap<String, ArmStats> {
        let table = self.table.read();
        table
            .keys
            .iter()
            .zip(table.arms.iter())
            .map(|(key, arm)| (key.clone(), ArmStats::from(arm)))
            .collect()
    }

    pub fn snapshot(&self) -> PosteriorSnapshot {
        self.table.read().snapshot()
    }

    pub fn has_pending_write(&self) -> bool {
        self.pending_write.load(Ordering::SeqCst)
    }

    /// Retries a previously failed state write. No-op when nothing is pending.
    pub fn flush_pending(&self) -> PromoResult<()> {
        if !self.has_pending_write() {
            return Ok(());
        }
        let store = self.store.lock();
        let snapshot = self.snapshot();
        store.save(&snapshot)?;
        self.pending_write.store(false, Ordering::SeqCst);
        info!("Pending bandit state write flushed to {}", store.canonical_path().display());
        Ok(())
    }

    fn persist(&self, store: &PosteriorStore, snapshot: &PosteriorSnapshot) {
        match store.save(snapshot) {
            Ok(()) => {
                if self.pending_write.swap(false, Ordering::SeqCst) {
                    info!("Bandit state write recovered; pending state persisted");
                }
            }
            Err(e) => {
                self.pending_write.store(true, Ordering::SeqCst);
                error!(
                    "Failed to persist bandit state to {}: {}. Update kept in memory; write pending.",
                    store.canonical_path().display(),
                    e
                );
            }
        }
    }
}
