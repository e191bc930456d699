// src/bandit/posterior_store.rs
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::bandit::arm::Arm;
use crate::error::{PromoError, PromoResult};

pub const DEFAULT_STATE_DIR: &str = "bandit_backup";
pub const DEFAULT_STATE_FILE: &str = "bandit_state.json";

/// Point-in-time copy of every arm's posterior.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PosteriorSnapshot {
    #[serde(default = "Utc::now", deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub arms: BTreeMap<String, Arm>,
}

/// Accepts RFC 3339 timestamps and offset-less ISO-8601 ones such as
/// `2025-06-01T12:34:56.789012`, which are read as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| {
        serde::de::Error::custom(format!("unrecognized state timestamp '{}'", raw))
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

impl PosteriorSnapshot {
    pub fn new(arms: BTreeMap<String, Arm>) -> Self {
        Self {
            timestamp: Utc::now(),
            arms,
        }
    }
}

/// Durable home of the bandit posterior.
///
/// The canonical file is never overwritten in place: each save rotates the
/// previous canonical file to a timestamped backup, leaving an audit trail of
/// every state the engine has been in.
#[derive(Debug, Clone)]
pub struct PosteriorStore {
    dir: PathBuf,
    file_name: String,
}

impl PosteriorStore {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
        }
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, DEFAULT_STATE_FILE)
    }

    pub fn canonical_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// First unused backup name for `at`; a numeric suffix keeps two saves
    /// within the same microsecond from sharing a file.
    fn backup_path(&self, at: DateTime<Utc>) -> PathBuf {
        let stem = Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("bandit_state");
        let base = format!("{}_{}", stem, at.format("%Y%m%d_%H%M%S_%6f"));
        let mut candidate = self.dir.join(format!("{}.json", base));
        let mut suffix = 1u32;
        while candidate.exists() {
            candidate = self.dir.join(format!("{}_{}.json", base, suffix));
            suffix += 1;
        }
        candidate
    }

    /// Reads the canonical snapshot.
    ///
    /// Returns `None` when there is no file or when it cannot be used; a broken
    /// state file must never stop the engine from starting.
    pub fn load(&self) -> Option<PosteriorSnapshot> {
        let path = self.canonical_path();
        if !path.exists() {
            info!(
                "No bandit state file found at: {}. Starting with fresh bandit state.",
                path.display()
            );
            return None;
        }

        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!("Error reading bandit state from {}: {}", path.display(), e);
                return None;
            }
        };

        let snapshot: PosteriorSnapshot = match serde_json::from_str(&contents) {
            Ok(s) => s,
            Err(e) => {
                warn!(
                    "Error parsing bandit state from {}: {}. Ignoring persisted state.",
                    path.display(),
                    e
                );
                return None;
            }
        };

        if let Some((key, arm)) = snapshot.arms.iter().find(|(_, arm)| !arm.is_well_formed()) {
            warn!(
                "Bandit state at {} has malformed arm '{}' ({:?}). Ignoring persisted state.",
                path.display(),
                key,
                arm
            );
            return None;
        }

        info!(
            "Loading bandit state from: {} (state timestamp: {})",
            path.display(),
            snapshot.timestamp.to_rfc3339()
        );
        Some(snapshot)
    }

    /// Writes `snapshot` as the new canonical state.
    ///
    /// The snapshot goes to a temp file first, then the old canonical file is
    /// rotated to a backup and the temp file is renamed into place.
    pub fn save(&self, snapshot: &PosteriorSnapshot) -> PromoResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            PromoError::Persistence(format!(
                "failed to create state directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| PromoError::Persistence(format!("failed to serialize snapshot: {}", e)))?;

        let canonical = self.canonical_path();
        let temp_path = canonical.with_extension("json.tmp");
        fs::write(&temp_path, json).map_err(|e| {
            PromoError::Persistence(format!("failed to write {}: {}", temp_path.display(), e))
        })?;

        if canonical.exists() {
            let backup = self.backup_path(Utc::now());
            if let Err(e) = fs::rename(&canonical, &backup) {
                let _ = fs::remove_file(&temp_path);
                return Err(PromoError::Persistence(format!(
                    "failed to rotate {} to {}: {}",
                    canonical.display(),
                    backup.display(),
                    e
                )));
            }
        }

        fs::rename(&temp_path, &canonical).map_err(|e| {
            PromoError::Persistence(format!(
                "failed to move {} into place: {}",
                temp_path.display(),
                e
            ))
        })
    }

    /// Lists rotated backups, oldest first.
    pub fn backups(&self) -> PromoResult<Vec<PathBuf>> {
        let stem = Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("bandit_state")
            .to_string();
        let prefix = format!("{}_", stem);

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PromoError::Persistence(format!(
                    "failed to list {}: {}",
                    self.dir.display(),
                    e
                )))
            }
        };

        let mut backups: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(&prefix) && n.ends_with(".json"))
                    .unwrap_or(false)
            })
            .collect();
        backups.sort();
        Ok(backups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bandit::arm::Outcome;
    use tempfile::TempDir;

    fn sample_snapshot() -> PosteriorSnapshot {
        let mut a = Arm::default();
        a.update(Outcome::Success);
        let mut b = Arm::default();
        b.update(Outcome::Failure);
        b.update(Outcome::Failure);
        let mut arms = BTreeMap::new();
        arms.insert("headline_A".to_string(), a);
        arms.insert("headline_B".to_string(), b);
        PosteriorSnapshot::new(arms)
    }

    #[test]
    fn test_missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = PosteriorStore::in_dir(dir.path().join("state"));
        assert!(store.load().is_none());
    }

    #[test]
    fn test_save_then_load_is_exact() {
        let dir = TempDir::new().unwrap();
        let store = PosteriorStore::in_dir(dir.path());
        let snapshot = sample_snapshot();
        store.save(&snapshot).unwrap();
        assert_eq!(store.load().unwrap(), snapshot);
    }

    #[test]
    fn test_every_save_rotates_previous_file() {
        let dir = TempDir::new().unwrap();
        let store = PosteriorStore::in_dir(dir.path());
        let snapshot = sample_snapshot();
        store.save(&snapshot).unwrap();
        assert!(store.backups().unwrap().is_empty());
        store.save(&snapshot).unwrap();
        store.save(&snapshot).unwrap();
        assert_eq!(store.backups().unwrap().len(), 2);
        assert!(store.canonical_path().exists());
        assert!(!store.canonical_path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_unparseable_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let store = PosteriorStore::in_dir(dir.path());
        fs::write(store.canonical_path(), "{ not json").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_missing_fields_are_ignored() {
        let dir = TempDir::new().unwrap();
        let store = PosteriorStore::in_dir(dir.path());
        fs::write(
            store.canonical_path(),
            r#"{"timestamp":"2025-01-01T00:00:00Z","arms":{"headline_A":{"alpha":2.0}}}"#,
        )
        .unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_loads_state_with_offsetless_timestamp() {
        let dir = TempDir::new().unwrap();
        let store = PosteriorStore::in_dir(dir.path());
        let legacy = r#"{
    "timestamp": "2025-06-01T12:34:56.789012",
    "arms": {
        "headline_A": {
            "alpha": 41.0,
            "beta": 12.0,
            "total_reward": 40,
            "num_pulls": 51
        }
    }
}"#;
        fs::write(store.canonical_path(), legacy).unwrap();
        let snapshot = store.load().expect("legacy state should load");
        let arm = &snapshot.arms["headline_A"];
        assert_eq!(arm.alpha, 41.0);
        assert_eq!(arm.beta, 12.0);
        assert_eq!(arm.total_reward, 40.0);
        assert_eq!(arm.num_pulls, 51);
        assert_eq!(
            snapshot.timestamp.to_rfc3339(),
            "2025-06-01T12:34:56.789012+00:00"
        );
    }

    #[test]
    fn test_missing_timestamp_still_loads() {
        let dir = TempDir::new().unwrap();
        let store = PosteriorStore::in_dir(dir.path());
        fs::write(
            store.canonical_path(),
            r#"{"arms":{"headline_A":{"alpha":2.0,"beta":1.0,"total_reward":1.0,"num_pulls":1}}}"#,
        )
        .unwrap();
        assert_eq!(store.load().unwrap().arms["headline_A"].alpha, 2.0);
    }

    #[test]
    fn test_unreadable_timestamp_is_ignored() {
        let dir = TempDir::new().unwrap();
        let store = PosteriorStore::in_dir(dir.path());
        fs::write(
            store.canonical_path(),
            r#"{"timestamp":"yesterday","arms":{"headline_A":{"alpha":2.0,"beta":1.0,"total_reward":1.0,"num_pulls":1}}}"#,
        )
        .unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_backup_names_never_collide() {
        let dir = TempDir::new().unwrap();
        let store = PosteriorStore::in_dir(dir.path());
        let at = Utc::now();
        let first = store.backup_path(at);
        fs::write(&first, "{}").unwrap();
        let second = store.backup_path(at);
        assert_ne!(first, second);
        assert!(!second.exists());
        fs::write(&second, "{}").unwrap();
        let third = store.backup_path(at);
        assert!(third != first && third != second);
        assert_eq!(store.backups().unwrap(), vec![first, second]);
    }

    #[test]
    fn test_arms_violating_posterior_bounds_are_ignored() {
        let dir = TempDir::new().unwrap();
        let store = PosteriorStore::in_dir(dir.path());
        let bad_arms = [
            r#"{"alpha":-1.0,"beta":1.0,"total_reward":0.0,"num_pulls":0}"#,
            r#"{"alpha":0.25,"beta":0.5,"total_reward":0.0,"num_pulls":0}"#,
            r#"{"alpha":1.0,"beta":0.5,"total_reward":0.0,"num_pulls":0}"#,
            r#"{"alpha":8.0,"beta":1.0,"total_reward":7.0,"num_pulls":2}"#,
        ];
        for arm in bad_arms {
            fs::write(
                store.canonical_path(),
                format!(
                    r#"{{"timestamp":"2025-01-01T00:00:00Z","arms":{{"headline_A":{}}}}}"#,
                    arm
                ),
            )
            .unwrap();
            assert!(store.load().is_none(), "accepted {}", arm);
        }
    }
}
