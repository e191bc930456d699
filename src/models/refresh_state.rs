// src/models/refresh_state.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::content::Assignment;

/// Processing state of a profile's content refresh. The assignment only
/// exists in `Complete` and the error only in `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshStatus {
    NotStarted,
    Processing,
    Complete { assignment: Assignment },
    Error { message: String },
}

impl RefreshStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshStatus::NotStarted => "not_started",
            RefreshStatus::Processing => "processing",
            RefreshStatus::Complete { .. } => "complete",
            RefreshStatus::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRefreshState {
    #[serde(flatten)]
    pub status: RefreshStatus,
    /// Time of the last transition.
    pub updated_at: DateTime<Utc>,
    /// Which `start_refresh` call this state belongs to; 0 when never started.
    pub generation: u64,
}

impl ProfileRefreshState {
    pub fn not_started() -> Self {
        Self {
            status: RefreshStatus::NotStarted,
            updated_at: Utc::now(),
            generation: 0,
        }
    }

    pub fn processing(generation: u64) -> Self {
        Self {
            status: RefreshStatus::Processing,
            updated_at: Utc::now(),
            generation,
        }
    }

    pub fn complete(generation: u64, assignment: Assignment) -> Self {
        Self {
            status: RefreshStatus::Complete { assignment },
            updated_at: Utc::now(),
            generation,
        }
    }

    pub fn failed(generation: u64, message: impl Into<String>) -> Self {
        Self {
            status: RefreshStatus::Error {
                message: message.into(),
            },
            updated_at: Utc::now(),
            generation,
        }
    }

    pub fn assignment(&self) -> Option<&Assignment> {
        match &self.status {
            RefreshStatus::Complete { assignment } => Some(assignment),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content::ArmContent;

    #[test]
    fn test_status_serializes_with_tag() {
        let mut assignment = Assignment::new();
        assignment.insert(
            "headline_A".to_string(),
            ArmContent {
                message: "hi".to_string(),
                url: "https://example.com".to_string(),
            },
        );
        let state = ProfileRefreshState::complete(3, assignment);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "complete");
        assert_eq!(json["generation"], 3);
        assert_eq!(json["assignment"]["headline_A"]["message"], "hi");

        let err = serde_json::to_value(ProfileRefreshState::failed(1, "boom")).unwrap();
        assert_eq!(err["status"], "error");
        assert_eq!(err["message"], "boom");
    }

    #[test]
    fn test_only_complete_exposes_assignment() {
        assert!(ProfileRefreshState::processing(1).assignment().is_none());
        assert!(ProfileRefreshState::failed(1, "x").assignment().is_none());
        assert!(ProfileRefreshState::complete(1, Assignment::new())
            .assignment()
            .is_some());
        assert_eq!(ProfileRefreshState::not_started().status.as_str(), "not_started");
    }
}
