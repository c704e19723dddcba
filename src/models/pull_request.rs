//! Pull request model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PullRequestStatus {
    Open,
    Merged,
}

impl From<&str> for PullRequestStatus {
    fn from(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "MERGED" => Self::Merged,
            _ => Self::Open,
        }
    }
}

impl std::fmt::Display for PullRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Merged => write!(f, "MERGED"),
        }
    }
}

/// A pull request together with its assigned reviewers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// Store-assigned internal ID.
    pub id: i64,

    /// External pull request ID (unique).
    pub pull_request_id: String,

    /// Display name.
    pub name: String,

    /// External user ID of the author.
    pub author_id: String,

    pub status: PullRequestStatus,

    /// Assigned reviewer user IDs, sorted ascending.
    pub assigned_reviewers: Vec<String>,

    pub created_at: DateTime<Utc>,

    /// Set once, when the pull request is merged.
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequest {
    /// Check if the pull request is merged.
    pub fn is_merged(&self) -> bool {
        self.status == PullRequestStatus::Merged
    }

    /// Check if `user_id` is currently an assigned reviewer.
    pub fn has_reviewer(&self, user_id: &str) -> bool {
        self.assigned_reviewers.iter().any(|r| r == user_id)
    }
}

/// Input for creating a pull request.
#[derive(Debug, Clone)]
pub struct NewPullRequest {
    pub pull_request_id: String,
    pub name: String,
    pub author_id: String,
}

/// Outcome of a reviewer reassignment.
#[derive(Debug, Clone)]
pub struct Reassignment {
    pub pull_request: PullRequest,

    /// The replacement reviewer, or `None` when no eligible teammate was left.
    pub replaced_by: Option<String>,
}
