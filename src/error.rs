//! Application error types.
//!
//! Every lifecycle operation returns one of these to its caller. The HTTP
//! layer maps each variant to a wire code and status; the core only decides
//! which kind of failure happened, and for which entity.

use crate::store::StoreError;
use std::fmt;
use thiserror::Error;

/// Entity kinds that can be missing or duplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Team,
    User,
    PullRequest,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Team => write!(f, "team"),
            Self::User => write!(f, "user"),
            Self::PullRequest => write!(f, "pull request"),
        }
    }
}

/// Application-level errors returned by the lifecycle services.
#[derive(Debug, Error)]
pub enum AppError {
    /// Referenced team, user or pull request does not exist.
    #[error("{resource} not found: {id}")]
    NotFound { resource: Resource, id: String },

    /// Unique-key violation reported by the store.
    #[error("{resource} already exists: {id}")]
    Conflict { resource: Resource, id: String },

    /// Reassignment attempted on a merged pull request.
    #[error("cannot reassign on merged pull request {pull_request_id}")]
    MergedConflict { pull_request_id: String },

    /// Reassignment target is not an assigned reviewer.
    #[error("reviewer {reviewer_id} is not assigned to pull request {pull_request_id}")]
    NotAssignedConflict {
        pull_request_id: String,
        reviewer_id: String,
    },

    /// The store failed for infrastructure reasons.
    #[error("Store unavailable: {message}")]
    StoreUnavailable {
        message: String,
        operation: Option<String>,
    },

    /// Invalid input provided.
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
    },
}

impl AppError {
    /// Create a not found error.
    pub fn not_found(resource: Resource, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(resource: Resource, id: impl Into<String>) -> Self {
        Self::Conflict {
            resource,
            id: id.into(),
        }
    }

    pub fn merged_conflict(pull_request_id: impl Into<String>) -> Self {
        Self::MergedConflict {
            pull_request_id: pull_request_id.into(),
        }
    }

    pub fn not_assigned(pull_request_id: impl Into<String>, reviewer_id: impl Into<String>) -> Self {
        Self::NotAssignedConflict {
            pull_request_id: pull_request_id.into(),
            reviewer_id: reviewer_id.into(),
        }
    }

    /// Create a store error with operation context.
    pub fn store_unavailable_with_op(
        message: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
            operation: Some(operation.into()),
        }
    }

    /// Create an invalid input error with field name.
    pub fn invalid_input_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Wire code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { resource, .. } => match resource {
                Resource::Team => "TEAM_EXISTS",
                Resource::User => "USER_EXISTS",
                Resource::PullRequest => "PR_EXISTS",
            },
            Self::MergedConflict { .. } => "PR_MERGED",
            Self::NotAssignedConflict { .. } => "NOT_ASSIGNED",
            Self::StoreUnavailable { .. } => "INTERNAL_ERROR",
            Self::InvalidInput { .. } => "VALIDATION_ERROR",
        }
    }

    /// Whether the caller, rather than the service, is at fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::StoreUnavailable { .. })
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(resource, id) => Self::not_found(resource, id),
            StoreError::Conflict(resource, id) => Self::conflict(resource, id),
            StoreError::Unavailable {
                operation,
                id,
                message,
            } => Self::store_unavailable_with_op(format!("{} ({})", message, id), operation),
        }
    }
}
