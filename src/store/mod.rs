//! Record store abstraction.
//!
//! Persistence is split into one trait per entity over a shared
//! [`TransactionManager`]. Every repository method takes an optional scope:
//! `Some(scope)` reads and writes inside that unit of work, `None` runs
//! against the latest committed state. Dropping a scope without calling
//! [`TransactionManager::commit`] discards everything written through it.
//!
//! Two implementations exist: [`SqliteStore`] for production and
//! [`MemoryStore`] for tests and ephemeral deployments.

pub mod memory;
pub mod sqlite;

use crate::error::Resource;
use crate::models::{NewPullRequest, NewUser, PullRequest, Team, User};
use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors reported by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found: {1}")]
    NotFound(Resource, String),

    /// Unique-key violation.
    #[error("{0} already exists: {1}")]
    Conflict(Resource, String),

    /// Infrastructure failure, tagged with the operation and entity id.
    #[error("{operation} failed for {id}: {message}")]
    Unavailable {
        operation: &'static str,
        id: String,
        message: String,
    },
}

impl StoreError {
    pub fn unavailable(
        operation: &'static str,
        id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Unavailable {
            operation,
            id: id.into(),
            message: message.into(),
        }
    }
}

/// Opens and commits units of work.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Handle for one unit of work. Dropping it rolls back.
    type Scope: Send;

    async fn begin(&self) -> Result<Self::Scope, StoreError>;

    async fn commit(&self, scope: Self::Scope) -> Result<(), StoreError>;
}

#[async_trait]
pub trait UserRepository: TransactionManager {
    /// Fetch a user by store-assigned internal ID.
    async fn get_user(&self, scope: Option<&mut Self::Scope>, id: i64) -> Result<User, StoreError>;

    /// Fetch a user by external user ID.
    async fn get_user_by_user_id(
        &self,
        scope: Option<&mut Self::Scope>,
        user_id: &str,
    ) -> Result<User, StoreError>;

    /// Insert a user, or update name, team and active flag when the external
    /// ID already exists. Returns the internal ID.
    async fn upsert_user(
        &self,
        scope: Option<&mut Self::Scope>,
        user: &NewUser,
    ) -> Result<i64, StoreError>;

    /// Set the active flag by external ID. Returns the internal ID, or
    /// `NotFound` when no user matches.
    async fn set_user_active(
        &self,
        scope: Option<&mut Self::Scope>,
        user_id: &str,
        is_active: bool,
    ) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait TeamRepository: TransactionManager {
    /// Insert a team. Returns the internal ID, or `Conflict` on duplicate name.
    async fn insert_team(&self, scope: Option<&mut Self::Scope>, name: &str)
        -> Result<i64, StoreError>;

    /// Fetch a team with its members ordered by internal ID.
    async fn get_team(&self, scope: Option<&mut Self::Scope>, id: i64) -> Result<Team, StoreError>;

    async fn get_team_by_name(
        &self,
        scope: Option<&mut Self::Scope>,
        name: &str,
    ) -> Result<Team, StoreError>;

    /// Active members of `team_name` whose IDs are not in `exclude`,
    /// ascending by user ID.
    async fn list_eligible_reviewers(
        &self,
        scope: Option<&mut Self::Scope>,
        team_name: &str,
        exclude: &[String],
    ) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
pub trait PullRequestRepository: TransactionManager {
    /// Insert an OPEN pull request created now. Returns the internal ID, or
    /// `Conflict` on duplicate external ID.
    async fn insert_pull_request(
        &self,
        scope: Option<&mut Self::Scope>,
        pull_request: &NewPullRequest,
    ) -> Result<i64, StoreError>;

    /// Fetch a pull request with its reviewers sorted by user ID.
    async fn get_pull_request(
        &self,
        scope: Option<&mut Self::Scope>,
        pull_request_id: &str,
    ) -> Result<PullRequest, StoreError>;

    /// Transition to MERGED with the current time, only if not already
    /// merged. Returns `None` when no row was changed.
    async fn merge_pull_request(
        &self,
        scope: Option<&mut Self::Scope>,
        pull_request_id: &str,
    ) -> Result<Option<PullRequest>, StoreError>;

    /// Pull requests where `user_id` is an assigned reviewer, newest first.
    async fn list_pull_requests_by_reviewer(
        &self,
        scope: Option<&mut Self::Scope>,
        user_id: &str,
    ) -> Result<Vec<PullRequest>, StoreError>;

    /// Add a reviewer assignment. Existing pairs are left untouched.
    async fn assign_reviewer(
        &self,
        scope: Option<&mut Self::Scope>,
        pull_request_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError>;

    async fn remove_reviewer(
        &self,
        scope: Option<&mut Self::Scope>,
        pull_request_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError>;

    /// Reviewer IDs in assignment order.
    async fn list_reviewers(
        &self,
        scope: Option<&mut Self::Scope>,
        pull_request_id: &str,
    ) -> Result<Vec<String>, StoreError>;
}

/// Everything the lifecycle services need from a backend.
pub trait Store:
    TransactionManager + UserRepository + TeamRepository + PullRequestRepository
{
}

impl<T> Store for T where
    T: TransactionManager + UserRepository + TeamRepository + PullRequestRepository
{
}
