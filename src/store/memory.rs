//! In-memory store.
//!
//! A scope takes the table lock for its whole lifetime and works on a staged
//! copy of the tables; commit writes the copy back, drop discards it. Scopes
//! are therefore serialized, like `BEGIN IMMEDIATE` on SQLite.

use super::{
    PullRequestRepository, StoreError, TeamRepository, TransactionManager, UserRepository,
};
use crate::error::Resource;
use crate::models::{NewPullRequest, NewUser, PullRequest, PullRequestStatus, Team, User};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct Tables {
    next_id: i64,
    teams: Vec<(i64, String)>,
    users: Vec<User>,
    pull_requests: Vec<PullRequest>,
    /// (assignment id, pull request id, user id)
    reviewers: Vec<(i64, String, String)>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_by_user_id(&self, user_id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.user_id == user_id)
    }

    fn team(&self, id: i64, name: &str) -> Team {
        Team {
            id,
            name: name.to_string(),
            members: self
                .users
                .iter()
                .filter(|u| u.team_name.as_deref() == Some(name))
                .cloned()
                .collect(),
        }
    }

    fn reviewers_of(&self, pull_request_id: &str) -> Vec<String> {
        self.reviewers
            .iter()
            .filter(|(_, pr, _)| pr == pull_request_id)
            .map(|(_, _, user)| user.clone())
            .collect()
    }

    /// Pull request with reviewers sorted by user ID.
    fn pull_request(&self, pull_request_id: &str) -> Option<PullRequest> {
        let mut pr = self
            .pull_requests
            .iter()
            .find(|p| p.pull_request_id == pull_request_id)?
            .clone();
        let mut reviewers = self.reviewers_of(pull_request_id);
        reviewers.sort();
        pr.assigned_reviewers = reviewers;
        Some(pr)
    }
}

/// Unit of work on the in-memory store.
pub struct MemoryScope {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

/// Store implementation backed by process memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    failing: Arc<std::sync::Mutex<Option<&'static str>>>,
    stalled: Arc<std::sync::Mutex<Option<&'static str>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call to `operation` fail with `Unavailable`.
    ///
    /// Used to exercise rollback paths.
    pub fn fail_operation(&self, operation: &'static str) {
        if let Ok(mut failing) = self.failing.lock() {
            *failing = Some(operation);
        }
    }

    /// Make every later call to `operation` wait forever.
    ///
    /// Lets tests cancel an operation part-way through its scope.
    pub fn stall_operation(&self, operation: &'static str) {
        if let Ok(mut stalled) = self.stalled.lock() {
            *stalled = Some(operation);
        }
    }

    fn is_stalled(&self, operation: &'static str) -> bool {
        self.stalled.lock().map(|s| *s == Some(operation)).unwrap_or(false)
    }

    fn check(&self, operation: &'static str, id: &str) -> Result<(), StoreError> {
        let failing = self.failing.lock().map(|f| *f == Some(operation)).unwrap_or(false);
        if failing {
            return Err(StoreError::unavailable(operation, id, "injected failure"));
        }
        Ok(())
    }

    /// Run `f` against the scope's staged tables, or the committed tables.
    async fn with_tables<T, F>(
        &self,
        scope: Option<&mut MemoryScope>,
        operation: &'static str,
        id: &str,
        f: F,
    ) -> Result<T, StoreError>
    where
        T: Send,
        F: FnOnce(&mut Tables) -> Result<T, StoreError> + Send,
    {
        self.check(operation, id)?;
        if self.is_stalled(operation) {
            std::future::pending::<()>().await;
        }
        match scope {
            Some(scope) => f(&mut scope.staged),
            None => {
                let mut tables = self.tables.lock().await;
                f(&mut tables)
            }
        }
    }
}

#[async_trait]
impl TransactionManager for MemoryStore {
    type Scope = MemoryScope;

    async fn begin(&self) -> Result<MemoryScope, StoreError> {
        self.check("begin", "-")?;
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryScope { guard, staged })
    }

    async fn commit(&self, scope: MemoryScope) -> Result<(), StoreError> {
        self.check("commit", "-")?;
        let MemoryScope { mut guard, staged } = scope;
        *guard = staged;
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn get_user(&self, scope: Option<&mut MemoryScope>, id: i64) -> Result<User, StoreError> {
        let key = id.to_string();
        self.with_tables(scope, "get_user", &key, |t| {
            t.users
                .iter()
                .find(|u| u.id == id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(Resource::User, key.clone()))
        })
        .await
    }

    async fn get_user_by_user_id(
        &self,
        scope: Option<&mut MemoryScope>,
        user_id: &str,
    ) -> Result<User, StoreError> {
        self.with_tables(scope, "get_user_by_user_id", user_id, |t| {
            t.user_by_user_id(user_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(Resource::User, user_id.to_string()))
        })
        .await
    }

    async fn upsert_user(
        &self,
        scope: Option<&mut MemoryScope>,
        user: &NewUser,
    ) -> Result<i64, StoreError> {
        self.with_tables(scope, "upsert_user", &user.user_id, |t| {
            if let Some(existing) = t.users.iter_mut().find(|u| u.user_id == user.user_id) {
                existing.username = user.username.clone();
                existing.team_name = Some(user.team_name.clone());
                existing.is_active = user.is_active;
                return Ok(existing.id);
            }
            let id = t.allocate_id();
            t.users.push(User {
                id,
                user_id: user.user_id.clone(),
                username: user.username.clone(),
                team_name: Some(user.team_name.clone()),
                is_active: user.is_active,
            });
            Ok(id)
        })
        .await
    }

    async fn set_user_active(
        &self,
        scope: Option<&mut MemoryScope>,
        user_id: &str,
        is_active: bool,
    ) -> Result<i64, StoreError> {
        self.with_tables(scope, "set_user_active", user_id, |t| {
            let user = t
                .users
                .iter_mut()
                .find(|u| u.user_id == user_id)
                .ok_or_else(|| StoreError::NotFound(Resource::User, user_id.to_string()))?;
            user.is_active = is_active;
            Ok(user.id)
        })
        .await
    }
}

#[async_trait]
impl TeamRepository for MemoryStore {
    async fn insert_team(&self, scope: Option<&mut MemoryScope>, name: &str) -> Result<i64, StoreError> {
        self.with_tables(scope, "insert_team", name, |t| {
            if t.teams.iter().any(|(_, n)| n == name) {
                return Err(StoreError::Conflict(Resource::Team, name.to_string()));
            }
            let id = t.allocate_id();
            t.teams.push((id, name.to_string()));
            Ok(id)
        })
        .await
    }

    async fn get_team(&self, scope: Option<&mut MemoryScope>, id: i64) -> Result<Team, StoreError> {
        let key = id.to_string();
        self.with_tables(scope, "get_team", &key, |t| {
            let (_, name) = t
                .teams
                .iter()
                .find(|(team_id, _)| *team_id == id)
                .ok_or_else(|| StoreError::NotFound(Resource::Team, key.clone()))?;
            Ok(t.team(id, name))
        })
        .await
    }

    async fn get_team_by_name(
        &self,
        scope: Option<&mut MemoryScope>,
        name: &str,
    ) -> Result<Team, StoreError> {
        self.with_tables(scope, "get_team_by_name", name, |t| {
            let (id, _) = t
                .teams
                .iter()
                .find(|(_, n)| n == name)
                .ok_or_else(|| StoreError::NotFound(Resource::Team, name.to_string()))?;
            Ok(t.team(*id, name))
        })
        .await
    }

    async fn list_eligible_reviewers(
        &self,
        scope: Option<&mut MemoryScope>,
        team_name: &str,
        exclude: &[String],
    ) -> Result<Vec<String>, StoreError> {
        self.with_tables(scope, "list_eligible_reviewers", team_name, |t| {
            let mut eligible: Vec<String> = t
                .users
                .iter()
                .filter(|u| u.is_active && u.team_name.as_deref() == Some(team_name))
                .filter(|u| !exclude.contains(&u.user_id))
                .map(|u| u.user_id.clone())
                .collect();
            eligible.sort();
            Ok(eligible)
        })
        .await
    }
}

#[async_trait]
impl PullRequestRepository for MemoryStore {
    async fn insert_pull_request(
        &self,
        scope: Option<&mut MemoryScope>,
        pull_request: &NewPullRequest,
    ) -> Result<i64, StoreError> {
        let pr_id = pull_request.pull_request_id.as_str();
        self.with_tables(scope, "insert_pull_request", pr_id, |t| {
            if t.pull_requests.iter().any(|p| p.pull_request_id == pr_id) {
                return Err(StoreError::Conflict(Resource::PullRequest, pr_id.to_string()));
            }
            if t.user_by_user_id(&pull_request.author_id).is_none() {
                return Err(StoreError::unavailable(
                    "insert_pull_request",
                    pr_id,
                    format!("unknown author {}", pull_request.author_id),
                ));
            }
            let id = t.allocate_id();
            t.pull_requests.push(PullRequest {
                id,
                pull_request_id: pr_id.to_string(),
                name: pull_request.name.clone(),
                author_id: pull_request.author_id.clone(),
                status: PullRequestStatus::Open,
                assigned_reviewers: Vec::new(),
                created_at: Utc::now(),
                merged_at: None,
            });
            Ok(id)
        })
        .await
    }

    async fn get_pull_request(
        &self,
        scope: Option<&mut MemoryScope>,
        pull_request_id: &str,
    ) -> Result<PullRequest, StoreError> {
        self.with_tables(scope, "get_pull_request", pull_request_id, |t| {
            t.pull_request(pull_request_id)
                .ok_or_else(|| StoreError::NotFound(Resource::PullRequest, pull_request_id.to_string()))
        })
        .await
    }

    async fn merge_pull_request(
        &self,
        scope: Option<&mut MemoryScope>,
        pull_request_id: &str,
    ) -> Result<Option<PullRequest>, StoreError> {
        self.with_tables(scope, "merge_pull_request", pull_request_id, |t| {
            let Some(pr) = t
                .pull_requests
                .iter_mut()
                .find(|p| p.pull_request_id == pull_request_id && !p.is_merged())
            else {
                return Ok(None);
            };
            pr.status = PullRequestStatus::Merged;
            pr.merged_at = Some(Utc::now());
            Ok(t.pull_request(pull_request_id))
        })
        .await
    }

    async fn list_pull_requests_by_reviewer(
        &self,
        scope: Option<&mut MemoryScope>,
        user_id: &str,
    ) -> Result<Vec<PullRequest>, StoreError> {
        self.with_tables(scope, "list_pull_requests_by_reviewer", user_id, |t| {
            let mut prs: Vec<PullRequest> = t
                .reviewers
                .iter()
                .filter(|(_, _, reviewer)| reviewer == user_id)
                .filter_map(|(_, pr_id, _)| t.pull_request(pr_id))
                .collect();
            prs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(prs)
        })
        .await
    }

    async fn assign_reviewer(
        &self,
        scope: Option<&mut MemoryScope>,
        pull_request_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        self.with_tables(scope, "assign_reviewer", pull_request_id, |t| {
            if t.reviewers
                .iter()
                .any(|(_, pr, user)| pr == pull_request_id && user == user_id)
            {
                return Ok(());
            }
            if t.pull_request(pull_request_id).is_none() || t.user_by_user_id(user_id).is_none() {
                return Err(StoreError::unavailable(
                    "assign_reviewer",
                    pull_request_id,
                    format!("dangling assignment to {}", user_id),
                ));
            }
            let id = t.allocate_id();
            t.reviewers
                .push((id, pull_request_id.to_string(), user_id.to_string()));
            Ok(())
        })
        .await
    }

    async fn remove_reviewer(
        &self,
        scope: Option<&mut MemoryScope>,
        pull_request_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        self.with_tables(scope, "remove_reviewer", pull_request_id, |t| {
            t.reviewers
                .retain(|(_, pr, user)| !(pr == pull_request_id && user == user_id));
            Ok(())
        })
        .await
    }

    async fn list_reviewers(
        &self,
        scope: Option<&mut MemoryScope>,
        pull_request_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        self.with_tables(scope, "list_reviewers", pull_request_id, |t| {
            Ok(t.reviewers_of(pull_request_id))
        })
        .await
    }
}
