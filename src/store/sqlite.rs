//! SQLite-backed store.
//!
//! Scopes are sqlx transactions opened with `BEGIN IMMEDIATE`, so a scope
//! takes the database write lock up front and concurrent writing scopes run
//! one after another. Timestamps are stored as Unix milliseconds.

use super::{
    PullRequestRepository, StoreError, TeamRepository, TransactionManager, UserRepository,
};
use crate::db::pool::DbPool;
use crate::error::Resource;
use crate::models::{NewPullRequest, NewUser, PullRequest, PullRequestStatus, Team, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, Transaction};
use std::collections::HashMap;

/// Unit of work on the SQLite store.
pub type SqliteScope = Transaction<'static, Sqlite>;

const USER_COLUMNS: &str = "id, user_id, username, team_name, is_active";
const PULL_REQUEST_COLUMNS: &str =
    "id, pull_request_id, pull_request_name, author_id, status, created_at, merged_at";

/// Store implementation over a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Connection for one call: the scope's own, or a pooled one.
    async fn handle<'a>(
        &self,
        scope: Option<&'a mut SqliteScope>,
        operation: &'static str,
        id: &str,
    ) -> Result<Handle<'a>, StoreError> {
        match scope {
            Some(tx) => Ok(Handle::Scoped(&mut **tx)),
            None => self
                .pool
                .acquire()
                .await
                .map(Handle::Pooled)
                .map_err(|e| StoreError::unavailable(operation, id, e.to_string())),
        }
    }
}

enum Handle<'a> {
    Scoped(&'a mut SqliteConnection),
    Pooled(PoolConnection<Sqlite>),
}

impl Handle<'_> {
    fn conn(&mut self) -> &mut SqliteConnection {
        match self {
            Self::Scoped(conn) => &mut **conn,
            Self::Pooled(conn) => &mut **conn,
        }
    }
}

/// Map a sqlx error onto the store taxonomy.
fn store_error(err: sqlx::Error, operation: &'static str, resource: Resource, id: &str) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound(resource, id.to_string()),
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            StoreError::Conflict(resource, id.to_string())
        }
        other => StoreError::unavailable(operation, id, other.to_string()),
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[derive(Debug, FromRow)]
struct PullRequestRow {
    id: i64,
    pull_request_id: String,
    pull_request_name: String,
    author_id: String,
    status: String,
    created_at: i64,
    merged_at: Option<i64>,
}

impl PullRequestRow {
    fn into_model(self, assigned_reviewers: Vec<String>) -> PullRequest {
        PullRequest {
            id: self.id,
            pull_request_id: self.pull_request_id,
            name: self.pull_request_name,
            author_id: self.author_id,
            status: PullRequestStatus::from(self.status.as_str()),
            assigned_reviewers,
            created_at: from_millis(self.created_at),
            merged_at: self.merged_at.map(from_millis),
        }
    }
}

async fn reviewers_sorted(
    conn: &mut SqliteConnection,
    pull_request_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT user_id FROM pr_reviewers WHERE pull_request_id = ? ORDER BY user_id")
        .bind(pull_request_id)
        .fetch_all(conn)
        .await
}

async fn team_members(conn: &mut SqliteConnection, team_name: &str) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {} FROM users WHERE team_name = ? ORDER BY id",
        USER_COLUMNS
    ))
    .bind(team_name)
    .fetch_all(conn)
    .await
}

#[async_trait]
impl TransactionManager for SqliteStore {
    type Scope = SqliteScope;

    async fn begin(&self) -> Result<SqliteScope, StoreError> {
        self.pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| StoreError::unavailable("begin", "-", e.to_string()))
    }

    async fn commit(&self, scope: SqliteScope) -> Result<(), StoreError> {
        scope
            .commit()
            .await
            .map_err(|e| StoreError::unavailable("commit", "-", e.to_string()))
    }
}

#[async_trait]
impl UserRepository for SqliteStore {
    async fn get_user(&self, scope: Option<&mut SqliteScope>, id: i64) -> Result<User, StoreError> {
        let key = id.to_string();
        let mut h = self.handle(scope, "get_user", &key).await?;

        sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_one(h.conn())
            .await
            .map_err(|e| store_error(e, "get_user", Resource::User, &key))
    }

    async fn get_user_by_user_id(
        &self,
        scope: Option<&mut SqliteScope>,
        user_id: &str,
    ) -> Result<User, StoreError> {
        let mut h = self.handle(scope, "get_user_by_user_id", user_id).await?;

        sqlx::query_as(&format!("SELECT {} FROM users WHERE user_id = ?", USER_COLUMNS))
            .bind(user_id)
            .fetch_one(h.conn())
            .await
            .map_err(|e| store_error(e, "get_user_by_user_id", Resource::User, user_id))
    }

    async fn upsert_user(
        &self,
        scope: Option<&mut SqliteScope>,
        user: &NewUser,
    ) -> Result<i64, StoreError> {
        let mut h = self.handle(scope, "upsert_user", &user.user_id).await?;

        sqlx::query_scalar(
            r#"
            INSERT INTO users (user_id, username, team_name, is_active)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                username = excluded.username,
                team_name = excluded.team_name,
                is_active = excluded.is_active
            RETURNING id
            "#,
        )
        .bind(&user.user_id)
        .bind(&user.username)
        .bind(&user.team_name)
        .bind(user.is_active)
        .fetch_one(h.conn())
        .await
        .map_err(|e| store_error(e, "upsert_user", Resource::User, &user.user_id))
    }

    async fn set_user_active(
        &self,
        scope: Option<&mut SqliteScope>,
        user_id: &str,
        is_active: bool,
    ) -> Result<i64, StoreError> {
        let mut h = self.handle(scope, "set_user_active", user_id).await?;

        sqlx::query_scalar("UPDATE users SET is_active = ? WHERE user_id = ? RETURNING id")
            .bind(is_active)
            .bind(user_id)
            .fetch_one(h.conn())
            .await
            .map_err(|e| store_error(e, "set_user_active", Resource::User, user_id))
    }
}

#[async_trait]
impl TeamRepository for SqliteStore {
    async fn insert_team(&self, scope: Option<&mut SqliteScope>, name: &str) -> Result<i64, StoreError> {
        let mut h = self.handle(scope, "insert_team", name).await?;

        sqlx::query_scalar("INSERT INTO team (name) VALUES (?) RETURNING id")
            .bind(name)
            .fetch_one(h.conn())
            .await
            .map_err(|e| store_error(e, "insert_team", Resource::Team, name))
    }

    async fn get_team(&self, scope: Option<&mut SqliteScope>, id: i64) -> Result<Team, StoreError> {
        let key = id.to_string();
        let mut h = self.handle(scope, "get_team", &key).await?;

        let (id, name): (i64, String) = sqlx::query_as("SELECT id, name FROM team WHERE id = ?")
            .bind(id)
            .fetch_one(h.conn())
            .await
            .map_err(|e| store_error(e, "get_team", Resource::Team, &key))?;

        let members = team_members(h.conn(), &name)
            .await
            .map_err(|e| store_error(e, "get_team", Resource::Team, &key))?;

        Ok(Team { id, name, members })
    }

    async fn get_team_by_name(
        &self,
        scope: Option<&mut SqliteScope>,
        name: &str,
    ) -> Result<Team, StoreError> {
        let mut h = self.handle(scope, "get_team_by_name", name).await?;

        let id: i64 = sqlx::query_scalar("SELECT id FROM team WHERE name = ?")
            .bind(name)
            .fetch_one(h.conn())
            .await
            .map_err(|e| store_error(e, "get_team_by_name", Resource::Team, name))?;

        let members = team_members(h.conn(), name)
            .await
            .map_err(|e| store_error(e, "get_team_by_name", Resource::Team, name))?;

        Ok(Team {
            id,
            name: name.to_string(),
            members,
        })
    }

    async fn list_eligible_reviewers(
        &self,
        scope: Option<&mut SqliteScope>,
        team_name: &str,
        exclude: &[String],
    ) -> Result<Vec<String>, StoreError> {
        let mut h = self.handle(scope, "list_eligible_reviewers", team_name).await?;

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT user_id FROM users WHERE is_active = 1 AND team_name = ");
        query.push_bind(team_name.to_string());

        if !exclude.is_empty() {
            query.push(" AND user_id NOT IN (");
            let mut ids = query.separated(", ");
            for user_id in exclude {
                ids.push_bind(user_id.clone());
            }
            ids.push_unseparated(")");
        }

        query.push(" ORDER BY user_id");

        query
            .build_query_scalar::<String>()
            .fetch_all(h.conn())
            .await
            .map_err(|e| store_error(e, "list_eligible_reviewers", Resource::Team, team_name))
    }
}

#[async_trait]
impl PullRequestRepository for SqliteStore {
    async fn insert_pull_request(
        &self,
        scope: Option<&mut SqliteScope>,
        pull_request: &NewPullRequest,
    ) -> Result<i64, StoreError> {
        let id = pull_request.pull_request_id.as_str();
        let mut h = self.handle(scope, "insert_pull_request", id).await?;

        sqlx::query_scalar(
            r#"
            INSERT INTO pull_requests (pull_request_id, pull_request_name, author_id, status, created_at)
            VALUES (?, ?, ?, 'OPEN', ?)
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(&pull_request.name)
        .bind(&pull_request.author_id)
        .bind(now_millis())
        .fetch_one(h.conn())
        .await
        .map_err(|e| store_error(e, "insert_pull_request", Resource::PullRequest, id))
    }

    async fn get_pull_request(
        &self,
        scope: Option<&mut SqliteScope>,
        pull_request_id: &str,
    ) -> Result<PullRequest, StoreError> {
        let op = "get_pull_request";
        let mut h = self.handle(scope, op, pull_request_id).await?;

        let row: PullRequestRow = sqlx::query_as(&format!(
            "SELECT {} FROM pull_requests WHERE pull_request_id = ?",
            PULL_REQUEST_COLUMNS
        ))
        .bind(pull_request_id)
        .fetch_one(h.conn())
        .await
        .map_err(|e| store_error(e, op, Resource::PullRequest, pull_request_id))?;

        let reviewers = reviewers_sorted(h.conn(), pull_request_id)
            .await
            .map_err(|e| store_error(e, op, Resource::PullRequest, pull_request_id))?;

        Ok(row.into_model(reviewers))
    }

    async fn merge_pull_request(
        &self,
        scope: Option<&mut SqliteScope>,
        pull_request_id: &str,
    ) -> Result<Option<PullRequest>, StoreError> {
        let op = "merge_pull_request";
        let mut h = self.handle(scope, op, pull_request_id).await?;

        let row: Option<PullRequestRow> = sqlx::query_as(&format!(
            r#"
            UPDATE pull_requests
            SET status = 'MERGED', merged_at = ?
            WHERE pull_request_id = ? AND status != 'MERGED'
            RETURNING {}
            "#,
            PULL_REQUEST_COLUMNS
        ))
        .bind(now_millis())
        .bind(pull_request_id)
        .fetch_optional(h.conn())
        .await
        .map_err(|e| store_error(e, op, Resource::PullRequest, pull_request_id))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let reviewers = reviewers_sorted(h.conn(), pull_request_id)
            .await
            .map_err(|e| store_error(e, op, Resource::PullRequest, pull_request_id))?;

        Ok(Some(row.into_model(reviewers)))
    }

    async fn list_pull_requests_by_reviewer(
        &self,
        scope: Option<&mut SqliteScope>,
        user_id: &str,
    ) -> Result<Vec<PullRequest>, StoreError> {
        let op = "list_pull_requests_by_reviewer";
        let mut h = self.handle(scope, op, user_id).await?;

        let rows: Vec<PullRequestRow> = sqlx::query_as(
            r#"
            SELECT pr.id, pr.pull_request_id, pr.pull_request_name, pr.author_id,
                   pr.status, pr.created_at, pr.merged_at
            FROM pull_requests pr
            INNER JOIN pr_reviewers prr ON pr.pull_request_id = prr.pull_request_id
            WHERE prr.user_id = ?
            ORDER BY pr.created_at DESC, pr.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(h.conn())
        .await
        .map_err(|e| store_error(e, op, Resource::User, user_id))?;

        // Reviewer sets of every matched pull request in one pass.
        let assignments: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT pull_request_id, user_id
            FROM pr_reviewers
            WHERE pull_request_id IN (
                SELECT pull_request_id FROM pr_reviewers WHERE user_id = ?
            )
            ORDER BY user_id
            "#,
        )
        .bind(user_id)
        .fetch_all(h.conn())
        .await
        .map_err(|e| store_error(e, op, Resource::User, user_id))?;

        let mut reviewers: HashMap<String, Vec<String>> = HashMap::new();
        for (pull_request_id, reviewer) in assignments {
            reviewers.entry(pull_request_id).or_default().push(reviewer);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let assigned = reviewers.remove(&row.pull_request_id).unwrap_or_default();
                row.into_model(assigned)
            })
            .collect())
    }

    async fn assign_reviewer(
        &self,
        scope: Option<&mut SqliteScope>,
        pull_request_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        let mut h = self.handle(scope, "assign_reviewer", pull_request_id).await?;

        sqlx::query(
            r#"
            INSERT INTO pr_reviewers (pull_request_id, user_id)
            VALUES (?, ?)
            ON CONFLICT(pull_request_id, user_id) DO NOTHING
            "#,
        )
        .bind(pull_request_id)
        .bind(user_id)
        .execute(h.conn())
        .await
        .map_err(|e| store_error(e, "assign_reviewer", Resource::PullRequest, pull_request_id))?;

        Ok(())
    }

    async fn remove_reviewer(
        &self,
        scope: Option<&mut SqliteScope>,
        pull_request_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        let mut h = self.handle(scope, "remove_reviewer", pull_request_id).await?;

        sqlx::query("DELETE FROM pr_reviewers WHERE pull_request_id = ? AND user_id = ?")
            .bind(pull_request_id)
            .bind(user_id)
            .execute(h.conn())
            .await
            .map_err(|e| store_error(e, "remove_reviewer", Resource::PullRequest, pull_request_id))?;

        Ok(())
    }

    async fn list_reviewers(
        &self,
        scope: Option<&mut SqliteScope>,
        pull_request_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        let mut h = self.handle(scope, "list_reviewers", pull_request_id).await?;

        sqlx::query_scalar("SELECT user_id FROM pr_reviewers WHERE pull_request_id = ? ORDER BY id")
            .bind(pull_request_id)
            .fetch_all(h.conn())
            .await
            .map_err(|e| store_error(e, "list_reviewers", Resource::PullRequest, pull_request_id))
    }
}
