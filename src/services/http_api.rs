//! REST API routes.
//!
//! Thin handlers over the lifecycle services: decode and validate the
//! request, call the service, shape the result as JSON.

use crate::error::{AppError, Resource};
use crate::models::{NewMember, NewPullRequest, NewTeam, PullRequest, PullRequestStatus, Team, User};
use crate::services::{pull_request, team, user};
use crate::store::Store;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared state for the API routes.
pub struct ApiState<S> {
    pub store: Arc<S>,
}

impl<S> ApiState<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

// Manual impl: `S` itself does not need to be `Clone`.
impl<S> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

// ── Error handling ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ApiError {
    code: String,
    message: String,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ApiError,
}

/// Error returned by a handler.
#[derive(Debug)]
pub enum ApiErr {
    App(AppError),
    /// Body or query string could not be decoded.
    BadRequest(String),
}

/// HTTP status for an application error.
pub fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::NotFound { .. } => StatusCode::NOT_FOUND,
        AppError::Conflict {
            resource: Resource::PullRequest,
            ..
        } => StatusCode::CONFLICT,
        AppError::Conflict { .. } => StatusCode::BAD_REQUEST,
        AppError::MergedConflict { .. } | AppError::NotAssignedConflict { .. } => {
            StatusCode::CONFLICT
        }
        AppError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        AppError::StoreUnavailable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::BadRequest(message) => {
                log::warn!("[http] Invalid request: {}", message);
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
            }
            Self::App(err) if err.is_client_error() => {
                log::warn!("[http] {}", err);
                (status_for(&err), err.code(), err.to_string())
            }
            Self::App(err) => {
                log::error!("[http] {:?}", err);
                (
                    status_for(&err),
                    err.code(),
                    "internal server error".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorEnvelope {
                error: ApiError {
                    code: code.to_string(),
                    message,
                },
            }),
        )
            .into_response()
    }
}

impl From<AppError> for ApiErr {
    fn from(err: AppError) -> Self {
        Self::App(err)
    }
}

impl From<JsonRejection> for ApiErr {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiErr {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Reject blank required fields.
fn require(field: &str, value: &str) -> Result<(), ApiErr> {
    if value.trim().is_empty() {
        return Err(AppError::invalid_input_field(
            format!("field {} is a required field", field),
            field,
        )
        .into());
    }
    Ok(())
}

// ── Request types ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MemberRequest {
    user_id: String,
    username: String,
    is_active: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TeamRequest {
    team_name: String,
    members: Vec<MemberRequest>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AddTeamRequest {
    team: TeamRequest,
}

#[derive(Debug, Deserialize)]
struct TeamQuery {
    team_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SetIsActiveRequest {
    user_id: String,
    is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreatePullRequestRequest {
    pull_request_id: String,
    pull_request_name: String,
    author_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MergeRequest {
    pull_request_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReassignRequest {
    pull_request_id: String,
    old_reviewer_id: String,
}

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct MemberResponse {
    user_id: String,
    username: String,
    is_active: bool,
}

#[derive(Serialize)]
struct TeamResponse {
    team_name: String,
    members: Vec<MemberResponse>,
}

impl From<Team> for TeamResponse {
    fn from(team: Team) -> Self {
        Self {
            team_name: team.name,
            members: team
                .members
                .into_iter()
                .map(|m| MemberResponse {
                    user_id: m.user_id,
                    username: m.username,
                    is_active: m.is_active,
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct TeamEnvelope {
    team: TeamResponse,
}

#[derive(Serialize)]
struct UserResponse {
    user_id: String,
    username: String,
    team_name: String,
    is_active: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username,
            team_name: user.team_name.unwrap_or_default(),
            is_active: user.is_active,
        }
    }
}

#[derive(Serialize)]
struct UserEnvelope {
    user: UserResponse,
}

#[derive(Serialize)]
struct PullRequestResponse {
    pull_request_id: String,
    pull_request_name: String,
    author_id: String,
    status: PullRequestStatus,
    assigned_reviewers: Vec<String>,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
    #[serde(rename = "mergedAt", skip_serializing_if = "Option::is_none")]
    merged_at: Option<DateTime<Utc>>,
}

impl From<PullRequest> for PullRequestResponse {
    fn from(pr: PullRequest) -> Self {
        Self {
            pull_request_id: pr.pull_request_id,
            pull_request_name: pr.name,
            author_id: pr.author_id,
            status: pr.status,
            assigned_reviewers: pr.assigned_reviewers,
            created_at: pr.created_at,
            merged_at: pr.merged_at,
        }
    }
}

#[derive(Serialize)]
struct PullRequestEnvelope {
    pr: PullRequestResponse,
}

#[derive(Serialize)]
struct ReassignResponse {
    pr: PullRequestResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    replaced_by: Option<String>,
}

#[derive(Serialize)]
struct PullRequestShort {
    pull_request_id: String,
    pull_request_name: String,
    author_id: String,
    status: PullRequestStatus,
}

#[derive(Serialize)]
struct ReviewsResponse {
    user_id: String,
    pull_requests: Vec<PullRequestShort>,
}

// ── Route builder ────────────────────────────────────────────────────────────

/// Build the API routes over a store.
pub fn api_routes<S: Store + 'static>() -> Router<ApiState<S>> {
    Router::new()
        .route("/health", get(health))
        .route("/team/add", post(add_team::<S>))
        .route("/team/get", get(get_team::<S>))
        .route("/users/setIsActive", post(set_is_active::<S>))
        .route("/users/getReview", get(get_review::<S>))
        .route("/pullRequest/create", post(create_pull_request::<S>))
        .route("/pullRequest/merge", post(merge_pull_request::<S>))
        .route("/pullRequest/reassign", post(reassign_reviewer::<S>))
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /team/add: create a team and upsert its members.
async fn add_team<S: Store>(
    State(state): State<ApiState<S>>,
    body: Result<Json<AddTeamRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TeamEnvelope>), ApiErr> {
    let Json(req) = body?;

    require("team_name", &req.team.team_name)?;
    for member in &req.team.members {
        require("user_id", &member.user_id)?;
        require("username", &member.username)?;
    }

    let new_team = NewTeam {
        name: req.team.team_name,
        members: req
            .team
            .members
            .into_iter()
            .map(|m| NewMember {
                user_id: m.user_id,
                username: m.username,
                is_active: m.is_active,
            })
            .collect(),
    };

    let saved = team::save_team(state.store.as_ref(), &new_team).await?;

    Ok((
        StatusCode::CREATED,
        Json(TeamEnvelope {
            team: saved.into(),
        }),
    ))
}

/// GET /team/get?team_name=X: team with members.
async fn get_team<S: Store>(
    State(state): State<ApiState<S>>,
    query: Result<Query<TeamQuery>, QueryRejection>,
) -> Result<Json<TeamResponse>, ApiErr> {
    let Query(params) = query?;
    let team_name = params
        .team_name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiErr::BadRequest("team_name parameter is required".into()))?;

    let found = team::get_team(state.store.as_ref(), &team_name).await?;

    Ok(Json(found.into()))
}

/// POST /users/setIsActive: toggle a user's active flag.
async fn set_is_active<S: Store>(
    State(state): State<ApiState<S>>,
    body: Result<Json<SetIsActiveRequest>, JsonRejection>,
) -> Result<Json<UserEnvelope>, ApiErr> {
    let Json(req) = body?;

    require("user_id", &req.user_id)?;
    let is_active = req.is_active.ok_or_else(|| {
        ApiErr::from(AppError::invalid_input_field(
            "field is_active is a required field",
            "is_active",
        ))
    })?;

    let updated = user::set_user_active(state.store.as_ref(), &req.user_id, is_active).await?;

    Ok(Json(UserEnvelope {
        user: updated.into(),
    }))
}

/// GET /users/getReview?user_id=X: pull requests the user reviews.
async fn get_review<S: Store>(
    State(state): State<ApiState<S>>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<ReviewsResponse>, ApiErr> {
    let Query(params) = query?;
    let user_id = params
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiErr::BadRequest("user_id parameter is required".into()))?;

    let reviews = pull_request::get_reviews_for_user(state.store.as_ref(), &user_id).await?;

    Ok(Json(ReviewsResponse {
        user_id,
        pull_requests: reviews
            .into_iter()
            .map(|pr| PullRequestShort {
                pull_request_id: pr.pull_request_id,
                pull_request_name: pr.name,
                author_id: pr.author_id,
                status: pr.status,
            })
            .collect(),
    }))
}

/// POST /pullRequest/create: create a pull request with reviewers.
async fn create_pull_request<S: Store>(
    State(state): State<ApiState<S>>,
    body: Result<Json<CreatePullRequestRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PullRequestEnvelope>), ApiErr> {
    let Json(req) = body?;

    require("pull_request_id", &req.pull_request_id)?;
    require("pull_request_name", &req.pull_request_name)?;
    require("author_id", &req.author_id)?;

    let input = NewPullRequest {
        pull_request_id: req.pull_request_id,
        name: req.pull_request_name,
        author_id: req.author_id,
    };

    let created = pull_request::create_pull_request(state.store.as_ref(), &input).await?;

    Ok((
        StatusCode::CREATED,
        Json(PullRequestEnvelope { pr: created.into() }),
    ))
}

/// POST /pullRequest/merge: mark merged (idempotent).
async fn merge_pull_request<S: Store>(
    State(state): State<ApiState<S>>,
    body: Result<Json<MergeRequest>, JsonRejection>,
) -> Result<Json<PullRequestEnvelope>, ApiErr> {
    let Json(req) = body?;

    require("pull_request_id", &req.pull_request_id)?;

    let merged = pull_request::merge_pull_request(state.store.as_ref(), &req.pull_request_id).await?;

    Ok(Json(PullRequestEnvelope { pr: merged.into() }))
}

/// POST /pullRequest/reassign: swap one reviewer for a teammate.
async fn reassign_reviewer<S: Store>(
    State(state): State<ApiState<S>>,
    body: Result<Json<ReassignRequest>, JsonRejection>,
) -> Result<Json<ReassignResponse>, ApiErr> {
    let Json(req) = body?;

    require("pull_request_id", &req.pull_request_id)?;
    require("old_reviewer_id", &req.old_reviewer_id)?;

    let result = pull_request::reassign_reviewer(
        state.store.as_ref(),
        &req.pull_request_id,
        &req.old_reviewer_id,
    )
    .await?;

    Ok(Json(ReassignResponse {
        pr: result.pull_request.into(),
        replaced_by: result.replaced_by,
    }))
}
