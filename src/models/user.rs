//! User model.

use sqlx::FromRow;

/// A team member who can author and review pull requests.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    /// Store-assigned internal ID.
    pub id: i64,

    /// External user ID (unique).
    pub user_id: String,

    pub username: String,

    /// Team this user belongs to, matched by name.
    pub team_name: Option<String>,

    /// Inactive users are never picked as reviewers.
    pub is_active: bool,
}

/// Input for inserting or updating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_id: String,
    pub username: String,
    pub team_name: String,
    pub is_active: bool,
}
