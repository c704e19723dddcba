//! Domain models for teams, users and pull requests.
//!
//! These are the values the lifecycle services hand back to their callers.
//! Storage-specific row types live next to the store that reads them.

pub mod pull_request;
pub mod team;
pub mod user;

// Re-exports for convenient access
pub use pull_request::{NewPullRequest, PullRequest, PullRequestStatus, Reassignment};
pub use team::{NewMember, NewTeam, Team};
pub use user::{NewUser, User};
