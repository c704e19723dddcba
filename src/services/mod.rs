//! Business logic services.
//!
//! Lifecycle operations are free functions generic over a [`Store`]
//! (`crate::store::Store`); the HTTP modules expose them over axum.

pub mod http_api;
pub mod http_server;
pub mod pull_request;
pub mod reviewer_selection;
pub mod team;
pub mod user;

pub use reviewer_selection::SelectionPolicy;
