//! Reviewer service - pull request reviewer assignment.
//!
//! Teams of users author pull requests; each new pull request gets up to two
//! reviewers from the author's team, reviewers can be swapped for a random
//! teammate, and merging closes the pull request for good.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
