//! Pull request lifecycle.
//!
//! Every mutating operation runs inside a single store scope: it either
//! commits all of its writes or none of them.

use crate::error::AppError;
use crate::models::{NewPullRequest, PullRequest, Reassignment};
use crate::services::reviewer_selection::{
    select_reviewers, SelectionPolicy, CREATION_REVIEWER_LIMIT,
};
use crate::store::Store;

/// Create a pull request and assign up to two reviewers from the author's team.
///
/// Reviewers are the lowest-ID active teammates of the author. Having no
/// eligible teammate is not an error; the pull request is created with an
/// empty reviewer set.
///
/// # Arguments
/// * `store` - Record store
/// * `input` - External ID, name and author of the new pull request
///
/// # Returns
/// The stored pull request with its reviewers
pub async fn create_pull_request<S: Store>(
    store: &S,
    input: &NewPullRequest,
) -> Result<PullRequest, AppError> {
    let mut scope = store.begin().await?;

    let author = store
        .get_user_by_user_id(Some(&mut scope), &input.author_id)
        .await?;

    let reviewers = match author.team_name.as_deref() {
        Some(team_name) => {
            select_reviewers(
                store,
                &mut scope,
                team_name,
                std::slice::from_ref(&author.user_id),
                CREATION_REVIEWER_LIMIT,
                SelectionPolicy::LowestIdFirst,
            )
            .await?
        }
        None => Vec::new(),
    };

    store.insert_pull_request(Some(&mut scope), input).await?;

    for reviewer in &reviewers {
        store
            .assign_reviewer(Some(&mut scope), &input.pull_request_id, reviewer)
            .await?;
    }

    let pull_request = store
        .get_pull_request(Some(&mut scope), &input.pull_request_id)
        .await?;

    store.commit(scope).await?;

    log::info!(
        "[pull_request] Created {} by {} with reviewers {:?}",
        pull_request.pull_request_id,
        pull_request.author_id,
        pull_request.assigned_reviewers
    );

    Ok(pull_request)
}

/// Mark a pull request as merged.
///
/// Merging an already merged pull request returns it unchanged, with its
/// original merge timestamp. Reviewer assignments are kept.
pub async fn merge_pull_request<S: Store>(
    store: &S,
    pull_request_id: &str,
) -> Result<PullRequest, AppError> {
    let mut scope = store.begin().await?;

    let current = store
        .get_pull_request(Some(&mut scope), pull_request_id)
        .await?;
    if current.is_merged() {
        log::debug!("[pull_request] {} already merged", pull_request_id);
        return Ok(current);
    }

    let merged = match store
        .merge_pull_request(Some(&mut scope), pull_request_id)
        .await?
    {
        Some(merged) => merged,
        // Someone else merged it first; report their result.
        None => {
            store
                .get_pull_request(Some(&mut scope), pull_request_id)
                .await?
        }
    };

    store.commit(scope).await?;

    log::info!("[pull_request] Merged {}", pull_request_id);

    Ok(merged)
}

/// Replace one assigned reviewer with a random eligible teammate.
///
/// The replacement comes from the old reviewer's team and is never the
/// author, the old reviewer, or another current reviewer. When nobody is
/// eligible the old reviewer is still removed and `replaced_by` is `None`.
///
/// # Errors
/// * `NotFound` - unknown pull request
/// * `MergedConflict` - the pull request is merged
/// * `NotAssignedConflict` - `old_reviewer_id` is not assigned
pub async fn reassign_reviewer<S: Store>(
    store: &S,
    pull_request_id: &str,
    old_reviewer_id: &str,
) -> Result<Reassignment, AppError> {
    let mut scope = store.begin().await?;

    let current = store
        .get_pull_request(Some(&mut scope), pull_request_id)
        .await?;

    if current.is_merged() {
        return Err(AppError::merged_conflict(pull_request_id));
    }
    if !current.has_reviewer(old_reviewer_id) {
        return Err(AppError::not_assigned(pull_request_id, old_reviewer_id));
    }

    let old_reviewer = store
        .get_user_by_user_id(Some(&mut scope), old_reviewer_id)
        .await?;

    // Current reviewers include the one being replaced.
    let mut exclude = current.assigned_reviewers.clone();
    exclude.push(current.author_id.clone());

    let replaced_by = match old_reviewer.team_name.as_deref() {
        Some(team_name) => select_reviewers(
            store,
            &mut scope,
            team_name,
            &exclude,
            1,
            SelectionPolicy::Random,
        )
        .await?
        .into_iter()
        .next(),
        None => None,
    };

    store
        .remove_reviewer(Some(&mut scope), pull_request_id, old_reviewer_id)
        .await?;

    if let Some(new_reviewer) = &replaced_by {
        store
            .assign_reviewer(Some(&mut scope), pull_request_id, new_reviewer)
            .await?;
    }

    let pull_request = store
        .get_pull_request(Some(&mut scope), pull_request_id)
        .await?;

    store.commit(scope).await?;

    match &replaced_by {
        Some(new_reviewer) => log::info!(
            "[pull_request] Reassigned {} on {} to {}",
            old_reviewer_id,
            pull_request_id,
            new_reviewer
        ),
        None => log::info!(
            "[pull_request] Removed {} from {}, no replacement available",
            old_reviewer_id,
            pull_request_id
        ),
    }

    Ok(Reassignment {
        pull_request,
        replaced_by,
    })
}

/// Pull requests the user is assigned to review, newest first.
pub async fn get_reviews_for_user<S: Store>(
    store: &S,
    user_id: &str,
) -> Result<Vec<PullRequest>, AppError> {
    store.get_user_by_user_id(None, user_id).await?;

    Ok(store.list_pull_requests_by_reviewer(None, user_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Resource;
    use crate::models::{NewMember, NewTeam, PullRequestStatus};
    use crate::services::team::save_team;
    use crate::services::user::set_user_active;
    use crate::store::{MemoryStore, PullRequestRepository};
    use std::time::Duration;

    async fn seed_team(store: &MemoryStore, name: &str, members: &[(&str, bool)]) {
        let team = NewTeam {
            name: name.to_string(),
            members: members
                .iter()
                .map(|(id, active)| NewMember {
                    user_id: id.to_string(),
                    username: format!("User {}", id),
                    is_active: *active,
                })
                .collect(),
        };
        save_team(store, &team).await.unwrap();
    }

    fn new_pr(id: &str, author: &str) -> NewPullRequest {
        NewPullRequest {
            pull_request_id: id.to_string(),
            name: format!("Change {}", id),
            author_id: author.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_two_lowest_teammates() {
        let store = MemoryStore::new();
        seed_team(&store, "backend", &[("u4", true), ("u1", true), ("u3", true), ("u2", true)]).await;

        let pr = create_pull_request(&store, &new_pr("pr-1", "u1")).await.unwrap();

        assert_eq!(pr.status, PullRequestStatus::Open);
        assert_eq!(pr.assigned_reviewers, vec!["u2", "u3"]);
        assert!(pr.merged_at.is_none());
    }

    #[tokio::test]
    async fn test_create_without_teammates() {
        let store = MemoryStore::new();
        seed_team(&store, "solo", &[("u1", true)]).await;

        let pr = create_pull_request(&store, &new_pr("pr-1", "u1")).await.unwrap();

        assert_eq!(pr.status, PullRequestStatus::Open);
        assert!(pr.assigned_reviewers.is_empty());
    }

    #[tokio::test]
    async fn test_create_skips_inactive_teammates() {
        let store = MemoryStore::new();
        seed_team(&store, "backend", &[("u1", true), ("u2", false), ("u3", true)]).await;

        let pr = create_pull_request(&store, &new_pr("pr-1", "u1")).await.unwrap();

        assert_eq!(pr.assigned_reviewers, vec!["u3"]);
    }

    #[tokio::test]
    async fn test_create_unknown_author() {
        let store = MemoryStore::new();

        let err = create_pull_request(&store, &new_pr("pr-1", "ghost"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound { resource: Resource::User, .. }));
        assert!(store.get_pull_request(None, "pr-1").await.is_err());
    }

    #[tokio::test]
    async fn test_create_duplicate_id() {
        let store = MemoryStore::new();
        seed_team(&store, "backend", &[("u1", true), ("u2", true)]).await;
        create_pull_request(&store, &new_pr("pr-1", "u1")).await.unwrap();

        let err = create_pull_request(&store, &new_pr("pr-1", "u2"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "PR_EXISTS");
        let stored = store.get_pull_request(None, "pr-1").await.unwrap();
        assert_eq!(stored.author_id, "u1");
    }

    #[tokio::test]
    async fn test_create_rolls_back_on_assignment_failure() {
        let store = MemoryStore::new();
        seed_team(&store, "backend", &[("u1", true), ("u2", true)]).await;
        store.fail_operation("assign_reviewer");

        let err = create_pull_request(&store, &new_pr("pr-1", "u1"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::StoreUnavailable { .. }));
        let missing = store.get_pull_request(None, "pr-1").await.unwrap_err();
        assert!(matches!(missing, crate::store::StoreError::NotFound(..)));
    }

    #[tokio::test]
    async fn test_cancelled_create_leaves_nothing_behind() {
        let store = MemoryStore::new();
        seed_team(&store, "backend", &[("u1", true), ("u2", true), ("u3", true)]).await;
        store.stall_operation("assign_reviewer");

        // The pull request row is already staged when the call is dropped
        let result = tokio::time::timeout(
            Duration::from_millis(50),
            create_pull_request(&store, &new_pr("pr-1", "u1")),
        )
        .await;
        assert!(result.is_err());

        let missing = store.get_pull_request(None, "pr-1").await.unwrap_err();
        assert!(matches!(missing, crate::store::StoreError::NotFound(..)));
        assert!(store.list_reviewers(None, "pr-1").await.unwrap().is_empty());
        let reviews = get_reviews_for_user(&store, "u2").await.unwrap();
        assert!(reviews.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_reassign_keeps_old_reviewer() {
        let store = MemoryStore::new();
        seed_team(&store, "backend", &[("u1", true), ("u2", true), ("u3", true), ("u4", true)]).await;
        create_pull_request(&store, &new_pr("pr-1", "u1")).await.unwrap();
        store.stall_operation("assign_reviewer");

        // Dropped after the old reviewer was removed inside the scope
        let result = tokio::time::timeout(
            Duration::from_millis(50),
            reassign_reviewer(&store, "pr-1", "u2"),
        )
        .await;
        assert!(result.is_err());

        let reviewers = store.list_reviewers(None, "pr-1").await.unwrap();
        assert_eq!(reviewers, vec!["u2", "u3"]);
    }

    #[tokio::test]
    async fn test_merge_sets_timestamp_once() {
        let store = MemoryStore::new();
        seed_team(&store, "backend", &[("u1", true), ("u2", true)]).await;
        create_pull_request(&store, &new_pr("pr-1", "u1")).await.unwrap();

        let first = merge_pull_request(&store, "pr-1").await.unwrap();
        assert_eq!(first.status, PullRequestStatus::Merged);
        assert!(first.merged_at.is_some());
        assert_eq!(first.assigned_reviewers, vec!["u2"]);

        let second = merge_pull_request(&store, "pr-1").await.unwrap();
        assert_eq!(second.merged_at, first.merged_at);
        assert_eq!(second.status, PullRequestStatus::Merged);
    }

    #[tokio::test]
    async fn test_merge_unknown() {
        let store = MemoryStore::new();

        let err = merge_pull_request(&store, "nope").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_reassign_unassigned_reviewer() {
        let store = MemoryStore::new();
        seed_team(&store, "backend", &[("u1", true), ("u2", true), ("u3", true), ("u4", true)]).await;
        create_pull_request(&store, &new_pr("pr-1", "u1")).await.unwrap();

        let err = reassign_reviewer(&store, "pr-1", "u4").await.unwrap_err();
        assert!(matches!(err, AppError::NotAssignedConflict { .. }));

        let pr = store.get_pull_request(None, "pr-1").await.unwrap();
        assert_eq!(pr.assigned_reviewers, vec!["u2", "u3"]);
    }

    #[tokio::test]
    async fn test_reassign_on_merged() {
        let store = MemoryStore::new();
        seed_team(&store, "backend", &[("u1", true), ("u2", true), ("u3", true), ("u4", true)]).await;
        create_pull_request(&store, &new_pr("pr-1", "u1")).await.unwrap();
        merge_pull_request(&store, "pr-1").await.unwrap();

        let err = reassign_reviewer(&store, "pr-1", "u2").await.unwrap_err();
        assert_eq!(err.code(), "PR_MERGED");

        let reviewers = store.list_reviewers(None, "pr-1").await.unwrap();
        assert_eq!(reviewers, vec!["u2", "u3"]);
    }

    #[tokio::test]
    async fn test_reassign_picks_valid_replacement() {
        let store = MemoryStore::new();
        seed_team(
            &store,
            "backend",
            &[("u1", true), ("u2", true), ("u3", true), ("u4", true), ("u5", false), ("u6", true)],
        )
        .await;
        seed_team(&store, "frontend", &[("f1", true)]).await;
        create_pull_request(&store, &new_pr("pr-1", "u1")).await.unwrap();

        let result = reassign_reviewer(&store, "pr-1", "u2").await.unwrap();

        let new_reviewer = result.replaced_by.expect("replacement expected");
        assert!(["u4", "u6"].contains(&new_reviewer.as_str()));
        assert_eq!(result.pull_request.assigned_reviewers.len(), 2);
        assert!(result.pull_request.has_reviewer("u3"));
        assert!(result.pull_request.has_reviewer(&new_reviewer));
        assert!(!result.pull_request.has_reviewer("u2"));
    }

    #[tokio::test]
    async fn test_reassign_draws_from_old_reviewers_team() {
        let store = MemoryStore::new();
        seed_team(&store, "backend", &[("u1", true), ("u2", true), ("u3", true), ("u4", true)]).await;
        create_pull_request(&store, &new_pr("pr-1", "u1")).await.unwrap();

        // u2 moves to frontend after being assigned
        seed_team(&store, "frontend", &[("u2", true), ("f1", true)]).await;

        let result = reassign_reviewer(&store, "pr-1", "u2").await.unwrap();

        assert_eq!(result.replaced_by.as_deref(), Some("f1"));
        assert_eq!(result.pull_request.assigned_reviewers.len(), 2);
        assert!(result.pull_request.has_reviewer("u3"));
        assert!(!result.pull_request.has_reviewer("u4"));
    }

    #[tokio::test]
    async fn test_reassign_without_candidates_shrinks_set() {
        let store = MemoryStore::new();
        seed_team(&store, "backend", &[("u1", true), ("u2", true), ("u3", true)]).await;

        let pr = create_pull_request(&store, &new_pr("pr-1", "u1")).await.unwrap();
        assert_eq!(pr.assigned_reviewers, vec!["u2", "u3"]);

        let result = reassign_reviewer(&store, "pr-1", "u2").await.unwrap();
        assert_eq!(result.pull_request.assigned_reviewers, vec!["u3"]);
        assert!(result.replaced_by.is_none());
    }

    #[tokio::test]
    async fn test_reassign_never_picks_deactivated_user() {
        let store = MemoryStore::new();
        seed_team(&store, "backend", &[("u1", true), ("u2", true), ("u3", true), ("u4", true)]).await;
        create_pull_request(&store, &new_pr("pr-1", "u1")).await.unwrap();
        set_user_active(&store, "u4", false).await.unwrap();

        let result = reassign_reviewer(&store, "pr-1", "u3").await.unwrap();
        assert!(result.replaced_by.is_none());
        assert_eq!(result.pull_request.assigned_reviewers, vec!["u2"]);
    }

    #[tokio::test]
    async fn test_reviews_for_user_newest_first() {
        let store = MemoryStore::new();
        seed_team(&store, "backend", &[("u1", true), ("u2", true)]).await;
        create_pull_request(&store, &new_pr("pr-1", "u1")).await.unwrap();
        create_pull_request(&store, &new_pr("pr-2", "u1")).await.unwrap();

        let reviews = get_reviews_for_user(&store, "u2").await.unwrap();
        let ids: Vec<&str> = reviews.iter().map(|p| p.pull_request_id.as_str()).collect();
        assert_eq!(ids, vec!["pr-2", "pr-1"]);

        assert!(get_reviews_for_user(&store, "u1").await.unwrap().is_empty());

        let err = get_reviews_for_user(&store, "ghost").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
