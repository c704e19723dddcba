//! Team lifecycle.

use crate::error::AppError;
use crate::models::{NewTeam, Team};
use crate::store::Store;

/// Create a team and upsert its members in one unit of work.
///
/// A duplicate team name fails with `Conflict` and leaves every member
/// record untouched.
pub async fn save_team<S: Store>(store: &S, team: &NewTeam) -> Result<Team, AppError> {
    let mut scope = store.begin().await?;

    let team_id = store.insert_team(Some(&mut scope), &team.name).await?;

    for member in team.member_users() {
        store.upsert_user(Some(&mut scope), &member).await?;
    }

    let saved = store.get_team(Some(&mut scope), team_id).await?;

    store.commit(scope).await?;

    log::info!(
        "[team] Saved {} with {} members",
        saved.name,
        saved.members.len()
    );

    Ok(saved)
}

/// Fetch a team with its members.
pub async fn get_team<S: Store>(store: &S, name: &str) -> Result<Team, AppError> {
    Ok(store.get_team_by_name(None, name).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Resource;
    use crate::models::NewMember;
    use crate::store::{MemoryStore, UserRepository};

    fn new_team(name: &str, members: &[(&str, &str, bool)]) -> NewTeam {
        NewTeam {
            name: name.to_string(),
            members: members
                .iter()
                .map(|(id, username, active)| NewMember {
                    user_id: id.to_string(),
                    username: username.to_string(),
                    is_active: *active,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_save_and_get_team() {
        let store = MemoryStore::new();

        let saved = save_team(
            &store,
            &new_team("backend", &[("u1", "Alice", true), ("u2", "Bob", false)]),
        )
        .await
        .unwrap();

        assert_eq!(saved.name, "backend");
        let members: Vec<(&str, bool)> = saved
            .members
            .iter()
            .map(|m| (m.user_id.as_str(), m.is_active))
            .collect();
        assert_eq!(members, vec![("u1", true), ("u2", false)]);

        let fetched = get_team(&store, "backend").await.unwrap();
        assert_eq!(fetched, saved);
    }

    #[tokio::test]
    async fn test_save_team_moves_existing_user() {
        let store = MemoryStore::new();
        save_team(&store, &new_team("backend", &[("u1", "Alice", true)]))
            .await
            .unwrap();

        let frontend = save_team(&store, &new_team("frontend", &[("u1", "Alice B.", false)]))
            .await
            .unwrap();
        assert_eq!(frontend.members.len(), 1);
        assert_eq!(frontend.members[0].username, "Alice B.");

        let backend = get_team(&store, "backend").await.unwrap();
        assert!(backend.members.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_team_changes_nothing() {
        let store = MemoryStore::new();
        save_team(&store, &new_team("backend", &[("u1", "Alice", true)]))
            .await
            .unwrap();

        let err = save_team(
            &store,
            &new_team("backend", &[("u1", "Renamed", false), ("u9", "New", true)]),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Conflict { resource: Resource::Team, .. }));
        assert_eq!(err.code(), "TEAM_EXISTS");

        let u1 = store.get_user_by_user_id(None, "u1").await.unwrap();
        assert_eq!(u1.username, "Alice");
        assert!(u1.is_active);
        assert!(store.get_user_by_user_id(None, "u9").await.is_err());
    }

    #[tokio::test]
    async fn test_member_upsert_failure_rolls_back_team() {
        let store = MemoryStore::new();
        store.fail_operation("upsert_user");

        let err = save_team(&store, &new_team("backend", &[("u1", "Alice", true)]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");

        let missing = get_team(&store, "backend").await.unwrap_err();
        assert_eq!(missing.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_get_unknown_team() {
        let store = MemoryStore::new();

        let err = get_team(&store, "nobody").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { resource: Resource::Team, .. }));
    }
}
