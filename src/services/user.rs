//! User activity management.

use crate::error::AppError;
use crate::models::User;
use crate::store::Store;

/// Set a user's active flag.
///
/// Only existing users can be toggled; an unknown ID fails with `NotFound`
/// and writes nothing.
pub async fn set_user_active<S: Store>(
    store: &S,
    user_id: &str,
    is_active: bool,
) -> Result<User, AppError> {
    let mut scope = store.begin().await?;

    let id = store
        .set_user_active(Some(&mut scope), user_id, is_active)
        .await?;
    let user = store.get_user(Some(&mut scope), id).await?;

    store.commit(scope).await?;

    log::info!("[user] {} is_active={}", user.user_id, user.is_active);

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewMember, NewTeam};
    use crate::services::team::save_team;
    use crate::store::{MemoryStore, UserRepository};

    #[tokio::test]
    async fn test_toggle_existing_user() {
        let store = MemoryStore::new();
        save_team(
            &store,
            &NewTeam {
                name: "backend".into(),
                members: vec![NewMember {
                    user_id: "u1".into(),
                    username: "Alice".into(),
                    is_active: true,
                }],
            },
        )
        .await
        .unwrap();

        let user = set_user_active(&store, "u1", false).await.unwrap();
        assert!(!user.is_active);
        assert_eq!(user.team_name.as_deref(), Some("backend"));

        let user = set_user_active(&store, "u1", true).await.unwrap();
        assert!(user.is_active);
    }

    #[tokio::test]
    async fn test_toggle_unknown_user() {
        let store = MemoryStore::new();

        let err = set_user_active(&store, "ghost", true).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(store.get_user_by_user_id(None, "ghost").await.is_err());
    }
}
