//! Team model.

use super::user::User;

/// A named team and its members, ordered by internal ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub members: Vec<User>,
}

/// A member entry in a team save request.
#[derive(Debug, Clone)]
pub struct NewMember {
    pub user_id: String,
    pub username: String,
    pub is_active: bool,
}

/// Input for saving a team with its members.
#[derive(Debug, Clone)]
pub struct NewTeam {
    pub name: String,
    pub members: Vec<NewMember>,
}

impl NewTeam {
    /// Member records carrying this team's name.
    pub fn member_users(&self) -> Vec<super::NewUser> {
        self.members
            .iter()
            .map(|m| super::NewUser {
                user_id: m.user_id.clone(),
                username: m.username.clone(),
                team_name: self.name.clone(),
                is_active: m.is_active,
            })
            .collect()
    }
}
