use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Closed set of permission tiers. Access checks use set membership, there
/// is no hierarchy between roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "sysadmin")]
    SystemAdmin,
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "writer")]
    Writer,
    #[default]
    #[serde(rename = "reader")]
    Reader,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::SystemAdmin, Role::Admin, Role::Writer, Role::Reader];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SystemAdmin => "sysadmin",
            Role::Admin => "admin",
            Role::Writer => "writer",
            Role::Reader => "reader",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`AuthRepository::create_user`](super::AuthRepository::create_user).
#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// Input for [`AuthRepository::create_session`](super::AuthRepository::create_session).
#[derive(Clone)]
pub struct CreateSessionParams {
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}
