use serde::{Deserialize, Serialize};
use std::{collections::HashSet, time::SystemTime};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    Administrator,
    User,
}

/// An authenticated principal (§3). The first successfully authenticated
/// principal is promoted to administrator; subsequent principals adopt
/// configured defaults (see [`crate::identity`]).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// The OIDC subject id — this is the primary key, not a surrogate one,
    /// because the identity provider is the source of truth for identity.
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub authorized_networks: HashSet<i64>,
    #[serde(with = "crate::util::unix_time")]
    pub last_login: SystemTime,
}

/// A login session binding a user to an access/refresh token pair (§3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthSession {
    /// Opaque handle the caller presents; stored hashed, looked up by hash.
    pub handle: String,
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: SystemTime,
    pub refresh_expires_at: SystemTime,
    pub created_at: SystemTime,
    pub last_used_at: SystemTime,
}
