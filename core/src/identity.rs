//! Identity & Authorization (§4.1). Resolves an inbound credential — an
//! opaque session handle (preferred) or a raw bearer JWT (compatibility) —
//! to a [`User`], and exposes the three authorization predicates every
//! mutating operation in the rest of the core is gated on.
//!
//! The identity provider itself (JWKS fetch, OIDC token exchange) is an
//! external collaborator (§1 Out of scope); this module depends on it only
//! through the [`IdentityProvider`] trait, composed rather than inherited
//! (§9 "Polymorphic port surfaces").

use crate::error::{CoreError, CoreResult};
use crate::model::{AuthSession, Role, User};
use crate::store::UserStore;
use std::time::SystemTime;

/// Claims extracted from a validated JWT, or produced by exchanging a
/// refresh token at the identity provider.
#[derive(Clone, Debug)]
pub struct VerifiedClaims {
    pub subject: String,
    pub email: String,
    pub display_name: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub access_expires_at: SystemTime,
    pub refresh_expires_at: Option<SystemTime>,
}

/// The capability this module needs from an OIDC-speaking identity
/// provider: validate a raw bearer JWT, and exchange a refresh token.
/// A concrete implementation (JWKS cache, `kid` lookup, issuer/azp checks)
/// lives outside `core` (§1 Out of scope).
pub trait IdentityProvider: Send + Sync {
    fn validate_bearer_jwt(&self, jwt: &str) -> CoreResult<VerifiedClaims>;
    fn refresh(&self, refresh_token: &str) -> CoreResult<VerifiedClaims>;
}

pub enum Credential<'a> {
    SessionHandle(&'a str),
    BearerJwt(&'a str),
}

/// §4.1 "On successful validation, ensure a User record exists... update
/// last-login", then resolve the principal.
pub fn authenticate(
    conn: &rusqlite::Connection,
    provider: &dyn IdentityProvider,
    credential: Credential,
    lookup_session: impl FnOnce(&str) -> Option<AuthSession>,
) -> CoreResult<User> {
    let claims = match credential {
        Credential::BearerJwt(jwt) => provider.validate_bearer_jwt(jwt)?,
        Credential::SessionHandle(handle) => {
            let session = lookup_session(handle).ok_or(CoreError::Unauthenticated)?;
            let now = SystemTime::now();
            if session.access_expires_at > now {
                // Access token still live; the session's bound claims are
                // trusted as-is — no network round trip needed.
                return resolve_user(conn, &session.user_id, None, None);
            }
            if session.refresh_expires_at <= now {
                return Err(CoreError::Unauthenticated);
            }
            // Silently exchange at the identity provider (§4.1).
            match provider.refresh(&session.refresh_token) {
                Ok(refreshed) => refreshed,
                Err(_) => return Err(CoreError::Unauthenticated),
            }
        },
    };

    resolve_user(conn, &claims.subject, Some(claims.email), Some(claims.display_name))
}

fn resolve_user(conn: &rusqlite::Connection, subject: &str, email: Option<String>, display_name: Option<String>) -> CoreResult<User> {
    let role = match UserStore::get(conn, subject) {
        Ok(existing) => existing.role, // upsert below preserves it regardless
        Err(CoreError::NotFound) => first_user_role(conn)?,
        Err(e) => return Err(e),
    };

    UserStore::upsert(
        conn,
        subject,
        &email.unwrap_or_default(),
        &display_name.unwrap_or_default(),
        role,
    )
}

/// §3 "The first successfully authenticated principal is promoted to
/// administrator; subsequent principals adopt configured defaults."
fn first_user_role(conn: &rusqlite::Connection) -> CoreResult<Role> {
    if UserStore::count(conn)? == 0 {
        Ok(Role::Administrator)
    } else {
        Ok(Role::User)
    }
}

/// Issues a new opaque session handle for `claims` and persists it hashed
/// (§3 Session "created on login"). The caller hands the returned handle
/// to the client; only its hash ever reaches the store.
pub fn login(conn: &rusqlite::Connection, claims: &VerifiedClaims) -> CoreResult<String> {
    let handle = crate::enrollment::random_token();
    let session = AuthSession {
        handle: handle.clone(),
        user_id: claims.subject.clone(),
        access_token: claims.access_token.clone(),
        refresh_token: claims.refresh_token.clone().unwrap_or_default(),
        access_expires_at: claims.access_expires_at,
        refresh_expires_at: claims.refresh_expires_at.unwrap_or(claims.access_expires_at),
        created_at: SystemTime::now(),
        last_used_at: SystemTime::now(),
    };

    UserStore::create_session(conn, &session, &hash_token(&handle), &hash_token(&claims.access_token))?;

    Ok(handle)
}

/// Convenience `lookup_session` source for [`authenticate`]: hashes the
/// handle the caller presented and looks up the matching session row.
pub fn find_session(conn: &rusqlite::Connection, handle: &str) -> Option<AuthSession> {
    crate::store::UserStore::get_session(conn, &hash_token(handle)).ok()
}

fn hash_token(token: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)
}

pub fn is_administrator(user: &User) -> bool {
    user.role == Role::Administrator
}

pub fn has_network_access(user: &User, network_id: i64) -> bool {
    is_administrator(user) || user.authorized_networks.contains(&network_id)
}

pub fn can_manage_peer(user: &User, network_id: i64, peer_owner_id: Option<&str>) -> bool {
    if is_administrator(user) {
        return true;
    }
    match peer_owner_id {
        Some(owner) => owner == user.id && has_network_access(user, network_id),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn predicates() {
        let admin = User {
            id: "a".into(),
            email: String::new(),
            display_name: String::new(),
            role: Role::Administrator,
            authorized_networks: HashSet::new(),
            last_login: SystemTime::now(),
        };
        assert!(is_administrator(&admin));
        assert!(has_network_access(&admin, 999));
        assert!(can_manage_peer(&admin, 999, None));

        let mut user = admin.clone();
        user.role = Role::User;
        user.id = "u".into();
        assert!(!is_administrator(&user));
        assert!(!has_network_access(&user, 5));
        user.authorized_networks.insert(5);
        assert!(has_network_access(&user, 5));
        assert!(can_manage_peer(&user, 5, Some("u")));
        assert!(!can_manage_peer(&user, 5, Some("someone-else")));
    }
}
