use crate::error::{CoreError, CoreResult};
use crate::model::{AuthSession, Role, User};
use rusqlite::{params, Row};
use std::{collections::HashSet, time::UNIX_EPOCH};

pub static CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS users (
      id                   TEXT PRIMARY KEY,
      email                TEXT NOT NULL,
      display_name         TEXT NOT NULL,
      role                 TEXT NOT NULL,
      authorized_networks  TEXT NOT NULL DEFAULT '',
      last_login           INTEGER NOT NULL
    )";

/// Tokens themselves never touch disk — only a hash of the opaque handle
/// the caller presents (§3 "stored hashed, looked up by hash").
pub static CREATE_SESSION_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS auth_sessions (
      handle_hash        TEXT PRIMARY KEY,
      user_id            TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
      access_token_hash   TEXT NOT NULL,
      refresh_token       TEXT NOT NULL,
      access_expires_at   INTEGER NOT NULL,
      refresh_expires_at  INTEGER NOT NULL,
      created_at          INTEGER NOT NULL,
      last_used_at        INTEGER NOT NULL
    )";

pub struct UserStore;

impl UserStore {
    /// The first user ever created is promoted administrator by the caller
    /// (identity layer decides the role before calling this); this store
    /// just persists whatever role it's handed.
    pub fn upsert(
        conn: &rusqlite::Connection,
        id: &str,
        email: &str,
        display_name: &str,
        role: Role,
    ) -> CoreResult<User> {
        let role_str = role_to_str(role);
        let now = crate::store::unix(std::time::SystemTime::now());
        conn.execute(
            "INSERT INTO users (id, email, display_name, role, authorized_networks, last_login)
             VALUES (?1, ?2, ?3, ?4, '', ?5)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                display_name = excluded.display_name,
                last_login = excluded.last_login",
            params![id, email, display_name, role_str, now],
        )?;
        Self::get(conn, id)
    }

    pub fn get(conn: &rusqlite::Connection, id: &str) -> CoreResult<User> {
        conn.query_row(
            "SELECT id, email, display_name, role, authorized_networks, last_login FROM users WHERE id = ?1",
            params![id],
            Self::from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CoreError::NotFound,
            e => e.into(),
        })
    }

    pub fn count(conn: &rusqlite::Connection) -> CoreResult<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM users", params![], |row| row.get(0))?)
    }

    pub fn grant_network_access(conn: &rusqlite::Connection, user_id: &str, network_id: i64) -> CoreResult<User> {
        let mut user = Self::get(conn, user_id)?;
        user.authorized_networks.insert(network_id);
        conn.execute(
            "UPDATE users SET authorized_networks = ?2 WHERE id = ?1",
            params![user_id, encode_networks(&user.authorized_networks)],
        )?;
        Ok(user)
    }

    pub fn revoke_network_access(conn: &rusqlite::Connection, user_id: &str, network_id: i64) -> CoreResult<User> {
        let mut user = Self::get(conn, user_id)?;
        user.authorized_networks.remove(&network_id);
        conn.execute(
            "UPDATE users SET authorized_networks = ?2 WHERE id = ?1",
            params![user_id, encode_networks(&user.authorized_networks)],
        )?;
        Ok(user)
    }

    pub fn create_session(conn: &rusqlite::Connection, session: &AuthSession, handle_hash: &str, access_hash: &str) -> CoreResult<()> {
        conn.execute(
            "INSERT INTO auth_sessions (handle_hash, user_id, access_token_hash, refresh_token,
                access_expires_at, refresh_expires_at, created_at, last_used_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                handle_hash,
                session.user_id,
                access_hash,
                session.refresh_token,
                crate::store::unix(session.access_expires_at),
                crate::store::unix(session.refresh_expires_at),
                crate::store::unix(session.created_at),
            ],
        )?;
        Ok(())
    }

    /// Looked up by the hash of the handle the caller presents — the raw
    /// handle itself never touches the store (§3 "stored hashed, looked up
    /// by hash"). The access token itself isn't retained once hashed; a
    /// live (unexpired) session is trusted on its expiry alone.
    pub fn get_session(conn: &rusqlite::Connection, handle_hash: &str) -> CoreResult<AuthSession> {
        conn.query_row(
            "SELECT user_id, refresh_token, access_expires_at, refresh_expires_at, created_at, last_used_at
             FROM auth_sessions WHERE handle_hash = ?1",
            params![handle_hash],
            |row| {
                let user_id: String = row.get(0)?;
                let refresh_token: String = row.get(1)?;
                let access_expires_at: i64 = row.get(2)?;
                let refresh_expires_at: i64 = row.get(3)?;
                let created_at: i64 = row.get(4)?;
                let last_used_at: i64 = row.get(5)?;
                Ok(AuthSession {
                    handle: String::new(),
                    user_id,
                    access_token: String::new(),
                    refresh_token,
                    access_expires_at: UNIX_EPOCH + std::time::Duration::from_secs(access_expires_at as u64),
                    refresh_expires_at: UNIX_EPOCH + std::time::Duration::from_secs(refresh_expires_at as u64),
                    created_at: UNIX_EPOCH + std::time::Duration::from_secs(created_at as u64),
                    last_used_at: UNIX_EPOCH + std::time::Duration::from_secs(last_used_at as u64),
                })
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CoreError::NotFound,
            e => e.into(),
        })
    }

    pub fn touch_session(conn: &rusqlite::Connection, handle_hash: &str) -> CoreResult<()> {
        conn.execute(
            "UPDATE auth_sessions SET last_used_at = ?2 WHERE handle_hash = ?1",
            params![handle_hash, crate::store::unix(std::time::SystemTime::now())],
        )?;
        Ok(())
    }

    pub fn revoke_session(conn: &rusqlite::Connection, handle_hash: &str) -> CoreResult<()> {
        conn.execute("DELETE FROM auth_sessions WHERE handle_hash = ?1", params![handle_hash])?;
        Ok(())
    }

    fn from_row(row: &Row) -> Result<User, rusqlite::Error> {
        let id = row.get(0)?;
        let email = row.get(1)?;
        let display_name = row.get(2)?;
        let role: String = row.get(3)?;
        let role = str_to_role(&role);
        let authorized_networks: String = row.get(4)?;
        let authorized_networks = decode_networks(&authorized_networks);
        let last_login: i64 = row.get(5)?;
        Ok(User {
            id,
            email,
            display_name,
            role,
            authorized_networks,
            last_login: UNIX_EPOCH + std::time::Duration::from_secs(last_login as u64),
        })
    }
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::Administrator => "administrator",
        Role::User => "user",
    }
}

fn str_to_role(s: &str) -> Role {
    match s {
        "administrator" => Role::Administrator,
        _ => Role::User,
    }
}

fn encode_networks(networks: &HashSet<i64>) -> String {
    networks.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

fn decode_networks(s: &str) -> HashSet<i64> {
    if s.is_empty() {
        return HashSet::new();
    }
    s.split(',').filter_map(|part| part.parse().ok()).collect()
}
