use crate::error::{CoreError, CoreResult};
use crate::model::EnrollmentToken;
use rusqlite::{params, Row};
use std::time::UNIX_EPOCH;

pub static CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS enrollment_tokens (
      token      TEXT PRIMARY KEY,
      network_id INTEGER NOT NULL REFERENCES networks(id) ON DELETE CASCADE,
      peer_id    INTEGER NOT NULL UNIQUE REFERENCES peers(id) ON DELETE CASCADE,
      created_at INTEGER NOT NULL
    )";

pub struct EnrollmentStore;

impl EnrollmentStore {
    pub fn create(conn: &rusqlite::Connection, token: &str, network_id: i64, peer_id: i64) -> CoreResult<EnrollmentToken> {
        conn.execute(
            "INSERT INTO enrollment_tokens (token, network_id, peer_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![token, network_id, peer_id, crate::store::unix(std::time::SystemTime::now())],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(sqlite_err, _)
                if sqlite_err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                CoreError::Conflict("peer already has an enrollment token".into())
            },
            e => e.into(),
        })?;
        Self::get(conn, token)
    }

    pub fn get(conn: &rusqlite::Connection, token: &str) -> CoreResult<EnrollmentToken> {
        conn.query_row(
            "SELECT token, network_id, peer_id, created_at FROM enrollment_tokens WHERE token = ?1",
            params![token],
            Self::from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CoreError::NotFound,
            e => e.into(),
        })
    }

    pub fn get_by_peer(conn: &rusqlite::Connection, peer_id: i64) -> CoreResult<EnrollmentToken> {
        conn.query_row(
            "SELECT token, network_id, peer_id, created_at FROM enrollment_tokens WHERE peer_id = ?1",
            params![peer_id],
            Self::from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CoreError::NotFound,
            e => e.into(),
        })
    }

    /// Retires the old token as part of rotation (§4.8 "Token rotation
    /// replaces the token and invalidates the old one"); not used on
    /// redemption — `resolve` is idempotent and never deletes a token.
    pub fn delete(conn: &rusqlite::Connection, token: &str) -> CoreResult<()> {
        conn.execute("DELETE FROM enrollment_tokens WHERE token = ?1", params![token])?;
        Ok(())
    }

    fn from_row(row: &Row) -> Result<EnrollmentToken, rusqlite::Error> {
        let token = row.get(0)?;
        let network_id = row.get(1)?;
        let peer_id = row.get(2)?;
        let created_at: i64 = row.get(3)?;
        Ok(EnrollmentToken {
            token,
            network_id,
            peer_id,
            created_at: UNIX_EPOCH + std::time::Duration::from_secs(created_at as u64),
        })
    }
}
