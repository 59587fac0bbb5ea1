use crate::error::{CoreError, CoreResult};
use crate::model::{Endpoint, IncidentKind, SecurityIncident};
use rusqlite::{params, Row};
use std::time::UNIX_EPOCH;

pub static CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS incidents (
      id           INTEGER PRIMARY KEY,
      peer_id      INTEGER NOT NULL REFERENCES peers(id) ON DELETE CASCADE,
      network_id   INTEGER NOT NULL REFERENCES networks(id) ON DELETE CASCADE,
      kind         TEXT NOT NULL,
      detected_at  INTEGER NOT NULL,
      public_key   TEXT NOT NULL,
      endpoints    TEXT NOT NULL DEFAULT '[]',
      detail       TEXT NOT NULL DEFAULT '',
      resolved     INTEGER NOT NULL DEFAULT 0,
      resolved_by  TEXT,
      resolved_at  INTEGER
    )";

pub struct IncidentStore;

impl IncidentStore {
    /// Incidents are additive — always an insert, never an update-in-place
    /// (§3 "remains until an administrator resolves it... additive").
    pub fn record(
        conn: &rusqlite::Connection,
        peer_id: i64,
        network_id: i64,
        kind: IncidentKind,
        public_key: &str,
        endpoints: &[Endpoint],
        detail: &str,
    ) -> CoreResult<SecurityIncident> {
        let kind_str = kind_to_str(kind);
        let endpoints_json = serde_json::to_string(&endpoints.iter().map(ToString::to_string).collect::<Vec<_>>())
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        conn.execute(
            "INSERT INTO incidents (peer_id, network_id, kind, detected_at, public_key, endpoints, detail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                peer_id,
                network_id,
                kind_str,
                crate::store::unix(std::time::SystemTime::now()),
                public_key,
                endpoints_json,
                detail,
            ],
        )?;
        Self::get(conn, conn.last_insert_rowid())
    }

    pub fn get(conn: &rusqlite::Connection, id: i64) -> CoreResult<SecurityIncident> {
        conn.query_row(
            "SELECT id, peer_id, network_id, kind, detected_at, public_key, endpoints, detail,
                resolved, resolved_by, resolved_at
             FROM incidents WHERE id = ?1",
            params![id],
            Self::from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CoreError::NotFound,
            e => e.into(),
        })
    }

    pub fn list_by_network(conn: &rusqlite::Connection, network_id: i64, unresolved_only: bool) -> CoreResult<Vec<SecurityIncident>> {
        let sql = if unresolved_only {
            "SELECT id, peer_id, network_id, kind, detected_at, public_key, endpoints, detail,
                resolved, resolved_by, resolved_at
             FROM incidents WHERE network_id = ?1 AND resolved = 0"
        } else {
            "SELECT id, peer_id, network_id, kind, detected_at, public_key, endpoints, detail,
                resolved, resolved_by, resolved_at
             FROM incidents WHERE network_id = ?1"
        };
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params![network_id], Self::from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn resolve(conn: &rusqlite::Connection, id: i64, resolved_by: &str) -> CoreResult<SecurityIncident> {
        conn.execute(
            "UPDATE incidents SET resolved = 1, resolved_by = ?2, resolved_at = ?3 WHERE id = ?1",
            params![id, resolved_by, crate::store::unix(std::time::SystemTime::now())],
        )?;
        Self::get(conn, id)
    }

    fn from_row(row: &Row) -> Result<SecurityIncident, rusqlite::Error> {
        let id = row.get(0)?;
        let peer_id = row.get(1)?;
        let network_id = row.get(2)?;
        let kind: String = row.get(3)?;
        let kind = str_to_kind(&kind);
        let detected_at: i64 = row.get(4)?;
        let public_key = row.get(5)?;
        let endpoints_json: String = row.get(6)?;
        let endpoints: Vec<String> = serde_json::from_str(&endpoints_json).unwrap_or_default();
        let endpoints = endpoints.into_iter().filter_map(|e| e.parse().ok()).collect();
        let detail = row.get(7)?;
        let resolved: bool = row.get(8)?;
        let resolved_by = row.get(9)?;
        let resolved_at: Option<i64> = row.get(10)?;
        Ok(SecurityIncident {
            id,
            peer_id,
            network_id,
            kind,
            detected_at: UNIX_EPOCH + std::time::Duration::from_secs(detected_at as u64),
            public_key,
            endpoints,
            detail,
            resolved,
            resolved_by,
            resolved_at: resolved_at.map(|t| UNIX_EPOCH + std::time::Duration::from_secs(t as u64)),
        })
    }
}

fn kind_to_str(kind: IncidentKind) -> &'static str {
    match kind {
        IncidentKind::SharedConfig => "shared_config",
        IncidentKind::SessionConflict => "session_conflict",
        IncidentKind::SuspiciousActivity => "suspicious_activity",
    }
}

fn str_to_kind(s: &str) -> IncidentKind {
    match s {
        "shared_config" => IncidentKind::SharedConfig,
        "session_conflict" => IncidentKind::SessionConflict,
        _ => IncidentKind::SuspiciousActivity,
    }
}
