use crate::error::{CoreError, CoreResult};
use crate::model::AgentSession;
use rusqlite::{params, Row};
use std::{collections::HashMap, net::SocketAddr, time::UNIX_EPOCH};

pub static CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS agent_sessions (
      id                    INTEGER PRIMARY KEY,
      peer_id               INTEGER NOT NULL UNIQUE REFERENCES peers(id) ON DELETE CASCADE,
      hostname              TEXT NOT NULL,
      system_uptime_secs    INTEGER NOT NULL,
      wireguard_uptime_secs INTEGER NOT NULL,
      nat_endpoint          TEXT,
      peer_endpoints        TEXT NOT NULL DEFAULT '{}',
      first_seen            INTEGER NOT NULL,
      last_seen             INTEGER NOT NULL
    )";

/// One row per observed change of a peer's NAT-visible endpoint (§3, §4.7
/// detector B feeds off this table's recent row count).
pub static CREATE_ENDPOINT_CHANGE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS endpoint_changes (
      id         INTEGER PRIMARY KEY,
      peer_id    INTEGER NOT NULL REFERENCES peers(id) ON DELETE CASCADE,
      endpoint   TEXT NOT NULL,
      changed_at INTEGER NOT NULL
    )";

pub struct AgentSessionStore;

impl AgentSessionStore {
    /// Upserts the session row for `peer_id` on every heartbeat (§4.6
    /// "created on first heartbeat... updated on every heartbeat").
    pub fn upsert_heartbeat(
        conn: &rusqlite::Connection,
        peer_id: i64,
        hostname: &str,
        system_uptime_secs: u64,
        wireguard_uptime_secs: u64,
        nat_endpoint: Option<&SocketAddr>,
        peer_endpoints: &HashMap<String, SocketAddr>,
    ) -> CoreResult<AgentSession> {
        let now = crate::store::unix(std::time::SystemTime::now());
        let peer_endpoints_json = serde_json::to_string(
            &peer_endpoints
                .iter()
                .map(|(k, v)| (k.clone(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        )
        .map_err(|e| CoreError::Validation(e.to_string()))?;

        conn.execute(
            "INSERT INTO agent_sessions (peer_id, hostname, system_uptime_secs, wireguard_uptime_secs,
                nat_endpoint, peer_endpoints, first_seen, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(peer_id) DO UPDATE SET
                hostname = excluded.hostname,
                system_uptime_secs = excluded.system_uptime_secs,
                wireguard_uptime_secs = excluded.wireguard_uptime_secs,
                nat_endpoint = excluded.nat_endpoint,
                peer_endpoints = excluded.peer_endpoints,
                last_seen = excluded.last_seen",
            params![
                peer_id,
                hostname,
                system_uptime_secs as i64,
                wireguard_uptime_secs as i64,
                nat_endpoint.map(ToString::to_string),
                peer_endpoints_json,
                now,
            ],
        )?;

        Self::get_by_peer(conn, peer_id)
    }

    pub fn get_by_peer(conn: &rusqlite::Connection, peer_id: i64) -> CoreResult<AgentSession> {
        conn.query_row(
            "SELECT id, peer_id, hostname, system_uptime_secs, wireguard_uptime_secs,
                nat_endpoint, peer_endpoints, first_seen, last_seen
             FROM agent_sessions WHERE peer_id = ?1",
            params![peer_id],
            Self::from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CoreError::NotFound,
            e => e.into(),
        })
    }

    pub fn list_by_network(conn: &rusqlite::Connection, network_id: i64) -> CoreResult<Vec<AgentSession>> {
        let mut stmt = conn.prepare_cached(
            "SELECT agent_sessions.id, agent_sessions.peer_id, hostname, system_uptime_secs,
                wireguard_uptime_secs, nat_endpoint, peer_endpoints, first_seen, last_seen
             FROM agent_sessions JOIN peers ON peers.id = agent_sessions.peer_id
             WHERE peers.network_id = ?1",
        )?;
        let rows = stmt.query_map(params![network_id], Self::from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn delete_by_peer(conn: &rusqlite::Connection, peer_id: i64) -> CoreResult<()> {
        conn.execute("DELETE FROM agent_sessions WHERE peer_id = ?1", params![peer_id])?;
        Ok(())
    }

    pub fn record_endpoint_change(conn: &rusqlite::Connection, peer_id: i64, endpoint: &SocketAddr) -> CoreResult<()> {
        conn.execute(
            "INSERT INTO endpoint_changes (peer_id, endpoint, changed_at) VALUES (?1, ?2, ?3)",
            params![peer_id, endpoint.to_string(), crate::store::unix(std::time::SystemTime::now())],
        )?;
        Ok(())
    }

    /// Count of endpoint changes for `peer_id` in the trailing `window_secs`
    /// — feeds detector B's "suspicious activity" threshold (§4.7).
    pub fn endpoint_change_count_since(
        conn: &rusqlite::Connection,
        peer_id: i64,
        window_secs: u64,
    ) -> CoreResult<u32> {
        let since = crate::store::unix(std::time::SystemTime::now()) - window_secs as i64;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM endpoint_changes WHERE peer_id = ?1 AND changed_at >= ?2",
            params![peer_id, since],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    fn from_row(row: &Row) -> Result<AgentSession, rusqlite::Error> {
        let id = row.get(0)?;
        let peer_id = row.get(1)?;
        let hostname = row.get(2)?;
        let system_uptime_secs: i64 = row.get(3)?;
        let wireguard_uptime_secs: i64 = row.get(4)?;
        let nat_endpoint: Option<String> = row.get(5)?;
        let nat_endpoint = nat_endpoint.and_then(|e| e.parse().ok());
        let peer_endpoints_json: String = row.get(6)?;
        let peer_endpoints: HashMap<String, String> =
            serde_json::from_str(&peer_endpoints_json).unwrap_or_default();
        let peer_endpoints = peer_endpoints
            .into_iter()
            .filter_map(|(k, v)| v.parse().ok().map(|addr| (k, addr)))
            .collect();
        let first_seen: i64 = row.get(7)?;
        let last_seen: i64 = row.get(8)?;
        Ok(AgentSession {
            id,
            peer_id,
            hostname,
            system_uptime_secs: system_uptime_secs as u64,
            wireguard_uptime_secs: wireguard_uptime_secs as u64,
            nat_endpoint,
            peer_endpoints,
            first_seen: UNIX_EPOCH + std::time::Duration::from_secs(first_seen as u64),
            last_seen: UNIX_EPOCH + std::time::Duration::from_secs(last_seen as u64),
        })
    }
}
