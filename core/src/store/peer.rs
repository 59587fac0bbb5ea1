use crate::error::{CoreError, CoreResult};
use crate::model::{Peer, PeerContents, PeerSecret};
use ipnet::Ipv4Net;
use rusqlite::{params, Row};
use std::{net::Ipv4Addr, time::UNIX_EPOCH};

pub static CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS peers (
      id                       INTEGER PRIMARY KEY,
      network_id               INTEGER NOT NULL REFERENCES networks(id) ON DELETE CASCADE,
      name                     TEXT NOT NULL,
      public_key               TEXT NOT NULL,
      address                  TEXT NOT NULL,
      endpoint                 TEXT,
      listen_port              INTEGER,
      is_jump                  INTEGER NOT NULL DEFAULT 0,
      use_agent                INTEGER NOT NULL DEFAULT 1,
      nat_forwarding_interface TEXT,
      owner_id                 TEXT,
      extra_allowed_ips        TEXT NOT NULL DEFAULT '',
      created_at               INTEGER NOT NULL,
      updated_at               INTEGER NOT NULL,
      UNIQUE(network_id, public_key),
      UNIQUE(network_id, address)
    )";

/// Private keys live in their own table so a `SELECT *`-style query over
/// `peers` can never accidentally leak one (§3 Peer invariant: "private
/// kept only in outbound config messages").
pub static CREATE_SECRET_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS peer_secrets (
      peer_id     INTEGER PRIMARY KEY REFERENCES peers(id) ON DELETE CASCADE,
      private_key TEXT NOT NULL
    )";

pub struct PeerStore;

impl PeerStore {
    pub fn create(
        conn: &rusqlite::Connection,
        contents: PeerContents,
        private_key: &str,
    ) -> CoreResult<Peer> {
        let PeerContents {
            network_id,
            name,
            public_key,
            address,
            endpoint,
            listen_port,
            is_jump,
            use_agent,
            nat_forwarding_interface,
            owner_id,
            extra_allowed_ips,
            created_at,
            updated_at,
        } = &contents;

        if *is_jump && (listen_port.is_none() || endpoint.is_none()) {
            return Err(CoreError::Validation(
                "a jump peer requires a listen port and an endpoint".into(),
            ));
        }

        conn.execute(
            "INSERT INTO peers (network_id, name, public_key, address, endpoint, listen_port,
                is_jump, use_agent, nat_forwarding_interface, owner_id, extra_allowed_ips,
                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                network_id,
                name,
                public_key,
                address.to_string(),
                endpoint.as_ref().map(ToString::to_string),
                listen_port,
                is_jump,
                use_agent,
                nat_forwarding_interface,
                owner_id,
                encode_cidr_list(extra_allowed_ips),
                crate::store::unix(*created_at),
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(sqlite_err, _)
                if sqlite_err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                CoreError::Conflict("peer public key or address already in use on this network".into())
            },
            e => e.into(),
        })?;
        let id = conn.last_insert_rowid();

        conn.execute(
            "INSERT INTO peer_secrets (peer_id, private_key) VALUES (?1, ?2)",
            params![id, private_key],
        )?;

        let _ = updated_at;
        Self::get(conn, id)
    }

    pub fn get(conn: &rusqlite::Connection, id: i64) -> CoreResult<Peer> {
        conn.query_row(
            "SELECT id, network_id, name, public_key, address, endpoint, listen_port, is_jump,
                use_agent, nat_forwarding_interface, owner_id, extra_allowed_ips, created_at, updated_at
             FROM peers WHERE id = ?1",
            params![id],
            Self::from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CoreError::NotFound,
            e => e.into(),
        })
    }

    pub fn get_private_key(conn: &rusqlite::Connection, peer_id: i64) -> CoreResult<String> {
        conn.query_row(
            "SELECT private_key FROM peer_secrets WHERE peer_id = ?1",
            params![peer_id],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CoreError::NotFound,
            e => e.into(),
        })
    }

    pub fn list_by_network(conn: &rusqlite::Connection, network_id: i64) -> CoreResult<Vec<Peer>> {
        let mut stmt = conn.prepare_cached(
            "SELECT id, network_id, name, public_key, address, endpoint, listen_port, is_jump,
                use_agent, nat_forwarding_interface, owner_id, extra_allowed_ips, created_at, updated_at
             FROM peers WHERE network_id = ?1",
        )?;
        let rows = stmt.query_map(params![network_id], Self::from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Updates the mutable fields of a peer: name, endpoint, listen port,
    /// NAT-forwarding interface, owner and extra allowed IPs. Address,
    /// public key and network are immutable after creation (mirrors the
    /// teacher's `DatabasePeer::update`, which disregards any requested
    /// change to those fields "for security reasons").
    pub fn update(conn: &rusqlite::Connection, id: i64, contents: PeerContents) -> CoreResult<Peer> {
        conn.execute(
            "UPDATE peers SET name = ?2, endpoint = ?3, listen_port = ?4,
                nat_forwarding_interface = ?5, owner_id = ?6, extra_allowed_ips = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                id,
                contents.name,
                contents.endpoint.as_ref().map(ToString::to_string),
                contents.listen_port,
                contents.nat_forwarding_interface,
                contents.owner_id,
                encode_cidr_list(&contents.extra_allowed_ips),
                crate::store::unix(std::time::SystemTime::now()),
            ],
        )?;
        Self::get(conn, id)
    }

    pub fn delete(conn: &rusqlite::Connection, id: i64) -> CoreResult<()> {
        conn.execute("DELETE FROM peers WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn from_row(row: &Row) -> Result<Peer, rusqlite::Error> {
        let id = row.get(0)?;
        let network_id = row.get(1)?;
        let name = row.get(2)?;
        let public_key = row.get(3)?;
        let address: String = row.get(4)?;
        let address: Ipv4Addr = address
            .parse()
            .map_err(|_| rusqlite::Error::ExecuteReturnedResults)?;
        let endpoint: Option<String> = row.get(5)?;
        let endpoint = endpoint.and_then(|e| e.parse().ok());
        let listen_port = row.get(6)?;
        let is_jump = row.get(7)?;
        let use_agent = row.get(8)?;
        let nat_forwarding_interface = row.get(9)?;
        let owner_id = row.get(10)?;
        let extra_allowed_ips: String = row.get(11)?;
        let created_at: i64 = row.get(12)?;
        let updated_at: i64 = row.get(13)?;
        Ok(Peer {
            id,
            contents: PeerContents {
                network_id,
                name,
                public_key,
                address,
                endpoint,
                listen_port,
                is_jump,
                use_agent,
                nat_forwarding_interface,
                owner_id,
                extra_allowed_ips: decode_cidr_list(&extra_allowed_ips),
                created_at: UNIX_EPOCH + std::time::Duration::from_secs(created_at as u64),
                updated_at: UNIX_EPOCH + std::time::Duration::from_secs(updated_at as u64),
            },
        })
    }
}

fn encode_cidr_list(cidrs: &[Ipv4Net]) -> String {
    cidrs.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

fn decode_cidr_list(s: &str) -> Vec<Ipv4Net> {
    if s.is_empty() {
        return vec![];
    }
    s.split(',').filter_map(|part| part.parse().ok()).collect()
}
