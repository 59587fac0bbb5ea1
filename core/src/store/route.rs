use crate::error::{CoreError, CoreResult};
use crate::model::Route;
use ipnet::Ipv4Net;
use rusqlite::{params, Row};

pub static CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS routes (
      id               INTEGER PRIMARY KEY,
      network_id       INTEGER NOT NULL REFERENCES networks(id) ON DELETE CASCADE,
      name             TEXT NOT NULL,
      destination_cidr TEXT NOT NULL,
      jump_peer_id     INTEGER NOT NULL REFERENCES peers(id) ON DELETE RESTRICT,
      dns_suffix       TEXT NOT NULL DEFAULT '',
      UNIQUE(network_id, name)
    )";

pub struct RouteStore;

impl RouteStore {
    pub fn create(
        conn: &rusqlite::Connection,
        network_id: i64,
        name: &str,
        destination_cidr: Ipv4Net,
        jump_peer_id: i64,
        dns_suffix: &str,
    ) -> CoreResult<Route> {
        conn.execute(
            "INSERT INTO routes (network_id, name, destination_cidr, jump_peer_id, dns_suffix)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![network_id, name, destination_cidr.to_string(), jump_peer_id, dns_suffix],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(sqlite_err, _)
                if sqlite_err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                CoreError::Conflict(format!("route {name} already exists in this network"))
            },
            e => e.into(),
        })?;
        let id = conn.last_insert_rowid();
        Self::get(conn, id)
    }

    pub fn get(conn: &rusqlite::Connection, id: i64) -> CoreResult<Route> {
        conn.query_row(
            "SELECT id, network_id, name, destination_cidr, jump_peer_id, dns_suffix FROM routes WHERE id = ?1",
            params![id],
            Self::from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CoreError::NotFound,
            e => e.into(),
        })
    }

    pub fn list_by_network(conn: &rusqlite::Connection, network_id: i64) -> CoreResult<Vec<Route>> {
        let mut stmt = conn.prepare_cached(
            "SELECT id, network_id, name, destination_cidr, jump_peer_id, dns_suffix FROM routes WHERE network_id = ?1",
        )?;
        let rows = stmt.query_map(params![network_id], Self::from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Routes that name `jump_peer_id` as their jump peer — used by the
    /// Validation Engine to block deletion of a jump peer still in use
    /// (§4.5 "jump preconditions").
    pub fn list_by_jump_peer(conn: &rusqlite::Connection, jump_peer_id: i64) -> CoreResult<Vec<Route>> {
        let mut stmt = conn.prepare_cached(
            "SELECT id, network_id, name, destination_cidr, jump_peer_id, dns_suffix FROM routes WHERE jump_peer_id = ?1",
        )?;
        let rows = stmt.query_map(params![jump_peer_id], Self::from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn delete(conn: &rusqlite::Connection, id: i64) -> CoreResult<()> {
        conn.execute("DELETE FROM routes WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn from_row(row: &Row) -> Result<Route, rusqlite::Error> {
        let id = row.get(0)?;
        let network_id = row.get(1)?;
        let name = row.get(2)?;
        let destination_cidr: String = row.get(3)?;
        let destination_cidr: Ipv4Net = destination_cidr
            .parse()
            .map_err(|_| rusqlite::Error::ExecuteReturnedResults)?;
        let jump_peer_id = row.get(4)?;
        let dns_suffix = row.get(5)?;
        Ok(Route { id, network_id, name, destination_cidr, jump_peer_id, dns_suffix })
    }
}
