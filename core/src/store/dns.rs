use crate::error::{CoreError, CoreResult};
use crate::model::DnsMapping;
use rusqlite::{params, Row};
use std::net::Ipv4Addr;

pub static CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS dns_mappings (
      id       INTEGER PRIMARY KEY,
      route_id INTEGER NOT NULL REFERENCES routes(id) ON DELETE CASCADE,
      name     TEXT NOT NULL,
      ip       TEXT NOT NULL,
      UNIQUE(route_id, name)
    )";

pub struct DnsMappingStore;

impl DnsMappingStore {
    pub fn create(conn: &rusqlite::Connection, route_id: i64, name: &str, ip: Ipv4Addr) -> CoreResult<DnsMapping> {
        conn.execute(
            "INSERT INTO dns_mappings (route_id, name, ip) VALUES (?1, ?2, ?3)",
            params![route_id, name, ip.to_string()],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(sqlite_err, _)
                if sqlite_err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                CoreError::Conflict(format!("dns mapping {name} already exists on this route"))
            },
            e => e.into(),
        })?;
        let id = conn.last_insert_rowid();
        Self::get(conn, id)
    }

    pub fn get(conn: &rusqlite::Connection, id: i64) -> CoreResult<DnsMapping> {
        conn.query_row(
            "SELECT id, route_id, name, ip FROM dns_mappings WHERE id = ?1",
            params![id],
            Self::from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CoreError::NotFound,
            e => e.into(),
        })
    }

    pub fn list_by_route(conn: &rusqlite::Connection, route_id: i64) -> CoreResult<Vec<DnsMapping>> {
        let mut stmt = conn.prepare_cached("SELECT id, route_id, name, ip FROM dns_mappings WHERE route_id = ?1")?;
        let rows = stmt.query_map(params![route_id], Self::from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// All mappings attached to any route in `network_id`, for the
    /// in-range validation check (§4.5) and for synthesizing DNS payloads.
    pub fn list_by_network(conn: &rusqlite::Connection, network_id: i64) -> CoreResult<Vec<DnsMapping>> {
        let mut stmt = conn.prepare_cached(
            "SELECT dns_mappings.id, dns_mappings.route_id, dns_mappings.name, dns_mappings.ip
             FROM dns_mappings JOIN routes ON routes.id = dns_mappings.route_id
             WHERE routes.network_id = ?1",
        )?;
        let rows = stmt.query_map(params![network_id], Self::from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn delete(conn: &rusqlite::Connection, id: i64) -> CoreResult<()> {
        conn.execute("DELETE FROM dns_mappings WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn from_row(row: &Row) -> Result<DnsMapping, rusqlite::Error> {
        let id = row.get(0)?;
        let route_id = row.get(1)?;
        let name = row.get(2)?;
        let ip: String = row.get(3)?;
        let ip: Ipv4Addr = ip.parse().map_err(|_| rusqlite::Error::ExecuteReturnedResults)?;
        Ok(DnsMapping { id, route_id, name, ip })
    }
}
