use crate::error::{CoreError, CoreResult};
use crate::model::{Network, NetworkContents};
use ipnet::Ipv4Net;
use rusqlite::{params, Row};
use std::time::{SystemTime, UNIX_EPOCH};

fn unix_now() -> i64 {
    crate::store::unix(SystemTime::now())
}

pub static CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS networks (
      id          INTEGER PRIMARY KEY,
      name        TEXT NOT NULL UNIQUE,
      cidr        TEXT NOT NULL,
      dns_domain  TEXT NOT NULL,
      created_at  INTEGER NOT NULL,
      updated_at  INTEGER NOT NULL
    )";

pub struct NetworkStore;

impl NetworkStore {
    pub fn create(conn: &rusqlite::Connection, name: &str, cidr: Ipv4Net, dns_domain: &str) -> CoreResult<Network> {
        let now = unix_now();
        conn.execute(
            "INSERT INTO networks (name, cidr, dns_domain, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
            params![name, cidr.to_string(), dns_domain, now],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(sqlite_err, _)
                if sqlite_err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                CoreError::Conflict(format!("network {name} already exists"))
            },
            e => e.into(),
        })?;
        let id = conn.last_insert_rowid();
        Self::get(conn, id)
    }

    pub fn get(conn: &rusqlite::Connection, id: i64) -> CoreResult<Network> {
        conn.query_row(
            "SELECT id, name, cidr, dns_domain, created_at, updated_at FROM networks WHERE id = ?1",
            params![id],
            Self::from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CoreError::NotFound,
            e => e.into(),
        })
    }

    pub fn list(conn: &rusqlite::Connection) -> CoreResult<Vec<Network>> {
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, cidr, dns_domain, created_at, updated_at FROM networks",
        )?;
        let rows = stmt.query_map(params![], Self::from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// §4.5 "CIDR change" — callers must run `validate::check_cidr_change_allowed`
    /// against a `World` snapshot first; this just persists the new prefix.
    pub fn update_cidr(conn: &rusqlite::Connection, id: i64, cidr: Ipv4Net) -> CoreResult<Network> {
        conn.execute(
            "UPDATE networks SET cidr = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, cidr.to_string(), unix_now()],
        )?;
        Self::get(conn, id)
    }

    pub fn update_dns_domain(conn: &rusqlite::Connection, id: i64, dns_domain: &str) -> CoreResult<Network> {
        conn.execute(
            "UPDATE networks SET dns_domain = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, dns_domain, unix_now()],
        )?;
        Self::get(conn, id)
    }

    /// Deletion cascades to peers, groups, policies, routes, DNS mappings
    /// and incidents (§3 Ownership summary) via `ON DELETE CASCADE` on
    /// every child table's `network_id` foreign key.
    pub fn delete(conn: &rusqlite::Connection, id: i64) -> CoreResult<()> {
        conn.execute("DELETE FROM networks WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn from_row(row: &Row) -> Result<Network, rusqlite::Error> {
        let id = row.get(0)?;
        let name = row.get(1)?;
        let cidr: String = row.get(2)?;
        let cidr: Ipv4Net = cidr
            .parse()
            .map_err(|_| rusqlite::Error::ExecuteReturnedResults)?;
        let dns_domain = row.get(3)?;
        let created_at: i64 = row.get(4)?;
        let updated_at: i64 = row.get(5)?;
        Ok(Network {
            id,
            contents: NetworkContents {
                name,
                cidr,
                dns_domain,
                created_at: UNIX_EPOCH + std::time::Duration::from_secs(created_at as u64),
                updated_at: UNIX_EPOCH + std::time::Duration::from_secs(updated_at as u64),
            },
        })
    }
}
