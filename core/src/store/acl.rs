use crate::error::CoreResult;
use rusqlite::params;
use std::{collections::HashSet, net::Ipv4Addr};

/// Per-network blocking set (§3 Glossary "Blocking set"; §4.7 response to
/// detected incidents) and whitelist set (§4.4 Step 6, captive-portal
/// traversal). Persisted here; the Hub keeps a lock-free `arc-swap`
/// snapshot on top for the read-mostly synthesis path (§9 Design Notes
/// "Shared mutable session map").
pub static CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS blocking_entries (
      network_id INTEGER NOT NULL REFERENCES networks(id) ON DELETE CASCADE,
      ip         TEXT NOT NULL,
      PRIMARY KEY (network_id, ip)
    )";

pub static CREATE_WHITELIST_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS whitelist_entries (
      network_id INTEGER NOT NULL REFERENCES networks(id) ON DELETE CASCADE,
      ip         TEXT NOT NULL,
      PRIMARY KEY (network_id, ip)
    )";

pub struct AclStore;

impl AclStore {
    pub fn block(conn: &rusqlite::Connection, network_id: i64, ip: Ipv4Addr) -> CoreResult<()> {
        conn.execute(
            "INSERT OR IGNORE INTO blocking_entries (network_id, ip) VALUES (?1, ?2)",
            params![network_id, ip.to_string()],
        )?;
        Ok(())
    }

    pub fn unblock(conn: &rusqlite::Connection, network_id: i64, ip: Ipv4Addr) -> CoreResult<()> {
        conn.execute(
            "DELETE FROM blocking_entries WHERE network_id = ?1 AND ip = ?2",
            params![network_id, ip.to_string()],
        )?;
        Ok(())
    }

    pub fn list_blocked(conn: &rusqlite::Connection, network_id: i64) -> CoreResult<HashSet<Ipv4Addr>> {
        let mut stmt = conn.prepare_cached("SELECT ip FROM blocking_entries WHERE network_id = ?1")?;
        let rows = stmt.query_map(params![network_id], |row| row.get::<_, String>(0))?;
        let mut out = HashSet::new();
        for row in rows {
            if let Ok(ip) = row?.parse() {
                out.insert(ip);
            }
        }
        Ok(out)
    }

    pub fn whitelist(conn: &rusqlite::Connection, network_id: i64, ip: Ipv4Addr) -> CoreResult<()> {
        conn.execute(
            "INSERT OR IGNORE INTO whitelist_entries (network_id, ip) VALUES (?1, ?2)",
            params![network_id, ip.to_string()],
        )?;
        Ok(())
    }

    pub fn unwhitelist(conn: &rusqlite::Connection, network_id: i64, ip: Ipv4Addr) -> CoreResult<()> {
        conn.execute(
            "DELETE FROM whitelist_entries WHERE network_id = ?1 AND ip = ?2",
            params![network_id, ip.to_string()],
        )?;
        Ok(())
    }

    pub fn list_whitelisted(conn: &rusqlite::Connection, network_id: i64) -> CoreResult<HashSet<Ipv4Addr>> {
        let mut stmt = conn.prepare_cached("SELECT ip FROM whitelist_entries WHERE network_id = ?1")?;
        let rows = stmt.query_map(params![network_id], |row| row.get::<_, String>(0))?;
        let mut out = HashSet::new();
        for row in rows {
            if let Ok(ip) = row?.parse() {
                out.insert(ip);
            }
        }
        Ok(out)
    }
}
