use crate::error::{CoreError, CoreResult};
use crate::model::{Group, DEFAULT_GROUP_PRIORITY};
use rusqlite::params;
use std::collections::HashSet;

pub static CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS groups (
      id          INTEGER PRIMARY KEY,
      network_id  INTEGER NOT NULL REFERENCES networks(id) ON DELETE CASCADE,
      name        TEXT NOT NULL,
      priority    INTEGER NOT NULL,
      description TEXT NOT NULL DEFAULT '',
      created_at  INTEGER NOT NULL,
      UNIQUE(network_id, name)
    )";

pub static CREATE_MEMBERSHIP_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS group_peers (
      group_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
      peer_id  INTEGER NOT NULL REFERENCES peers(id) ON DELETE CASCADE,
      PRIMARY KEY (group_id, peer_id)
    )";

pub static CREATE_POLICY_ATTACHMENT_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS group_policies (
      group_id    INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
      policy_id   INTEGER NOT NULL REFERENCES policies(id) ON DELETE CASCADE,
      attach_order INTEGER NOT NULL,
      PRIMARY KEY (group_id, policy_id)
    )";

pub static CREATE_ROUTE_ATTACHMENT_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS group_routes (
      group_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
      route_id INTEGER NOT NULL REFERENCES routes(id) ON DELETE CASCADE,
      PRIMARY KEY (group_id, route_id)
    )";

pub struct GroupStore;

impl GroupStore {
    pub fn create(
        conn: &rusqlite::Connection,
        network_id: i64,
        name: &str,
        priority: Option<u16>,
        description: &str,
    ) -> CoreResult<Group> {
        let priority = priority.unwrap_or(DEFAULT_GROUP_PRIORITY);
        conn.execute(
            "INSERT INTO groups (network_id, name, priority, description, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![network_id, name, priority, description, crate::store::unix(std::time::SystemTime::now())],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(sqlite_err, _)
                if sqlite_err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                CoreError::Conflict(format!("group {name} already exists in this network"))
            },
            e => e.into(),
        })?;
        let id = conn.last_insert_rowid();
        Self::get(conn, id)
    }

    pub fn get(conn: &rusqlite::Connection, id: i64) -> CoreResult<Group> {
        let (network_id, name, priority, description, created_at): (i64, String, u16, String, i64) = conn
            .query_row(
                "SELECT network_id, name, priority, description, created_at FROM groups WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => CoreError::NotFound,
                e => e.into(),
            })?;

        let peer_ids = Self::member_ids(conn, id)?;
        let policy_ids = Self::policy_ids(conn, id)?;
        let route_ids = Self::route_ids(conn, id)?;

        Ok(Group {
            id,
            network_id,
            name,
            priority,
            description,
            created_at: std::time::UNIX_EPOCH + std::time::Duration::from_secs(created_at as u64),
            peer_ids,
            policy_ids,
            route_ids,
        })
    }

    pub fn list_by_network(conn: &rusqlite::Connection, network_id: i64) -> CoreResult<Vec<Group>> {
        let mut stmt = conn.prepare_cached("SELECT id FROM groups WHERE network_id = ?1")?;
        let ids: Vec<i64> = stmt
            .query_map(params![network_id], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        ids.into_iter().map(|id| Self::get(conn, id)).collect()
    }

    /// All groups containing `peer_id`, for the synthesizer's reachability
    /// pass (§4.3 "list-groups-containing-peer").
    pub fn list_containing_peer(conn: &rusqlite::Connection, peer_id: i64) -> CoreResult<Vec<Group>> {
        let mut stmt = conn.prepare_cached(
            "SELECT group_id FROM group_peers WHERE peer_id = ?1",
        )?;
        let ids: Vec<i64> = stmt
            .query_map(params![peer_id], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        ids.into_iter().map(|id| Self::get(conn, id)).collect()
    }

    pub fn add_peer(conn: &rusqlite::Connection, group_id: i64, peer_id: i64) -> CoreResult<()> {
        conn.execute(
            "INSERT OR IGNORE INTO group_peers (group_id, peer_id) VALUES (?1, ?2)",
            params![group_id, peer_id],
        )?;
        Ok(())
    }

    pub fn remove_peer(conn: &rusqlite::Connection, group_id: i64, peer_id: i64) -> CoreResult<()> {
        conn.execute(
            "DELETE FROM group_peers WHERE group_id = ?1 AND peer_id = ?2",
            params![group_id, peer_id],
        )?;
        Ok(())
    }

    pub fn attach_policy(conn: &rusqlite::Connection, group_id: i64, policy_id: i64) -> CoreResult<()> {
        let next_order: i64 = conn.query_row(
            "SELECT COALESCE(MAX(attach_order), -1) + 1 FROM group_policies WHERE group_id = ?1",
            params![group_id],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO group_policies (group_id, policy_id, attach_order) VALUES (?1, ?2, ?3)",
            params![group_id, policy_id, next_order],
        )?;
        Ok(())
    }

    pub fn detach_policy(conn: &rusqlite::Connection, group_id: i64, policy_id: i64) -> CoreResult<()> {
        conn.execute(
            "DELETE FROM group_policies WHERE group_id = ?1 AND policy_id = ?2",
            params![group_id, policy_id],
        )?;
        Ok(())
    }

    pub fn attach_route(conn: &rusqlite::Connection, group_id: i64, route_id: i64) -> CoreResult<()> {
        conn.execute(
            "INSERT OR IGNORE INTO group_routes (group_id, route_id) VALUES (?1, ?2)",
            params![group_id, route_id],
        )?;
        Ok(())
    }

    pub fn detach_route(conn: &rusqlite::Connection, group_id: i64, route_id: i64) -> CoreResult<()> {
        conn.execute(
            "DELETE FROM group_routes WHERE group_id = ?1 AND route_id = ?2",
            params![group_id, route_id],
        )?;
        Ok(())
    }

    pub fn delete(conn: &rusqlite::Connection, id: i64) -> CoreResult<()> {
        conn.execute("DELETE FROM groups WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn member_ids(conn: &rusqlite::Connection, group_id: i64) -> CoreResult<HashSet<i64>> {
        let mut stmt = conn.prepare_cached("SELECT peer_id FROM group_peers WHERE group_id = ?1")?;
        let ids = stmt.query_map(params![group_id], |row| row.get(0))?;
        Ok(ids.collect::<Result<_, _>>()?)
    }

    fn policy_ids(conn: &rusqlite::Connection, group_id: i64) -> CoreResult<Vec<i64>> {
        let mut stmt = conn.prepare_cached(
            "SELECT policy_id FROM group_policies WHERE group_id = ?1 ORDER BY attach_order",
        )?;
        let ids = stmt.query_map(params![group_id], |row| row.get(0))?;
        Ok(ids.collect::<Result<_, _>>()?)
    }

    fn route_ids(conn: &rusqlite::Connection, group_id: i64) -> CoreResult<HashSet<i64>> {
        let mut stmt = conn.prepare_cached("SELECT route_id FROM group_routes WHERE group_id = ?1")?;
        let ids = stmt.query_map(params![group_id], |row| row.get(0))?;
        Ok(ids.collect::<Result<_, _>>()?)
    }
}
