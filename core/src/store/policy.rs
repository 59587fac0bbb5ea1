use crate::error::{CoreError, CoreResult};
use crate::model::{Direction, Policy, PolicyRule, RuleAction, RuleTarget};
use ipnet::Ipv4Net;
use rusqlite::params;

pub static CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS policies (
      id         INTEGER PRIMARY KEY,
      network_id INTEGER NOT NULL REFERENCES networks(id) ON DELETE CASCADE,
      name       TEXT NOT NULL,
      UNIQUE(network_id, name)
    )";

pub static CREATE_RULE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS policy_rules (
      id          INTEGER PRIMARY KEY,
      policy_id   INTEGER NOT NULL REFERENCES policies(id) ON DELETE CASCADE,
      direction   TEXT NOT NULL,
      action      TEXT NOT NULL,
      target_kind TEXT NOT NULL,
      target_cidr TEXT,
      target_id   INTEGER,
      rule_order  INTEGER NOT NULL
    )";

pub struct PolicyStore;

impl PolicyStore {
    pub fn create(conn: &rusqlite::Connection, network_id: i64, name: &str) -> CoreResult<Policy> {
        conn.execute(
            "INSERT INTO policies (network_id, name) VALUES (?1, ?2)",
            params![network_id, name],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(sqlite_err, _)
                if sqlite_err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                CoreError::Conflict(format!("policy {name} already exists in this network"))
            },
            e => e.into(),
        })?;
        let id = conn.last_insert_rowid();
        Self::get(conn, id)
    }

    pub fn get(conn: &rusqlite::Connection, id: i64) -> CoreResult<Policy> {
        let (network_id, name): (i64, String) = conn
            .query_row(
                "SELECT network_id, name FROM policies WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => CoreError::NotFound,
                e => e.into(),
            })?;
        let rules = Self::rules(conn, id)?;
        Ok(Policy { id, network_id, name, rules })
    }

    pub fn list_by_network(conn: &rusqlite::Connection, network_id: i64) -> CoreResult<Vec<Policy>> {
        let mut stmt = conn.prepare_cached("SELECT id FROM policies WHERE network_id = ?1")?;
        let ids: Vec<i64> = stmt
            .query_map(params![network_id], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        ids.into_iter().map(|id| Self::get(conn, id)).collect()
    }

    /// Replaces the full rule list for a policy in one transaction-free
    /// delete-then-insert sweep (rules have no identity of their own outside
    /// their policy — callers always submit the whole ordered list, §4.4).
    pub fn set_rules(conn: &rusqlite::Connection, policy_id: i64, rules: &[PolicyRule]) -> CoreResult<()> {
        conn.execute("DELETE FROM policy_rules WHERE policy_id = ?1", params![policy_id])?;
        for rule in rules {
            let direction = match rule.direction {
                Direction::Input => "input",
                Direction::Output => "output",
            };
            let action = match rule.action {
                RuleAction::Allow => "allow",
                RuleAction::Deny => "deny",
            };
            let (target_kind, target_cidr, target_id): (&str, Option<String>, Option<i64>) = match &rule.target {
                RuleTarget::Cidr(cidr) => ("cidr", Some(cidr.to_string()), None),
                RuleTarget::Peer(id) => ("peer", None, Some(*id)),
                RuleTarget::Group(id) => ("group", None, Some(*id)),
            };
            conn.execute(
                "INSERT INTO policy_rules (policy_id, direction, action, target_kind, target_cidr, target_id, rule_order)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![policy_id, direction, action, target_kind, target_cidr, target_id, rule.rule_order],
            )?;
        }
        Ok(())
    }

    pub fn delete(conn: &rusqlite::Connection, id: i64) -> CoreResult<()> {
        conn.execute("DELETE FROM policies WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn rules(conn: &rusqlite::Connection, policy_id: i64) -> CoreResult<Vec<PolicyRule>> {
        let mut stmt = conn.prepare_cached(
            "SELECT direction, action, target_kind, target_cidr, target_id, rule_order
             FROM policy_rules WHERE policy_id = ?1 ORDER BY rule_order",
        )?;
        let rows = stmt.query_map(params![policy_id], |row| {
            let direction: String = row.get(0)?;
            let action: String = row.get(1)?;
            let target_kind: String = row.get(2)?;
            let target_cidr: Option<String> = row.get(3)?;
            let target_id: Option<i64> = row.get(4)?;
            let rule_order: i32 = row.get(5)?;
            Ok((direction, action, target_kind, target_cidr, target_id, rule_order))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (direction, action, target_kind, target_cidr, target_id, rule_order) = row?;
            let direction = match direction.as_str() {
                "input" => Direction::Input,
                _ => Direction::Output,
            };
            let action = match action.as_str() {
                "allow" => RuleAction::Allow,
                _ => RuleAction::Deny,
            };
            let target = match target_kind.as_str() {
                "cidr" => {
                    let cidr: Ipv4Net = target_cidr
                        .ok_or(rusqlite::Error::ExecuteReturnedResults)?
                        .parse()
                        .map_err(|_| rusqlite::Error::ExecuteReturnedResults)?;
                    RuleTarget::Cidr(cidr)
                },
                "peer" => RuleTarget::Peer(target_id.ok_or(rusqlite::Error::ExecuteReturnedResults)?),
                _ => RuleTarget::Group(target_id.ok_or(rusqlite::Error::ExecuteReturnedResults)?),
            };
            out.push(PolicyRule { direction, action, target, rule_order });
        }
        Ok(out)
    }
}
