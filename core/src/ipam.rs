//! IPAM (§4.2): collision-free IPv4 address assignment inside a network
//! CIDR, persisted and restart-safe.
//!
//! Grounded on the teacher's CIDR containment/overlap checks in
//! `db::cidr::DatabaseCidr::create` (`shared/.../db/cidr.rs` in the original
//! workspace) and on `ipnet::Ipv4Net::hosts()`, which already excludes the
//! network/broadcast address for prefixes `<= 30` and enumerates every
//! address for `/31` and `/32` — exactly the semantics spec.md asks for.

use crate::error::{CoreError, CoreResult};
use ipnet::Ipv4Net;
use rusqlite::{params, Connection};
use std::net::Ipv4Addr;

pub const CREATE_TABLE_SQL: &str = "CREATE TABLE ipam_allocations (
      network_id  INTEGER NOT NULL,
      prefix_cidr TEXT NOT NULL,
      ip          TEXT NOT NULL,
      UNIQUE(ip)
    )";

/// Returns the numerically lowest address strictly inside `cidr` that is
/// not currently allocated for `network_id`. Fails with `Exhausted` if
/// none exist.
pub fn allocate(conn: &Connection, network_id: i64, cidr: Ipv4Net) -> CoreResult<Ipv4Addr> {
    let allocated = allocated_set(conn, network_id, cidr)?;

    for ip in cidr.hosts() {
        if !allocated.contains(&ip) {
            conn.execute(
                "INSERT INTO ipam_allocations (network_id, prefix_cidr, ip) VALUES (?1, ?2, ?3)",
                params![network_id, cidr.to_string(), ip.to_string()],
            )?;
            return Ok(ip);
        }
    }

    Err(CoreError::Exhausted)
}

/// Idempotent: releasing an address that isn't allocated is not an error.
pub fn release(conn: &Connection, network_id: i64, ip: Ipv4Addr) -> CoreResult<()> {
    conn.execute(
        "DELETE FROM ipam_allocations WHERE network_id = ?1 AND ip = ?2",
        params![network_id, ip.to_string()],
    )?;
    Ok(())
}

/// Reserve a specific IP, used when recreating state from the allocation
/// table on boot. Fails if the IP is outside `cidr` or already allocated.
pub fn reserve(conn: &Connection, network_id: i64, cidr: Ipv4Net, ip: Ipv4Addr) -> CoreResult<()> {
    if !cidr.contains(&ip) {
        return Err(CoreError::Validation(format!(
            "{ip} is not inside {cidr}"
        )));
    }

    let inserted = conn.execute(
        "INSERT OR IGNORE INTO ipam_allocations (network_id, prefix_cidr, ip) VALUES (?1, ?2, ?3)",
        params![network_id, cidr.to_string(), ip.to_string()],
    )?;
    if inserted == 0 {
        return Err(CoreError::Conflict(format!("{ip} is already allocated")));
    }
    Ok(())
}

/// Every address currently allocated for `network_id` inside `cidr`,
/// lowest first — backs the `/ipam` resource's status view.
pub fn list_allocated(conn: &Connection, network_id: i64, cidr: Ipv4Net) -> CoreResult<Vec<Ipv4Addr>> {
    let mut ips: Vec<Ipv4Addr> = allocated_set(conn, network_id, cidr)?.into_iter().collect();
    ips.sort();
    Ok(ips)
}

fn allocated_set(
    conn: &Connection,
    network_id: i64,
    cidr: Ipv4Net,
) -> CoreResult<std::collections::HashSet<Ipv4Addr>> {
    let mut stmt = conn.prepare_cached(
        "SELECT ip FROM ipam_allocations WHERE network_id = ?1 AND prefix_cidr = ?2",
    )?;
    let rows = stmt.query_map(params![network_id, cidr.to_string()], |row| {
        row.get::<_, String>(0)
    })?;
    let mut set = std::collections::HashSet::new();
    for row in rows {
        if let Ok(ip) = row?.parse::<Ipv4Addr>() {
            set.insert(ip);
        }
    }
    Ok(set)
}

/// Computes the smallest prefix whose usable-host count >= `max_peers`, and
/// returns up to `count` non-overlapping sub-CIDRs of that prefix size
/// inside `base_cidr`.
pub fn suggest(base_cidr: Ipv4Net, max_peers: u32, count: usize) -> Vec<Ipv4Net> {
    let needed_prefix = smallest_prefix_for(max_peers);
    if needed_prefix < base_cidr.prefix_len() {
        return vec![];
    }

    base_cidr
        .subnets(needed_prefix)
        .expect("needed_prefix >= base_cidr.prefix_len()")
        .take(count)
        .collect()
}

/// The largest (numerically smallest) prefix length whose usable-host
/// count is >= `max_peers`, clamped to a valid IPv4 prefix.
fn smallest_prefix_for(max_peers: u32) -> u8 {
    for prefix in (0..=32u8).rev() {
        let host_bits = 32 - prefix as u32;
        let usable = if host_bits == 0 {
            1
        } else if host_bits == 1 {
            2
        } else {
            (1u64 << host_bits) as u32 - 2
        };
        if usable >= max_peers {
            return prefix;
        }
    }
    32
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn memdb() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(CREATE_TABLE_SQL, []).unwrap();
        conn
    }

    #[test]
    fn slash_thirty_yields_exactly_two_addresses() {
        let conn = memdb();
        let cidr: Ipv4Net = "10.0.0.0/30".parse().unwrap();

        let a = allocate(&conn, 1, cidr).unwrap();
        let b = allocate(&conn, 1, cidr).unwrap();
        assert_ne!(a, b);

        match allocate(&conn, 1, cidr) {
            Err(CoreError::Exhausted) => {},
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[test]
    fn allocate_returns_lowest_free_address() {
        let conn = memdb();
        let cidr: Ipv4Net = "10.0.0.0/24".parse().unwrap();
        let first = allocate(&conn, 1, cidr).unwrap();
        assert_eq!(first, "10.0.0.1".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn release_then_allocate_returns_same_ip() {
        let conn = memdb();
        let cidr: Ipv4Net = "10.0.0.0/24".parse().unwrap();
        let first = allocate(&conn, 1, cidr).unwrap();
        release(&conn, 1, first).unwrap();
        let second = allocate(&conn, 1, cidr).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn release_is_idempotent() {
        let conn = memdb();
        release(&conn, 1, "10.0.0.1".parse().unwrap()).unwrap();
        release(&conn, 1, "10.0.0.1".parse().unwrap()).unwrap();
    }

    #[test]
    fn reserve_rejects_ip_outside_cidr() {
        let conn = memdb();
        let cidr: Ipv4Net = "10.0.0.0/24".parse().unwrap();
        let err = reserve(&conn, 1, cidr, "10.0.1.5".parse().unwrap()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn reserve_rejects_already_allocated() {
        let conn = memdb();
        let cidr: Ipv4Net = "10.0.0.0/24".parse().unwrap();
        let ip = allocate(&conn, 1, cidr).unwrap();
        let err = reserve(&conn, 1, cidr, ip).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn suggest_returns_non_overlapping_subnets() {
        let base: Ipv4Net = "10.0.0.0/16".parse().unwrap();
        let subnets = suggest(base, 200, 3);
        assert_eq!(subnets.len(), 3);
        for pair in subnets.windows(2) {
            assert!(!pair[0].contains(&pair[1].network()));
        }
        for s in &subnets {
            assert!(base.contains(&s.network()));
        }
    }
}
