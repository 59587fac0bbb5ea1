use crate::error::CoreResult;
use crate::model::PresharedKey;
use rand::RngCore;
use rusqlite::params;

pub static CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS preshared_keys (
      peer_a INTEGER NOT NULL REFERENCES peers(id) ON DELETE CASCADE,
      peer_b INTEGER NOT NULL REFERENCES peers(id) ON DELETE CASCADE,
      key    TEXT NOT NULL,
      PRIMARY KEY (peer_a, peer_b)
    )";

pub struct PresharedKeyStore;

impl PresharedKeyStore {
    /// Created lazily on first need and memoized until either peer is
    /// deleted (cascade via the foreign keys above handles the deletion
    /// side); retrieving it is idempotent (§3, §8 "Preshared key for (A,B)
    /// equals that for (B,A)... stable across calls").
    pub fn get_or_create(conn: &rusqlite::Connection, a: i64, b: i64) -> CoreResult<PresharedKey> {
        let (peer_a, peer_b) = PresharedKey::pair_key(a, b);

        if let Some(existing) = conn
            .query_row(
                "SELECT key FROM preshared_keys WHERE peer_a = ?1 AND peer_b = ?2",
                params![peer_a, peer_b],
                |row| row.get::<_, String>(0),
            )
            .ok()
        {
            return Ok(PresharedKey {
                peer_a,
                peer_b,
                key: existing,
            });
        }

        let key = generate_key();
        conn.execute(
            "INSERT INTO preshared_keys (peer_a, peer_b, key) VALUES (?1, ?2, ?3)",
            params![peer_a, peer_b, key],
        )?;

        Ok(PresharedKey { peer_a, peer_b, key })
    }
}

fn generate_key() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memdb() -> rusqlite::Connection {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(&format!(
            "{};{};{}",
            super::super::network::CREATE_TABLE_SQL,
            super::super::peer::CREATE_TABLE_SQL,
            CREATE_TABLE_SQL
        ))
        .unwrap();
        conn
    }

    #[test]
    fn psk_is_symmetric_and_stable() {
        let conn = memdb();
        let first = PresharedKeyStore::get_or_create(&conn, 5, 9).unwrap();
        let second = PresharedKeyStore::get_or_create(&conn, 9, 5).unwrap();
        assert_eq!(first.key, second.key);
    }
}
