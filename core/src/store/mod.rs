//! Data Model Store (§4.3): the persistent CRUD surface for every entity in
//! §3, plus the bulk queries the synthesizer needs.
//!
//! Grounded on the teacher's `server/src/db/*.rs` (`DatabaseCidr`,
//! `DatabasePeer`, `DatabaseAssociation`): `rusqlite` connections, hand
//! written `CREATE TABLE` SQL run once at startup (`db::auto_migrate`),
//! `prepare_cached` queries, and a `from_row` free function per entity.
//!
//! Departure from the teacher: the teacher wraps one shared
//! `Arc<Mutex<Connection>>` for the whole process, which serializes *every*
//! network against every other one. §5 asks for reads concurrent with
//! other reads, and writes serialized only within a network. We keep
//! `rusqlite` (same crate, same SQL style) but hand connections out of an
//! `r2d2` pool and layer a per-network `tokio::sync::RwLock` (see
//! [`NetworkLocks`]) above it — callers take a read guard for store reads
//! and a write guard for the validate-then-write sequence in §4.5/§5.

mod acl;
mod agent_session;
mod dns;
mod enrollment;
mod group;
mod incident;
mod network;
mod peer;
mod policy;
mod psk;
mod route;
mod user;

use dashmap::DashMap;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::sync::Arc;
use tokio::sync::RwLock;

pub use acl::AclStore;
pub use agent_session::AgentSessionStore;
pub use dns::DnsMappingStore;
pub use enrollment::EnrollmentStore;
pub use group::GroupStore;
pub use incident::IncidentStore;
pub use network::NetworkStore;
pub use peer::PeerStore;
pub use policy::PolicyStore;
pub use psk::PresharedKeyStore;
pub use route::RouteStore;
pub use user::UserStore;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type Conn = r2d2::PooledConnection<SqliteConnectionManager>;

pub(crate) fn unix(t: std::time::SystemTime) -> i64 {
    t.duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Per-network coarse lock (§5 "Shared mutable state"). Acquired for
/// reading before the synthesizer runs, and for writing around the
/// Validation Engine + store write. Networks that have never been locked
/// get a fresh, unheld lock on first access — no network needs
/// pre-registration.
#[derive(Clone, Default)]
pub struct NetworkLocks {
    locks: Arc<DashMap<i64, Arc<RwLock<()>>>>,
}

impl NetworkLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, network_id: i64) -> Arc<RwLock<()>> {
        self.locks
            .entry(network_id)
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }
}

/// Opens (or creates) the SQLite database at `path` and runs the
/// (idempotent) schema creation, mirroring `innernet_server::db::auto_migrate`.
/// The SQL schema/migration *runner* proper is an external collaborator
/// (spec.md §1 Out of scope); what's in scope is the shape of the tables
/// the store needs, created once at startup.
pub fn open_pool(path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.pragma_update(None, "foreign_keys", 1)?;
        Ok(())
    });
    let pool = Pool::new(manager)?;
    let conn = pool.get()?;
    create_schema(&conn).expect("schema creation must succeed on a fresh database");
    Ok(pool)
}

fn create_schema(conn: &Conn) -> Result<(), rusqlite::Error> {
    conn.execute_batch(&format!(
        "BEGIN;
         {network};
         {peer};
         {peer_secret};
         {psk};
         {group_tbl};
         {group_peer};
         {group_policy};
         {group_route};
         {policy};
         {policy_rule};
         {route};
         {dns};
         {agent_session};
         {endpoint_change};
         {incident};
         {user};
         {auth_session};
         {enrollment};
         {ipam};
         {blocking};
         {whitelist};
         COMMIT;",
        network = network::CREATE_TABLE_SQL,
        peer = peer::CREATE_TABLE_SQL,
        peer_secret = peer::CREATE_SECRET_TABLE_SQL,
        psk = psk::CREATE_TABLE_SQL,
        group_tbl = group::CREATE_TABLE_SQL,
        group_peer = group::CREATE_MEMBERSHIP_TABLE_SQL,
        group_policy = group::CREATE_POLICY_ATTACHMENT_TABLE_SQL,
        group_route = group::CREATE_ROUTE_ATTACHMENT_TABLE_SQL,
        policy = policy::CREATE_TABLE_SQL,
        policy_rule = policy::CREATE_RULE_TABLE_SQL,
        route = route::CREATE_TABLE_SQL,
        dns = dns::CREATE_TABLE_SQL,
        agent_session = agent_session::CREATE_TABLE_SQL,
        endpoint_change = agent_session::CREATE_ENDPOINT_CHANGE_TABLE_SQL,
        incident = incident::CREATE_TABLE_SQL,
        user = user::CREATE_TABLE_SQL,
        auth_session = user::CREATE_SESSION_TABLE_SQL,
        enrollment = enrollment::CREATE_TABLE_SQL,
        ipam = crate::ipam::CREATE_TABLE_SQL,
        blocking = acl::CREATE_TABLE_SQL,
        whitelist = acl::CREATE_WHITELIST_TABLE_SQL,
    ))
}

/// The full store surface, composed of one sub-store per entity family —
/// analogous to the teacher's `db::{DatabaseCidr, DatabasePeer,
/// DatabaseAssociation}` trio, just with more members because this core
/// has more entities.
#[derive(Clone)]
pub struct Store {
    pub pool: DbPool,
    pub locks: NetworkLocks,
}

impl Store {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            locks: NetworkLocks::new(),
        }
    }

    pub fn conn(&self) -> Result<Conn, r2d2::Error> {
        self.pool.get()
    }
}
