use thiserror::Error;

/// Error kinds surfaced by every component in this crate. The HTTP adapter
/// (outside this crate) maps these to status codes; nothing in here knows
/// about HTTP.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("circular routing: peer {peer_id} in group {group_id} via route(s) {route_ids:?}")]
    CircularRouting {
        peer_id: i64,
        group_id: i64,
        route_ids: Vec<i64>,
    },

    #[error("address pool exhausted")]
    Exhausted,

    #[error("dependency blocked: {0}")]
    DependencyBlocked(String),

    #[error("transient store failure")]
    Transient(#[from] rusqlite::Error),

    #[error("transient connection pool failure")]
    Pool(#[from] r2d2::Error),

    #[error("identity provider unreachable")]
    ProviderUnreachable,
}

pub type CoreResult<T> = Result<T, CoreError>;
