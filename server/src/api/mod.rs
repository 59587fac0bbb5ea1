//! The REST resource surface (§6). One submodule per resource family;
//! each exposes a `routes() -> Router<AppState>` merged together here.
//!
//! Every handler follows the same shape: resolve the caller via
//! [`crate::auth::AuthUser`], take the network's coarse lock (§5) for the
//! duration of the read or the validate-then-write sequence, and map
//! [`mesh_core::CoreError`] to a status code only at the boundary via
//! [`crate::error::ApiError`].

pub mod acl;
pub mod agent;
pub mod dns;
pub mod groups;
pub mod health;
pub mod incidents;
pub mod ipam;
pub mod networks;
pub mod peers;
pub mod policies;
pub mod routes;
pub mod users;
pub mod ws;

use crate::{error::ApiError, AppState};
use axum::Router;
use mesh_core::{store::Conn, CoreError};

pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(agent::routes())
        .merge(ws::routes())
        .merge(networks::routes())
        .merge(peers::routes())
        .merge(groups::routes())
        .merge(policies::routes())
        .merge(routes::routes())
        .merge(dns::routes())
        .merge(acl::routes())
        .merge(incidents::routes())
        .merge(ipam::routes())
        .merge(users::routes())
}

pub(crate) fn conn(state: &AppState) -> Result<Conn, ApiError> {
    state.store.conn().map_err(CoreError::from).map_err(ApiError)
}

/// §4.1: every network-scoped handler gates on this before touching the
/// store.
pub(crate) fn require_network_access(user: &mesh_core::model::User, network_id: i64) -> Result<(), ApiError> {
    if mesh_core::identity::has_network_access(user, network_id) {
        Ok(())
    } else {
        Err(ApiError(CoreError::Forbidden))
    }
}

pub(crate) fn require_administrator(user: &mesh_core::model::User) -> Result<(), ApiError> {
    if mesh_core::identity::is_administrator(user) {
        Ok(())
    } else {
        Err(ApiError(CoreError::Forbidden))
    }
}
