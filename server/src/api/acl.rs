//! ACL resource (§4.7): the per-network blocking and whitelist sets the
//! synthesizer and the incident engine both read. Blocking an IP is the
//! same action Detector A's auto-response takes (§4.7); exposing it here
//! lets an administrator do the same thing by hand, and reverse it.

use crate::{
    api::{conn, require_network_access},
    auth::AuthUser,
    error::ApiResult,
    AppState,
};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use mesh_core::store::AclStore;
use serde::Serialize;
use std::net::Ipv4Addr;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/networks/:network_id/acl", get(list))
        .route("/api/v1/networks/:network_id/acl/block/:ip", post(block).delete(unblock))
        .route("/api/v1/networks/:network_id/acl/whitelist/:ip", post(whitelist).delete(unwhitelist))
}

#[derive(Serialize)]
struct AclResponse {
    blocked: Vec<Ipv4Addr>,
    whitelisted: Vec<Ipv4Addr>,
}

async fn list(State(state): State<AppState>, AuthUser(user): AuthUser, Path(network_id): Path<i64>) -> ApiResult<Json<AclResponse>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    Ok(Json(AclResponse {
        blocked: AclStore::list_blocked(&c, network_id)?.into_iter().collect(),
        whitelisted: AclStore::list_whitelisted(&c, network_id)?.into_iter().collect(),
    }))
}

async fn block(State(state): State<AppState>, AuthUser(user): AuthUser, Path((network_id, ip)): Path<(i64, Ipv4Addr)>) -> ApiResult<()> {
    require_network_access(&user, network_id)?;
    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;
    AclStore::block(&c, network_id, ip)?;
    drop(_guard);
    state.hub.resync_network(network_id).await?;
    Ok(())
}

async fn unblock(State(state): State<AppState>, AuthUser(user): AuthUser, Path((network_id, ip)): Path<(i64, Ipv4Addr)>) -> ApiResult<()> {
    require_network_access(&user, network_id)?;
    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;
    AclStore::unblock(&c, network_id, ip)?;
    drop(_guard);
    state.hub.resync_network(network_id).await?;
    Ok(())
}

async fn whitelist(State(state): State<AppState>, AuthUser(user): AuthUser, Path((network_id, ip)): Path<(i64, Ipv4Addr)>) -> ApiResult<()> {
    require_network_access(&user, network_id)?;
    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;
    AclStore::whitelist(&c, network_id, ip)?;
    drop(_guard);
    state.hub.resync_network(network_id).await?;
    Ok(())
}

async fn unwhitelist(State(state): State<AppState>, AuthUser(user): AuthUser, Path((network_id, ip)): Path<(i64, Ipv4Addr)>) -> ApiResult<()> {
    require_network_access(&user, network_id)?;
    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;
    AclStore::unwhitelist(&c, network_id, ip)?;
    drop(_guard);
    state.hub.resync_network(network_id).await?;
    Ok(())
}
