//! Network resource (§3, §6). Creation and deletion are administrator-only;
//! everything else gates on [`mesh_core::identity::has_network_access`].

use crate::{
    api::{conn, require_administrator, require_network_access},
    auth::AuthUser,
    error::ApiResult,
    AppState,
};
use axum::{
    extract::{Path, State},
    routing::{get, patch, post},
    Json, Router,
};
use ipnet::Ipv4Net;
use mesh_core::{model::Network, store::NetworkStore, validate, world::World};
use serde::Deserialize;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/networks", post(create).get(list))
        .route("/api/v1/networks/:network_id", get(get_one).delete(delete_one))
        .route("/api/v1/networks/:network_id/cidr", patch(update_cidr))
        .route("/api/v1/networks/:network_id/dns-domain", patch(update_dns_domain))
}

#[derive(Deserialize)]
struct CreateNetworkRequest {
    name: String,
    cidr: Ipv4Net,
    dns_domain: String,
}

async fn create(State(state): State<AppState>, AuthUser(user): AuthUser, Json(req): Json<CreateNetworkRequest>) -> ApiResult<Json<Network>> {
    require_administrator(&user)?;
    let c = conn(&state)?;
    let network = NetworkStore::create(&c, &req.name, req.cidr, &req.dns_domain)?;
    Ok(Json(network))
}

async fn list(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Json<Vec<Network>>> {
    let c = conn(&state)?;
    let networks = NetworkStore::list(&c)?
        .into_iter()
        .filter(|n| mesh_core::identity::has_network_access(&user, n.id))
        .collect();
    Ok(Json(networks))
}

async fn get_one(State(state): State<AppState>, AuthUser(user): AuthUser, Path(network_id): Path<i64>) -> ApiResult<Json<Network>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    Ok(Json(NetworkStore::get(&c, network_id)?))
}

async fn delete_one(State(state): State<AppState>, AuthUser(user): AuthUser, Path(network_id): Path<i64>) -> ApiResult<()> {
    require_administrator(&user)?;
    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;
    NetworkStore::delete(&c, network_id)?;
    Ok(())
}

#[derive(Deserialize)]
struct UpdateCidrRequest {
    cidr: Ipv4Net,
}

async fn update_cidr(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(network_id): Path<i64>,
    Json(req): Json<UpdateCidrRequest>,
) -> ApiResult<Json<Network>> {
    require_administrator(&user)?;
    require_network_access(&user, network_id)?;

    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;

    let world = World::load(&c, network_id, state.upstream_resolvers.clone())?;
    validate::check_cidr_change_allowed(&world)?;

    let network = NetworkStore::update_cidr(&c, network_id, req.cidr)?;
    drop(_guard);
    state.hub.resync_network(network_id).await?;
    Ok(Json(network))
}

#[derive(Deserialize)]
struct UpdateDnsDomainRequest {
    dns_domain: String,
}

async fn update_dns_domain(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(network_id): Path<i64>,
    Json(req): Json<UpdateDnsDomainRequest>,
) -> ApiResult<Json<Network>> {
    require_administrator(&user)?;
    require_network_access(&user, network_id)?;

    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;
    let network = NetworkStore::update_dns_domain(&c, network_id, &req.dns_domain)?;
    drop(_guard);
    state.hub.resync_network(network_id).await?;
    Ok(Json(network))
}
