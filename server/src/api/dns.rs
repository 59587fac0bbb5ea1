//! DNS mapping resource (§3, §4.5). A mapping's IP must lie inside its
//! route's destination CIDR.

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
use mesh_core::{model::DnsMapping, store::DnsMappingStore, validate, world::World};
use serde::Deserialize;
use std::net::Ipv4Addr;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/networks/:network_id/routes/:route_id/dns", post(create).get(list))
        .route("/api/v1/networks/:network_id/routes/:route_id/dns/:mapping_id", get(get_one).delete(delete_one))
}

#[derive(Deserialize)]
struct CreateDnsMappingRequest {
    name: String,
    ip: Ipv4Addr,
}

async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, route_id)): Path<(i64, i64)>,
    Json(req): Json<CreateDnsMappingRequest>,
) -> ApiResult<Json<DnsMapping>> {
    require_network_access(&user, network_id)?;
    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;

    let world = World::load(&c, network_id, state.upstream_resolvers.clone())?;
    validate::check_dns_mapping_in_range(&world, route_id, req.ip)?;

    let mapping = DnsMappingStore::create(&c, route_id, &req.name, req.ip)?;
    drop(_guard);
    state.hub.resync_network(network_id).await?;
    Ok(Json(mapping))
}

async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, route_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Vec<DnsMapping>>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    Ok(Json(DnsMappingStore::list_by_route(&c, route_id)?))
}

async fn get_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, _route_id, mapping_id)): Path<(i64, i64, i64)>,
) -> ApiResult<Json<DnsMapping>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    Ok(Json(DnsMappingStore::get(&c, mapping_id)?))
}

async fn delete_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, _route_id, mapping_id)): Path<(i64, i64, i64)>,
) -> ApiResult<()> {
    require_network_access(&user, network_id)?;
    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;
    DnsMappingStore::delete(&c, mapping_id)?;
    drop(_guard);
    state.hub.resync_network(network_id).await?;
    Ok(())
}
