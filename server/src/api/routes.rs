//! Route resource (§3, §4.5). Deletion is blocked while the route is
//! still attached to a group.

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
use ipnet::Ipv4Net;
use mesh_core::{model::Route, store::RouteStore, validate, world::World};
use serde::Deserialize;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/networks/:network_id/routes", post(create).get(list))
        .route("/api/v1/networks/:network_id/routes/:route_id", get(get_one).delete(delete_one))
}

#[derive(Deserialize)]
struct CreateRouteRequest {
    name: String,
    destination_cidr: Ipv4Net,
    jump_peer_id: i64,
    #[serde(default)]
    dns_suffix: String,
}

async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(network_id): Path<i64>,
    Json(req): Json<CreateRouteRequest>,
) -> ApiResult<Json<Route>> {
    require_network_access(&user, network_id)?;
    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;
    let route = RouteStore::create(&c, network_id, &req.name, req.destination_cidr, req.jump_peer_id, &req.dns_suffix)?;
    drop(_guard);
    state.hub.resync_network(network_id).await?;
    Ok(Json(route))
}

async fn list(State(state): State<AppState>, AuthUser(user): AuthUser, Path(network_id): Path<i64>) -> ApiResult<Json<Vec<Route>>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    Ok(Json(RouteStore::list_by_network(&c, network_id)?))
}

async fn get_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, route_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Route>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    Ok(Json(RouteStore::get(&c, route_id)?))
}

async fn delete_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, route_id)): Path<(i64, i64)>,
) -> ApiResult<()> {
    require_network_access(&user, network_id)?;
    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;

    let world = World::load(&c, network_id, state.upstream_resolvers.clone())?;
    validate::check_route_not_attached_to_group(&world, route_id)?;

    RouteStore::delete(&c, route_id)?;
    drop(_guard);
    state.hub.resync_network(network_id).await?;
    Ok(())
}
