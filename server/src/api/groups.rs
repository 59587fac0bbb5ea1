//! Group resource (§3, §4.5). Membership and attachment changes run the
//! Validation Engine's circular-routing checks before writing, inside the
//! network's write lock (§5).

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
use mesh_core::{model::Group, store::GroupStore, validate, world::World};
use serde::Deserialize;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/networks/:network_id/groups", post(create).get(list))
        .route("/api/v1/networks/:network_id/groups/:group_id", get(get_one).delete(delete_one))
        .route("/api/v1/networks/:network_id/groups/:group_id/peers/:peer_id", post(add_peer).delete(remove_peer))
        .route("/api/v1/networks/:network_id/groups/:group_id/policies/:policy_id", post(attach_policy).delete(detach_policy))
        .route("/api/v1/networks/:network_id/groups/:group_id/routes/:route_id", post(attach_route).delete(detach_route))
}

#[derive(Deserialize)]
struct CreateGroupRequest {
    name: String,
    #[serde(default)]
    priority: Option<u16>,
    #[serde(default)]
    description: String,
}

async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(network_id): Path<i64>,
    Json(req): Json<CreateGroupRequest>,
) -> ApiResult<Json<Group>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    Ok(Json(GroupStore::create(&c, network_id, &req.name, req.priority, &req.description)?))
}

async fn list(State(state): State<AppState>, AuthUser(user): AuthUser, Path(network_id): Path<i64>) -> ApiResult<Json<Vec<Group>>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    Ok(Json(GroupStore::list_by_network(&c, network_id)?))
}

async fn get_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, group_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Group>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    Ok(Json(GroupStore::get(&c, group_id)?))
}

async fn delete_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, group_id)): Path<(i64, i64)>,
) -> ApiResult<()> {
    require_network_access(&user, network_id)?;
    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;
    GroupStore::delete(&c, group_id)?;
    Ok(())
}

async fn add_peer(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, group_id, peer_id)): Path<(i64, i64, i64)>,
) -> ApiResult<()> {
    require_network_access(&user, network_id)?;
    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;

    let world = World::load(&c, network_id, state.upstream_resolvers.clone())?;
    validate::check_add_peer_to_group(&world, peer_id, group_id)?;

    GroupStore::add_peer(&c, group_id, peer_id)?;
    drop(_guard);
    state.hub.resync_network(network_id).await?;
    Ok(())
}

async fn remove_peer(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, group_id, peer_id)): Path<(i64, i64, i64)>,
) -> ApiResult<()> {
    require_network_access(&user, network_id)?;
    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;
    GroupStore::remove_peer(&c, group_id, peer_id)?;
    drop(_guard);
    state.hub.resync_network(network_id).await?;
    Ok(())
}

async fn attach_policy(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, group_id, policy_id)): Path<(i64, i64, i64)>,
) -> ApiResult<()> {
    require_network_access(&user, network_id)?;
    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;
    GroupStore::attach_policy(&c, group_id, policy_id)?;
    drop(_guard);
    state.hub.resync_network(network_id).await?;
    Ok(())
}

async fn detach_policy(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, group_id, policy_id)): Path<(i64, i64, i64)>,
) -> ApiResult<()> {
    require_network_access(&user, network_id)?;
    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;
    GroupStore::detach_policy(&c, group_id, policy_id)?;
    drop(_guard);
    state.hub.resync_network(network_id).await?;
    Ok(())
}

async fn attach_route(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, group_id, route_id)): Path<(i64, i64, i64)>,
) -> ApiResult<()> {
    require_network_access(&user, network_id)?;
    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;

    let world = World::load(&c, network_id, state.upstream_resolvers.clone())?;
    validate::check_attach_route_to_group(&world, route_id, group_id)?;

    GroupStore::attach_route(&c, group_id, route_id)?;
    drop(_guard);
    state.hub.resync_network(network_id).await?;
    Ok(())
}

async fn detach_route(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, group_id, route_id)): Path<(i64, i64, i64)>,
) -> ApiResult<()> {
    require_network_access(&user, network_id)?;
    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;
    GroupStore::detach_route(&c, group_id, route_id)?;
    drop(_guard);
    state.hub.resync_network(network_id).await?;
    Ok(())
}
