//! Policy resource (§3, §4.4 Step 4). Rules are replaced wholesale on
//! every write, mirroring [`mesh_core::store::PolicyStore::set_rules`].

use crate::{
    api::{conn, require_network_access},
    auth::AuthUser,
    error::ApiResult,
    AppState,
};
use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use mesh_core::{
    model::{Policy, PolicyRule},
    store::PolicyStore,
};
use serde::Deserialize;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/networks/:network_id/policies", post(create).get(list))
        .route("/api/v1/networks/:network_id/policies/:policy_id", get(get_one).delete(delete_one))
        .route("/api/v1/networks/:network_id/policies/:policy_id/rules", put(set_rules))
}

#[derive(Deserialize)]
struct CreatePolicyRequest {
    name: String,
}

async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(network_id): Path<i64>,
    Json(req): Json<CreatePolicyRequest>,
) -> ApiResult<Json<Policy>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    Ok(Json(PolicyStore::create(&c, network_id, &req.name)?))
}

async fn list(State(state): State<AppState>, AuthUser(user): AuthUser, Path(network_id): Path<i64>) -> ApiResult<Json<Vec<Policy>>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    Ok(Json(PolicyStore::list_by_network(&c, network_id)?))
}

async fn get_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, policy_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Policy>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    Ok(Json(PolicyStore::get(&c, policy_id)?))
}

async fn delete_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, policy_id)): Path<(i64, i64)>,
) -> ApiResult<()> {
    require_network_access(&user, network_id)?;
    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;
    PolicyStore::delete(&c, policy_id)?;
    Ok(())
}

#[derive(Deserialize)]
struct SetRulesRequest {
    rules: Vec<PolicyRule>,
}

async fn set_rules(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, policy_id)): Path<(i64, i64)>,
    Json(req): Json<SetRulesRequest>,
) -> ApiResult<()> {
    require_network_access(&user, network_id)?;
    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;
    PolicyStore::set_rules(&c, policy_id, &req.rules)?;
    drop(_guard);
    state.hub.resync_network(network_id).await?;
    Ok(())
}
