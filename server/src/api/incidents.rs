//! Security incident resource (§4.7). Resolution goes through
//! [`mesh_core::hub::Hub::resolve_incident`], which unblocks the peer and
//! re-pushes every connected jump under its own write lock — this handler
//! does not take one itself.

use crate::{
    api::{conn, require_network_access},
    auth::AuthUser,
    error::ApiResult,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use mesh_core::{model::SecurityIncident, store::IncidentStore};
use serde::Deserialize;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/networks/:network_id/incidents", get(list))
        .route("/api/v1/networks/:network_id/incidents/:incident_id", get(get_one))
        .route("/api/v1/networks/:network_id/incidents/:incident_id/resolve", axum::routing::post(resolve))
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    unresolved: bool,
}

async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(network_id): Path<i64>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<Vec<SecurityIncident>>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    Ok(Json(IncidentStore::list_by_network(&c, network_id, q.unresolved)?))
}

async fn get_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, incident_id)): Path<(i64, i64)>,
) -> ApiResult<Json<SecurityIncident>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    Ok(Json(IncidentStore::get(&c, incident_id)?))
}

async fn resolve(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, incident_id)): Path<(i64, i64)>,
) -> ApiResult<Json<SecurityIncident>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    let incident = IncidentStore::get(&c, incident_id)?;
    drop(c);

    state.hub.resolve_incident(network_id, incident_id, incident.peer_id, &user.id).await?;

    let c = conn(&state)?;
    Ok(Json(IncidentStore::get(&c, incident_id)?))
}
