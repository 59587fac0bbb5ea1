//! §6 "Enrollment resolve": `GET /api/v1/agent/resolve?token=...`. The
//! token itself is the credential here — an agent redeeming its
//! enrollment has no session yet — so this route bypasses
//! [`crate::auth::AuthUser`] entirely, same as the teacher's invite
//! redemption endpoint trusted the invitation signature rather than a
//! logged-in session.

use crate::{api::conn, error::ApiResult, AppState};
use axum::{extract::Query, routing::get, Json, Router};
use mesh_core::world::World;
use serde::{Deserialize, Serialize};

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/v1/agent/resolve", get(resolve))
}

#[derive(Deserialize)]
struct ResolveQuery {
    token: String,
}

#[derive(Serialize)]
struct ResolveResponse {
    network_id: i64,
    peer_id: i64,
    peer_name: String,
    config: String,
}

async fn resolve(axum::extract::State(state): axum::extract::State<AppState>, Query(q): Query<ResolveQuery>) -> ApiResult<Json<ResolveResponse>> {
    let c = conn(&state)?;
    let enrollment = mesh_core::store::EnrollmentStore::get(&c, &q.token)?;

    let network_lock = state.store.locks.get(enrollment.network_id);
    let _guard = network_lock.read().await;

    let world = World::load(&c, enrollment.network_id, state.upstream_resolvers.clone())?;
    let resolved = mesh_core::enrollment::resolve(&c, &q.token, &world)?;

    Ok(Json(ResolveResponse {
        network_id: resolved.network_id,
        peer_id: resolved.peer_id,
        peer_name: resolved.peer_name,
        config: resolved.config,
    }))
}
