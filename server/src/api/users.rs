//! User resource (§3, §4.1). Granting and revoking network access is
//! administrator-only; `me` lets any authenticated caller see its own
//! resolved principal.

use crate::{api::{conn, require_administrator}, auth::AuthUser, error::ApiResult, AppState};
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use mesh_core::{model::User, store::UserStore};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/users/me", get(me))
        .route("/api/v1/users/:user_id/networks/:network_id", axum::routing::post(grant).delete(revoke))
}

async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

async fn grant(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((user_id, network_id)): Path<(String, i64)>,
) -> ApiResult<Json<User>> {
    require_administrator(&user)?;
    let c = conn(&state)?;
    Ok(Json(UserStore::grant_network_access(&c, &user_id, network_id)?))
}

async fn revoke(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((user_id, network_id)): Path<(String, i64)>,
) -> ApiResult<Json<User>> {
    require_administrator(&user)?;
    let c = conn(&state)?;
    Ok(Json(UserStore::revoke_network_access(&c, &user_id, network_id)?))
}
