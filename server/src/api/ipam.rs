//! IPAM status resource (§4.2, §6): what's currently allocated in a
//! network, and a CIDR-sizing helper for planning a new sub-allocation.
//! Address allocation itself only ever happens as a side effect of peer
//! creation (`api::peers::create`); this resource is read-only.

use crate::{api::{conn, require_network_access}, auth::AuthUser, error::ApiResult, AppState};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use ipnet::Ipv4Net;
use mesh_core::{ipam, store::NetworkStore};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/networks/:network_id/ipam", get(status))
        .route("/api/v1/networks/:network_id/ipam/suggest", get(suggest))
}

#[derive(Serialize)]
struct IpamStatus {
    cidr: Ipv4Net,
    allocated: Vec<Ipv4Addr>,
}

async fn status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(network_id): Path<i64>,
) -> ApiResult<Json<IpamStatus>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    let network = NetworkStore::get(&c, network_id)?;
    let allocated = ipam::list_allocated(&c, network_id, network.cidr)?;
    Ok(Json(IpamStatus { cidr: network.cidr, allocated }))
}

#[derive(Deserialize)]
struct SuggestQuery {
    max_peers: u32,
    #[serde(default = "default_count")]
    count: usize,
}

fn default_count() -> usize {
    1
}

async fn suggest(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(network_id): Path<i64>,
    Query(q): Query<SuggestQuery>,
) -> ApiResult<Json<Vec<Ipv4Net>>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    let network = NetworkStore::get(&c, network_id)?;
    Ok(Json(ipam::suggest(network.cidr, q.max_peers, q.count)))
}
