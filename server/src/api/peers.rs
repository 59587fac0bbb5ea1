//! Peer resource (§3, §4.2, §4.8). Creation allocates an address via IPAM
//! and generates a fresh Curve25519 keypair; the private half never
//! leaves this handler except inside the enrollment token's eventual
//! `resolve` response (§4.4 Step 1, §7 "never in public responses").

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
use mesh_core::{
    enrollment, ipam,
    model::{Endpoint, Peer, PeerContents},
    store::{NetworkStore, PeerStore},
    validate,
    world::World,
    CoreError,
};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use wireguard_control::KeyPair;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/networks/:network_id/peers", post(create).get(list))
        .route("/api/v1/networks/:network_id/peers/:peer_id", get(get_one).patch(update).delete(delete_one))
        .route("/api/v1/networks/:network_id/peers/:peer_id/enroll", post(enroll))
        .route("/api/v1/networks/:network_id/peers/:peer_id/enroll/rotate", post(rotate))
}

#[derive(Deserialize)]
struct CreatePeerRequest {
    name: String,
    #[serde(default)]
    endpoint: Option<Endpoint>,
    #[serde(default)]
    listen_port: Option<u16>,
    #[serde(default)]
    is_jump: bool,
    #[serde(default = "default_true")]
    use_agent: bool,
    #[serde(default)]
    nat_forwarding_interface: Option<String>,
    #[serde(default)]
    owner_id: Option<String>,
    #[serde(default)]
    extra_allowed_ips: Vec<Ipv4Net>,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize)]
struct CreatePeerResponse {
    #[serde(flatten)]
    peer: Peer,
    enrollment_token: Option<String>,
}

async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(network_id): Path<i64>,
    Json(req): Json<CreatePeerRequest>,
) -> ApiResult<Json<CreatePeerResponse>> {
    require_network_access(&user, network_id)?;

    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;

    let network = NetworkStore::get(&c, network_id)?;
    let world = World::load(&c, network_id, state.upstream_resolvers.clone())?;
    validate::check_first_peer_is_jump(&world, req.is_jump)?;

    let address = ipam::allocate(&c, network_id, network.cidr)?;
    let keypair = KeyPair::generate();
    let now = SystemTime::now();

    let contents = PeerContents {
        network_id,
        name: req.name,
        public_key: keypair.public.to_base64(),
        address,
        endpoint: req.endpoint,
        listen_port: req.listen_port,
        is_jump: req.is_jump,
        use_agent: req.use_agent,
        nat_forwarding_interface: req.nat_forwarding_interface,
        owner_id: req.owner_id,
        extra_allowed_ips: req.extra_allowed_ips,
        created_at: now,
        updated_at: now,
    };

    let peer = match PeerStore::create(&c, contents, &keypair.private.to_base64()) {
        Ok(peer) => peer,
        Err(e) => {
            let _ = ipam::release(&c, network_id, address);
            return Err(e.into());
        },
    };

    let enrollment_token = if peer.use_agent {
        Some(enrollment::issue(&c, network_id, peer.id)?.token)
    } else {
        None
    };

    Ok(Json(CreatePeerResponse { peer, enrollment_token }))
}

async fn list(State(state): State<AppState>, AuthUser(user): AuthUser, Path(network_id): Path<i64>) -> ApiResult<Json<Vec<Peer>>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    Ok(Json(PeerStore::list_by_network(&c, network_id)?))
}

async fn get_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, peer_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Peer>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    let peer = PeerStore::get(&c, peer_id)?;
    if peer.network_id != network_id {
        return Err(CoreError::NotFound.into());
    }
    Ok(Json(peer))
}

#[derive(Deserialize)]
struct UpdatePeerRequest {
    name: Option<String>,
    endpoint: Option<Option<Endpoint>>,
    listen_port: Option<Option<u16>>,
    nat_forwarding_interface: Option<Option<String>>,
    owner_id: Option<Option<String>>,
    extra_allowed_ips: Option<Vec<Ipv4Net>>,
}

async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, peer_id)): Path<(i64, i64)>,
    Json(req): Json<UpdatePeerRequest>,
) -> ApiResult<Json<Peer>> {
    require_network_access(&user, network_id)?;

    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;

    let existing = PeerStore::get(&c, peer_id)?;
    if existing.network_id != network_id {
        return Err(CoreError::NotFound.into());
    }

    let mut contents = existing.contents.clone();
    if let Some(name) = req.name {
        contents.name = name;
    }
    if let Some(endpoint) = req.endpoint {
        contents.endpoint = endpoint;
    }
    if let Some(listen_port) = req.listen_port {
        contents.listen_port = listen_port;
    }
    if let Some(iface) = req.nat_forwarding_interface {
        contents.nat_forwarding_interface = iface;
    }
    if let Some(owner_id) = req.owner_id {
        contents.owner_id = owner_id;
    }
    if let Some(extra) = req.extra_allowed_ips {
        contents.extra_allowed_ips = extra;
    }

    if contents.is_jump && (contents.listen_port.is_none() || contents.endpoint.is_none()) {
        return Err(CoreError::Validation("a jump peer requires a listen port and an endpoint".into()).into());
    }

    let peer = PeerStore::update(&c, peer_id, contents)?;
    drop(_guard);
    state.hub.resync_network(network_id).await?;
    Ok(Json(peer))
}

async fn delete_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, peer_id)): Path<(i64, i64)>,
) -> ApiResult<()> {
    require_network_access(&user, network_id)?;

    let lock = state.store.locks.get(network_id);
    let _guard = lock.write().await;
    let c = conn(&state)?;

    let world = World::load(&c, network_id, state.upstream_resolvers.clone())?;
    validate::check_jump_retained_on_delete(&world, peer_id)?;
    validate::check_jump_peer_not_referenced(&world, peer_id)?;

    let peer = PeerStore::get(&c, peer_id)?;
    PeerStore::delete(&c, peer_id)?;
    ipam::release(&c, network_id, peer.address)?;
    drop(_guard);
    state.hub.resync_network(network_id).await?;
    Ok(())
}

#[derive(Serialize)]
struct EnrollmentResponse {
    token: String,
}

async fn enroll(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, peer_id)): Path<(i64, i64)>,
) -> ApiResult<Json<EnrollmentResponse>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    let token = enrollment::issue(&c, network_id, peer_id)?;
    Ok(Json(EnrollmentResponse { token: token.token }))
}

async fn rotate(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((network_id, peer_id)): Path<(i64, i64)>,
) -> ApiResult<Json<EnrollmentResponse>> {
    require_network_access(&user, network_id)?;
    let c = conn(&state)?;
    let token = enrollment::rotate(&c, network_id, peer_id)?;
    Ok(Json(EnrollmentResponse { token: token.token }))
}

