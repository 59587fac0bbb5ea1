//! Enrollment & Token Resolver (§4.8). Binds an opaque token to a
//! `(network_id, peer_id)` pair at peer creation and translates it back to
//! an initial config on redemption. This is the logic layer; the row
//! shape lives in [`crate::model::EnrollmentToken`] and its CRUD in
//! [`crate::store::EnrollmentStore`].

use crate::error::{CoreError, CoreResult};
use crate::model::EnrollmentToken;
use crate::store::{EnrollmentStore, PeerStore};
use crate::wgconf::render_interface_config;
use crate::world::World;
use base64::Engine;
use rand::RngCore;

/// `{network_id, peer_id, peer_name, initial_config_text}` — §6 "Enrollment
/// resolve".
pub struct ResolvedEnrollment {
    pub network_id: i64,
    pub peer_id: i64,
    pub peer_name: String,
    pub config: String,
}

/// §6 "43 base64url characters (256 bits)".
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Issued only for `use_agent == true` peers (§4.8 "static peers never
/// have tokens").
pub fn issue(conn: &rusqlite::Connection, network_id: i64, peer_id: i64) -> CoreResult<EnrollmentToken> {
    let peer = PeerStore::get(conn, peer_id)?;
    if !peer.use_agent {
        return Err(CoreError::Validation(
            "static (non-agent) peers are not enrolled; hand their config out of band".into(),
        ));
    }
    let token = random_token();
    EnrollmentStore::create(conn, &token, network_id, peer_id)
}

/// Idempotent — may be called any number of times; the config text always
/// reflects current world-state (§4.8).
pub fn resolve(
    conn: &rusqlite::Connection,
    token: &str,
    world: &World,
) -> CoreResult<ResolvedEnrollment> {
    let enrollment = EnrollmentStore::get(conn, token)?;
    let peer = PeerStore::get(conn, enrollment.peer_id)?;
    let private_key = PeerStore::get_private_key(conn, enrollment.peer_id)?;

    let synthesized = crate::synth::synthesize(conn, peer.id, &private_key, world)?;
    let config = render_interface_config(&synthesized);

    Ok(ResolvedEnrollment {
        network_id: enrollment.network_id,
        peer_id: enrollment.peer_id,
        peer_name: peer.name.clone(),
        config,
    })
}

/// Replaces the token and invalidates the old one. Existing realtime
/// channels are not forcibly closed — they continue on their
/// already-authenticated session (§4.8).
pub fn rotate(conn: &rusqlite::Connection, network_id: i64, peer_id: i64) -> CoreResult<EnrollmentToken> {
    let existing = EnrollmentStore::get_by_peer(conn, peer_id)?;
    EnrollmentStore::delete(conn, &existing.token)?;
    let token = random_token();
    EnrollmentStore::create(conn, &token, network_id, peer_id)
}
