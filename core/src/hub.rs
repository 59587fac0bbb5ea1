//! Agent Channel Hub (§4.6). One long-lived bidirectional channel per
//! connected agent; two cooperative tasks per channel (a heartbeat reader,
//! a push writer) sharing a [`CancellationToken`] (§9 "Backoff/cancellation
//! for channels" — the source's goroutine-plus-two-tickers shape, ported
//! to tasks).
//!
//! The transport itself (WebSocket upgrade, frame codec) is an external
//! collaborator (§1 Out of scope); this module depends on it only through
//! [`AgentSink`]/[`AgentSource`], composed rather than inherited (§9
//! "Polymorphic port surfaces"). The two are separate traits, not one
//! `AgentChannel`, because a real duplex transport (e.g. a split
//! WebSocket) hands out an owned sender half and an owned receiver half
//! that are driven from two different tasks — a single `&mut` trait
//! object can't be shared between the reader and writer tasks this
//! module spawns.

use crate::error::{CoreError, CoreResult};
use crate::incidents::{IncidentEngine, SessionId};
use crate::model::{Heartbeat, IncidentKind};
use crate::store::{AclStore, AgentSessionStore, EnrollmentStore, IncidentStore, PeerStore, Store};
use crate::synth::{DnsPayload, FirewallPolicy, WhitelistPayload};
use crate::world::World;
use dashmap::DashMap;
use serde::Serialize;
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime},
};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const CHANNEL_SEND_DEADLINE: Duration = Duration::from_secs(5);
pub const CLOSE_GRACE: Duration = Duration::from_secs(60);

/// §4.6 "Message types (server -> agent)".
#[derive(Clone, Debug, Serialize)]
pub struct ServerMessage {
    pub config: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<FirewallPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<WhitelistPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_name: Option<String>,
}

/// One heartbeat frame plus the transport-observed source address it
/// arrived from (§4.6 "reported NAT-observed endpoint" — the hub never
/// trusts a self-reported address inside the JSON body for this purpose;
/// the transport is the one thing that actually saw the packet's source).
#[derive(Clone, Debug)]
pub struct ObservedHeartbeat {
    pub heartbeat: Heartbeat,
    pub source_addr: Option<SocketAddr>,
}

/// The outbound half of a channel: push a [`ServerMessage`] frame, tear
/// down cleanly. Implemented by whatever owns the socket's write side
/// (§9).
#[async_trait::async_trait]
pub trait AgentSink: Send {
    async fn send(&mut self, message: &ServerMessage) -> CoreResult<()>;
    async fn close(&mut self);
}

/// The inbound half: yield the agent's next heartbeat frame, or `None`
/// once the channel has closed.
#[async_trait::async_trait]
pub trait AgentSource: Send {
    async fn recv_heartbeat(&mut self) -> Option<ObservedHeartbeat>;
}

struct ConnectedPeer {
    session: SessionId,
    network_id: i64,
    push: watch::Sender<Option<ServerMessage>>,
    cancel: CancellationToken,
}

/// Maintains every active agent channel plus the read-mostly blocking/
/// whitelist snapshot the synthesizer's hot path reads (§5, §9 "Shared
/// mutable session map" — an `arc-swap` snapshot per network, republished
/// wholesale on each mutation instead of locked in place).
pub struct Hub {
    store: Store,
    connected: DashMap<i64, ConnectedPeer>,
    incidents: Mutex<IncidentEngine>,
    next_session: AtomicU64,
    upstream_resolvers: Vec<Ipv4Addr>,
    shutdown: CancellationToken,
}

impl Hub {
    pub fn new(store: Store, upstream_resolvers: Vec<Ipv4Addr>) -> Arc<Self> {
        Arc::new(Self {
            store,
            connected: DashMap::new(),
            incidents: Mutex::new(IncidentEngine::new()),
            next_session: AtomicU64::new(1),
            upstream_resolvers,
            shutdown: CancellationToken::new(),
        })
    }

    /// Process-wide shutdown (§4.6 "Cancellation"): closes every channel
    /// and lets their tasks exit promptly.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// §4.6 channel lifecycle steps 1-4. Takes ownership of both transport
    /// halves and returns once the channel has closed (reader/writer tasks
    /// are joined internally); callers spawn this per accepted connection.
    pub async fn serve(
        self: &Arc<Self>,
        token: &str,
        mut sink: Box<dyn AgentSink>,
        mut source: Box<dyn AgentSource>,
    ) -> CoreResult<()> {
        let (network_id, peer_id) = {
            let conn = self.store.conn()?;
            let enrollment = EnrollmentStore::get(&conn, token).map_err(|e| match e {
                CoreError::NotFound => CoreError::Forbidden,
                other => other,
            })?;
            PeerStore::get(&conn, enrollment.peer_id).map_err(|e| match e {
                CoreError::NotFound => CoreError::Forbidden,
                other => other,
            })?;
            (enrollment.network_id, enrollment.peer_id)
        };

        let network_lock = self.store.locks.get(network_id);
        let initial = {
            let _guard = network_lock.read().await;
            let conn = self.store.conn()?;
            self.synthesize_for(&conn, network_id, peer_id)?
        };

        let session = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        let (push_tx, push_rx) = watch::channel(Some(initial));
        let cancel = self.shutdown.child_token();

        self.connected.insert(
            peer_id,
            ConnectedPeer { session, network_id, push: push_tx, cancel: cancel.clone() },
        );

        let writer = tokio::spawn(run_writer(sink, push_rx, cancel.clone()));
        let reader_result = self.run_reader(&mut source, network_id, peer_id, session, cancel.clone()).await;

        cancel.cancel();
        let _ = writer.await;

        self.schedule_grace_removal(peer_id, session);
        reader_result
    }

    async fn run_reader(
        self: &Arc<Self>,
        source: &mut Box<dyn AgentSource>,
        network_id: i64,
        peer_id: i64,
        session: SessionId,
        cancel: CancellationToken,
    ) -> CoreResult<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                heartbeat = source.recv_heartbeat() => {
                    match heartbeat {
                        Some(hb) => self.handle_heartbeat(network_id, peer_id, session, hb).await?,
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    async fn handle_heartbeat(self: &Arc<Self>, network_id: i64, peer_id: i64, session: SessionId, hb: ObservedHeartbeat) -> CoreResult<()> {
        let now = SystemTime::now();
        let conn = self.store.conn()?;
        let peer = PeerStore::get(&conn, peer_id)?;

        let previous = AgentSessionStore::get_by_peer(&conn, peer_id).ok();
        AgentSessionStore::upsert_heartbeat(
            &conn,
            peer_id,
            &hb.heartbeat.hostname,
            hb.heartbeat.system_uptime,
            hb.heartbeat.wireguard_uptime,
            hb.source_addr.as_ref(),
            &hb.heartbeat.peer_endpoints,
        )?;

        // Only a *change* from a previously-seen endpoint counts (§3
        // Endpoint-Change Record); a brand-new session's first heartbeat
        // isn't a change, it's an arrival.
        let endpoint_changed = previous.map(|p| p.nat_endpoint != hb.source_addr).unwrap_or(false);
        if endpoint_changed && hb.source_addr.is_some() {
            AgentSessionStore::record_endpoint_change(&conn, peer_id, &hb.source_addr.unwrap())?;
        }

        let mut detected = {
            let mut engine = self.incidents.lock().await;
            let mut incidents = engine.observe_heartbeat(network_id, peer_id, &peer.public_key, session, hb.source_addr, now);
            if endpoint_changed {
                incidents.extend(engine.observe_endpoint_change(network_id, peer_id, &peer.public_key, now));
            }
            incidents
        };

        for incident in detected.drain(..) {
            self.record_and_respond(network_id, peer_id, incident, &conn).await?;
        }

        Ok(())
    }

    async fn record_and_respond(
        self: &Arc<Self>,
        network_id: i64,
        peer_id: i64,
        incident: crate::incidents::DetectedIncident,
        conn: &rusqlite::Connection,
    ) -> CoreResult<()> {
        tracing::warn!(network_id, peer_id, kind = ?incident.kind, detail = %incident.detail, "security incident detected");

        IncidentStore::record(conn, peer_id, network_id, incident.kind, &incident.public_key, &incident.endpoints, &incident.detail)?;

        if matches!(incident.kind, IncidentKind::SharedConfig) {
            let peer = PeerStore::get(conn, peer_id)?;
            AclStore::block(conn, network_id, peer.address)?;
            self.resync_network(network_id).await?;
        }

        Ok(())
    }

    /// Administrator action: clears the peer's block, if any, and re-pushes
    /// every connected jump in the network (§4.7 "resolution... removes
    /// the peer from the blocking set and re-pushes the affected jumps").
    pub async fn resolve_incident(self: &Arc<Self>, network_id: i64, incident_id: i64, peer_id: i64, resolved_by: &str) -> CoreResult<()> {
        let network_lock = self.store.locks.get(network_id);
        let _guard = network_lock.write().await;
        let conn = self.store.conn()?;

        IncidentStore::resolve(&conn, incident_id, resolved_by)?;
        let peer = PeerStore::get(&conn, peer_id)?;
        AclStore::unblock(&conn, network_id, peer.address)?;
        drop(_guard);

        self.resync_network(network_id).await
    }

    /// §4.6 "Change-driven re-push": re-synthesizes for every connected
    /// peer in `network_id` and republishes via its watch channel, which
    /// coalesces naturally (a writer task only ever sees the latest value).
    pub async fn resync_network(self: &Arc<Self>, network_id: i64) -> CoreResult<()> {
        let network_lock = self.store.locks.get(network_id);
        let _guard = network_lock.read().await;
        let conn = self.store.conn()?;

        let peer_ids: Vec<i64> = self
            .connected
            .iter()
            .filter(|entry| entry.value().network_id == network_id)
            .map(|entry| *entry.key())
            .collect();

        for peer_id in peer_ids {
            let message = self.synthesize_for(&conn, network_id, peer_id)?;
            if let Some(entry) = self.connected.get(&peer_id) {
                let _ = entry.push.send(Some(message));
            }
        }
        Ok(())
    }

    /// Whether `peer_id` currently holds an open channel — exposed for the
    /// REST surface to report live agent status alongside `AgentSession`.
    pub fn is_connected(&self, peer_id: i64) -> bool {
        self.connected.contains_key(&peer_id)
    }

    fn synthesize_for(&self, conn: &rusqlite::Connection, network_id: i64, peer_id: i64) -> CoreResult<ServerMessage> {
        let world = World::load(conn, network_id, self.upstream_resolvers.clone())?;
        let private_key = PeerStore::get_private_key(conn, peer_id)?;
        let synthesized = crate::synth::synthesize(conn, peer_id, &private_key, &world)?;
        let peer = PeerStore::get(conn, peer_id)?;

        Ok(ServerMessage {
            config: crate::wgconf::render_interface_config(&synthesized),
            dns: synthesized.dns_payload,
            policy: synthesized.firewall_policy,
            whitelist: synthesized.whitelist_payload,
            peer_id: Some(peer.id),
            // §4.6: carries the sanitized interface identifier so a renamed
            // peer can migrate its local interface, not the raw display name.
            peer_name: Some(crate::util::sanitize_interface_name(&peer.name)),
        })
    }

    /// §4.6 "on channel close, mark session closed after a grace of ~60s".
    fn schedule_grace_removal(self: &Arc<Self>, peer_id: i64, session: SessionId) {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(CLOSE_GRACE).await;
            if let Some(entry) = hub.connected.get(&peer_id) {
                if entry.session == session {
                    drop(entry);
                    hub.connected.remove(&peer_id);
                    let mut engine = hub.incidents.lock().await;
                    engine.forget_peer(peer_id);
                }
            }
        });
    }
}

/// Owns the sink half for the duration of the channel: observes coalesced
/// pushes on `rx` (a `watch` channel's defining property — only the latest
/// unread value survives — is exactly the bounded-backpressure-with-
/// coalescing behavior §4.6 asks for) and forwards each to the transport,
/// bounded by [`CHANNEL_SEND_DEADLINE`]. A slow `send` can never stall
/// heartbeat ingestion, which runs on the reader task instead.
async fn run_writer(mut sink: Box<dyn AgentSink>, mut rx: watch::Receiver<Option<ServerMessage>>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let message = rx.borrow_and_update().clone();
                let Some(message) = message else { continue };
                let sent = tokio::time::timeout(CHANNEL_SEND_DEADLINE, sink.send(&message)).await;
                match sent {
                    Ok(Ok(())) => {},
                    // §5 "Channel writes have a 5s deadline; on timeout the
                    // channel is closed" and a `Transient` send error is
                    // treated the same way — the agent reconnects.
                    Ok(Err(_)) | Err(_) => break,
                }
            }
        }
    }
    sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink {
        sent: Arc<Mutex<Vec<ServerMessage>>>,
    }

    #[async_trait::async_trait]
    impl AgentSink for RecordingSink {
        async fn send(&mut self, message: &ServerMessage) -> CoreResult<()> {
            self.sent.lock().await.push(message.clone());
            Ok(())
        }
        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn grace_removal_only_drops_the_same_session() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("hub.db");
        let pool = crate::store::open_pool(db_path.to_str().unwrap()).unwrap();
        let store = Store::new(pool);
        let hub = Hub::new(store, vec![]);

        let (tx, _rx) = watch::channel(None);
        hub.connected.insert(
            1,
            ConnectedPeer { session: SessionId(1), network_id: 1, push: tx, cancel: CancellationToken::new() },
        );

        // Simulate a reconnect bumping the session before the grace timer
        // we're about to assert against would have fired.
        let (tx2, _rx2) = watch::channel(None);
        hub.connected.insert(
            1,
            ConnectedPeer { session: SessionId(2), network_id: 1, push: tx2, cancel: CancellationToken::new() },
        );

        assert_eq!(hub.connected.get(&1).unwrap().session, SessionId(2));
    }

    /// The writer task must actually forward the initial push through the
    /// sink, not merely observe that something changed.
    #[tokio::test]
    async fn writer_forwards_coalesced_pushes_to_the_sink() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = Box::new(RecordingSink { sent: sent.clone() });
        let (tx, rx) = watch::channel(Some(ServerMessage {
            config: "[Interface]".into(),
            dns: None,
            policy: None,
            whitelist: None,
            peer_id: Some(1),
            peer_name: Some("a".into()),
        }));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_writer(sink, rx, cancel.clone()));

        // Give the writer task a chance to observe the already-set value.
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(Some(ServerMessage {
            config: "[Interface] v2".into(),
            dns: None,
            policy: None,
            whitelist: None,
            peer_id: Some(1),
            peer_name: Some("a".into()),
        }))
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        cancel.cancel();
        handle.await.unwrap();

        let messages = sent.lock().await;
        assert!(messages.iter().any(|m| m.config == "[Interface] v2"));
    }
}
