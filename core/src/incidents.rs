//! Security Incident Engine (§4.7). Runs continuously over the stream of
//! heartbeats and endpoint-change records the Agent Channel Hub observes,
//! independent of the persisted `agent_sessions` table (which tracks only
//! the latest-known session per peer) — detectors B needs to see *two*
//! concurrently live claims on one peer id, so the hub feeds this engine
//! every heartbeat as it arrives, tagged with the hub's own per-channel
//! session id.
//!
//! `now` is threaded through explicitly rather than read from the clock
//! here, so the detectors are plain deterministic functions over a window
//! of observations — easy to drive from tests with literal instants.

use crate::model::{DetectorThresholds, Endpoint, IncidentKind};
use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    time::{Duration, SystemTime},
};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Copy)]
pub struct SessionId(pub u64);

#[derive(Clone, Debug)]
pub struct DetectedIncident {
    pub peer_id: i64,
    pub kind: IncidentKind,
    pub public_key: String,
    pub endpoints: Vec<Endpoint>,
    pub detail: String,
}

#[derive(Clone)]
struct Claim {
    session: SessionId,
    endpoint: Option<SocketAddr>,
    at: SystemTime,
}

#[derive(Default)]
pub struct IncidentEngine {
    thresholds: HashMap<i64, DetectorThresholds>,
    /// Recent claims per peer id, for detectors A and B.
    claims: HashMap<i64, VecDeque<Claim>>,
    /// Recent endpoint-change timestamps per peer id, for detector C.
    endpoint_changes: HashMap<i64, VecDeque<SystemTime>>,
}

impl IncidentEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_thresholds(&mut self, network_id: i64, thresholds: DetectorThresholds) {
        self.thresholds.insert(network_id, thresholds);
    }

    fn thresholds_for(&self, network_id: i64) -> DetectorThresholds {
        self.thresholds.get(&network_id).copied().unwrap_or_default()
    }

    /// Feed one heartbeat observation; returns any incidents it triggers
    /// (detectors A and B).
    pub fn observe_heartbeat(
        &mut self,
        network_id: i64,
        peer_id: i64,
        public_key: &str,
        session: SessionId,
        endpoint: Option<SocketAddr>,
        now: SystemTime,
    ) -> Vec<DetectedIncident> {
        let thresholds = self.thresholds_for(network_id);
        let mut out = Vec::new();

        let window = self.claims.entry(peer_id).or_default();
        window.retain(|c| now.duration_since(c.at).unwrap_or_default() <= Duration::from_secs(thresholds.session_conflict_threshold_secs));

        // Detector A — shared_config: same public key, two distinct
        // sessions, different reported endpoints, within the shared-config
        // window.
        for prior in window.iter() {
            if prior.session == session {
                continue;
            }
            let within_window = now.duration_since(prior.at).unwrap_or_default()
                <= Duration::from_secs(thresholds.shared_config_window_secs);
            if within_window && prior.endpoint != endpoint {
                out.push(DetectedIncident {
                    peer_id,
                    kind: IncidentKind::SharedConfig,
                    public_key: public_key.to_string(),
                    endpoints: endpoint.into_iter().map(Endpoint::from).collect(),
                    detail: format!(
                        "public key {public_key} observed with endpoint {:?} from session {:?}, conflicting with session {:?} at {:?}",
                        endpoint, session, prior.session, prior.endpoint
                    ),
                });
            }
        }

        // Detector B — session_conflict: any other session still "live"
        // (within the threshold, already enforced by the retain above)
        // claiming the same peer id.
        if window.iter().any(|c| c.session != session) {
            out.push(DetectedIncident {
                peer_id,
                kind: IncidentKind::SessionConflict,
                public_key: public_key.to_string(),
                endpoints: endpoint.into_iter().map(Endpoint::from).collect(),
                detail: format!("peer id {peer_id} claimed by more than one live session"),
            });
        }

        window.push_back(Claim { session, endpoint, at: now });
        out
    }

    /// Feed one endpoint-change record; returns an incident if this
    /// change trips detector C's rolling-24h threshold.
    pub fn observe_endpoint_change(&mut self, network_id: i64, peer_id: i64, public_key: &str, now: SystemTime) -> Option<DetectedIncident> {
        let thresholds = self.thresholds_for(network_id);
        let window = self.endpoint_changes.entry(peer_id).or_default();
        window.retain(|t| now.duration_since(*t).unwrap_or_default() <= Duration::from_secs(24 * 60 * 60));
        window.push_back(now);

        if window.len() as u32 > thresholds.max_endpoint_changes_per_day {
            Some(DetectedIncident {
                peer_id,
                kind: IncidentKind::SuspiciousActivity,
                public_key: public_key.to_string(),
                endpoints: vec![],
                detail: format!("{} endpoint changes for peer {peer_id} in the last 24h", window.len()),
            })
        } else {
            None
        }
    }

    /// Drops all state for a peer (on deletion).
    pub fn forget_peer(&mut self, peer_id: i64) {
        self.claims.remove(&peer_id);
        self.endpoint_changes.remove(&peer_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    /// §8 scenario 4: two sessions claim the same peer with different
    /// endpoints within 5 minutes.
    #[test]
    fn detector_a_flags_shared_config() {
        let mut engine = IncidentEngine::new();
        let e1: SocketAddr = "1.2.3.4:51820".parse().unwrap();
        let e2: SocketAddr = "5.6.7.8:51820".parse().unwrap();

        let first = engine.observe_heartbeat(1, 42, "ABC", SessionId(1), Some(e1), t(0));
        assert!(first.is_empty());

        let second = engine.observe_heartbeat(1, 42, "ABC", SessionId(2), Some(e2), t(60));
        assert!(second.iter().any(|i| i.kind == IncidentKind::SharedConfig));
        assert!(second.iter().any(|i| i.kind == IncidentKind::SessionConflict));
    }

    #[test]
    fn detector_a_ignores_same_session_reporting_twice() {
        let mut engine = IncidentEngine::new();
        let e1: SocketAddr = "1.2.3.4:51820".parse().unwrap();
        let e2: SocketAddr = "1.2.3.5:51820".parse().unwrap();
        engine.observe_heartbeat(1, 42, "ABC", SessionId(1), Some(e1), t(0));
        let second = engine.observe_heartbeat(1, 42, "ABC", SessionId(1), Some(e2), t(30));
        assert!(second.is_empty());
    }

    #[test]
    fn detector_a_ignores_conflicts_outside_window() {
        let mut engine = IncidentEngine::new();
        let e1: SocketAddr = "1.2.3.4:51820".parse().unwrap();
        let e2: SocketAddr = "5.6.7.8:51820".parse().unwrap();
        engine.observe_heartbeat(1, 42, "ABC", SessionId(1), Some(e1), t(0));
        let second = engine.observe_heartbeat(1, 42, "ABC", SessionId(2), Some(e2), t(600));
        assert!(second.iter().all(|i| i.kind != IncidentKind::SharedConfig));
    }

    /// §8 scenario 5: the 11th endpoint change in 24h trips detector C.
    #[test]
    fn detector_c_trips_on_eleventh_change() {
        let mut engine = IncidentEngine::new();
        let mut last = None;
        for i in 0..11u64 {
            last = engine.observe_endpoint_change(1, 7, "ABC", t(i * 60));
        }
        assert!(last.is_some());
        assert_eq!(last.unwrap().kind, IncidentKind::SuspiciousActivity);
    }

    #[test]
    fn detector_c_does_not_trip_under_threshold() {
        let mut engine = IncidentEngine::new();
        for i in 0..10u64 {
            let incident = engine.observe_endpoint_change(1, 7, "ABC", t(i * 60));
            assert!(incident.is_none());
        }
    }
}
