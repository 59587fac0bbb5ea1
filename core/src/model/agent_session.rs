use std::{collections::HashMap, net::SocketAddr, time::SystemTime};

/// Created on first heartbeat after a channel opens, updated on every
/// heartbeat, garbage-collected on channel close plus a grace period (§3,
/// §4.6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentSession {
    pub id: i64,
    pub peer_id: i64,
    pub hostname: String,
    pub system_uptime_secs: u64,
    pub wireguard_uptime_secs: u64,
    pub nat_endpoint: Option<SocketAddr>,
    pub peer_endpoints: HashMap<String, SocketAddr>,
    pub first_seen: SystemTime,
    pub last_seen: SystemTime,
}

/// Inbound heartbeat frame, agent -> server (§4.6 "Message types (agent -> server)").
#[derive(Clone, Debug, serde::Deserialize)]
pub struct Heartbeat {
    pub hostname: String,
    pub system_uptime: u64,
    pub wireguard_uptime: u64,
    #[serde(default)]
    pub peer_endpoints: HashMap<String, SocketAddr>,
}
