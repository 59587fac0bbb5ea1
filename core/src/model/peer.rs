use super::Endpoint;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::{net::Ipv4Addr, time::SystemTime};

/// One endpoint on the mesh. The private key is kept out of this struct
/// entirely (see [`PeerSecret`]) so that a `Peer` can always be handed to a
/// public-facing response without risk of leaking it — mirroring the
/// teacher's separation of `PeerContents` (public) from the keypair
/// generated alongside it in `peer::make_peer_contents_and_key_pair`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Peer {
    pub id: i64,
    #[serde(flatten)]
    pub contents: PeerContents,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerContents {
    pub network_id: i64,
    pub name: String,
    pub public_key: String,
    pub address: Ipv4Addr,
    pub endpoint: Option<Endpoint>,
    pub listen_port: Option<u16>,
    pub is_jump: bool,
    pub use_agent: bool,
    pub nat_forwarding_interface: Option<String>,
    pub owner_id: Option<String>,
    #[serde(default)]
    pub extra_allowed_ips: Vec<Ipv4Net>,
    #[serde(with = "crate::util::unix_time")]
    pub created_at: SystemTime,
    #[serde(with = "crate::util::unix_time")]
    pub updated_at: SystemTime,
}

impl std::ops::Deref for Peer {
    type Target = PeerContents;

    fn deref(&self) -> &Self::Target {
        &self.contents
    }
}

/// The private half of a peer's keypair. Never serialized into a `Peer`;
/// only read by the synthesizer when building that peer's own outbound
/// `[Interface]` block (§4.4 Step 1), and only handed to that peer's own
/// channel or enrollment response — never to a REST listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerSecret {
    pub peer_id: i64,
    pub private_key: String,
}

/// A symmetric key shared by exactly two peers, created lazily on first
/// need and memoized until either peer is deleted (§3, §4.4 Step 2).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresharedKey {
    pub peer_a: i64,
    pub peer_b: i64,
    pub key: String,
}

impl PresharedKey {
    /// Canonical (low, high) ordering so (A,B) and (B,A) hash and compare
    /// identically — the pair is unordered per §3.
    pub fn pair_key(a: i64, b: i64) -> (i64, i64) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

/// Append-only record of an observed endpoint change for a peer (§3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointChangeRecord {
    pub id: i64,
    pub peer_id: i64,
    pub old_endpoint: Option<Endpoint>,
    pub new_endpoint: Option<Endpoint>,
    pub at: SystemTime,
    pub source: EndpointChangeSource,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointChangeSource {
    AgentSelf,
    AgentRemote,
}
