use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// A destination CIDR reached via a specific jump peer (§3).
///
/// Invariant enforced by the Validation Engine: deletion is blocked while
/// attached to a group, and the jump peer cannot be deleted while any route
/// references it (§4.5).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Route {
    pub id: i64,
    pub network_id: i64,
    pub name: String,
    pub destination_cidr: Ipv4Net,
    pub jump_peer_id: i64,
    pub dns_suffix: String,
}

/// `{name.suffix, ip}` entry attached to a route (§3).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnsMapping {
    pub id: i64,
    pub route_id: i64,
    pub name: String,
    pub ip: Ipv4Addr,
}
