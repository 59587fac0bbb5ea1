use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// A logical WireGuard mesh: an address pool (IPv4 CIDR) and a DNS suffix.
///
/// Deleting a Network cascades to its Peers, Groups, Policies, Routes, DNS
/// Mappings and Incidents (§3 Ownership summary).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Network {
    pub id: i64,
    #[serde(flatten)]
    pub contents: NetworkContents,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkContents {
    pub name: String,
    pub cidr: Ipv4Net,
    pub dns_domain: String,
    #[serde(with = "crate::util::unix_time")]
    pub created_at: SystemTime,
    #[serde(with = "crate::util::unix_time")]
    pub updated_at: SystemTime,
}

impl std::ops::Deref for Network {
    type Target = NetworkContents;

    fn deref(&self) -> &Self::Target {
        &self.contents
    }
}
