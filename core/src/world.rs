//! Assembles the `W` the Config Synthesizer reads (§4.4): "all peers in N,
//! all groups membership maps, ordered policies per group, routes, DNS
//! mappings, preshared keys, current blocking/whitelist sets."
//!
//! This is a snapshot: callers take it under a read guard on the
//! network's coarse lock (§5) and it does not change underneath them.

use crate::error::CoreResult;
use crate::model::{DnsMapping, Group, Network, Peer, Policy, Route};
use crate::store;
use std::{collections::HashMap, net::Ipv4Addr};

pub struct World {
    pub network: Network,
    pub peers: Vec<Peer>,
    pub groups: Vec<Group>,
    pub policies: HashMap<i64, Policy>,
    pub routes: Vec<Route>,
    pub dns_mappings: Vec<DnsMapping>,
    pub blocking_set: std::collections::HashSet<Ipv4Addr>,
    pub whitelist_set: std::collections::HashSet<Ipv4Addr>,
    /// Loaded from process configuration, not the store (§4.4 Step 5 "Include
    /// upstream resolvers from config").
    pub upstream_resolvers: Vec<Ipv4Addr>,
}

impl World {
    pub fn load(conn: &rusqlite::Connection, network_id: i64, upstream_resolvers: Vec<Ipv4Addr>) -> CoreResult<World> {
        let network = store::NetworkStore::get(conn, network_id)?;
        let peers = store::PeerStore::list_by_network(conn, network_id)?;
        let groups = store::GroupStore::list_by_network(conn, network_id)?;
        let routes = store::RouteStore::list_by_network(conn, network_id)?;
        let dns_mappings = store::DnsMappingStore::list_by_network(conn, network_id)?;
        let blocking_set = store::AclStore::list_blocked(conn, network_id)?;
        let whitelist_set = store::AclStore::list_whitelisted(conn, network_id)?;

        let mut policies = HashMap::new();
        for policy in store::PolicyStore::list_by_network(conn, network_id)? {
            policies.insert(policy.id, policy);
        }

        Ok(World {
            network,
            peers,
            groups,
            policies,
            routes,
            dns_mappings,
            blocking_set,
            whitelist_set,
            upstream_resolvers,
        })
    }

    pub fn peer(&self, id: i64) -> Option<&Peer> {
        self.peers.iter().find(|p| p.id == id)
    }

    pub fn group(&self, id: i64) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn route(&self, id: i64) -> Option<&Route> {
        self.routes.iter().find(|r| r.id == id)
    }

    pub fn jump_peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter().filter(|p| p.is_jump)
    }

    /// The jump peer this network's regular peers resolve their `DNS =`
    /// line to (§4.4 Step 1). Networks are expected to carry exactly one
    /// jump for this purpose (§4.5 "at least one jump while it has regular
    /// peers"); if several exist, the lowest-id jump is canonical.
    pub fn primary_jump(&self) -> Option<&Peer> {
        self.jump_peers().min_by_key(|p| p.id)
    }

    pub fn groups_containing(&self, peer_id: i64) -> Vec<&Group> {
        self.groups.iter().filter(|g| g.peer_ids.contains(&peer_id)).collect()
    }

    pub fn routes_by_jump(&self, jump_peer_id: i64) -> Vec<&Route> {
        self.routes.iter().filter(|r| r.jump_peer_id == jump_peer_id).collect()
    }
}
