//! Validation Engine (§4.5). Runs inside the per-network serialized
//! section, after the Data Model Store is read and before a mutating write
//! commits — callers invoke these checks with a freshly loaded [`World`]
//! and fail the whole operation on the first violated invariant.

use crate::error::{CoreError, CoreResult};
use crate::world::World;
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// §4.5 CircularRoutingV1 — adding peer `peer_id` to group `group_id`.
pub fn check_add_peer_to_group(world: &World, peer_id: i64, group_id: i64) -> CoreResult<()> {
    let peer = world.peer(peer_id).ok_or(CoreError::NotFound)?;
    if !peer.is_jump {
        return Ok(());
    }
    let group = world.group(group_id).ok_or(CoreError::NotFound)?;
    let offending: Vec<i64> = group
        .route_ids
        .iter()
        .filter_map(|rid| world.route(*rid))
        .filter(|r| r.jump_peer_id == peer_id)
        .map(|r| r.id)
        .collect();
    if offending.is_empty() {
        Ok(())
    } else {
        Err(CoreError::CircularRouting { peer_id, group_id, route_ids: offending })
    }
}

/// §4.5 CircularRoutingV2 — attaching route `route_id` to group `group_id`.
pub fn check_attach_route_to_group(world: &World, route_id: i64, group_id: i64) -> CoreResult<()> {
    let route = world.route(route_id).ok_or(CoreError::NotFound)?;
    let group = world.group(group_id).ok_or(CoreError::NotFound)?;
    if group.peer_ids.contains(&route.jump_peer_id) {
        Err(CoreError::CircularRouting {
            peer_id: route.jump_peer_id,
            group_id,
            route_ids: vec![route_id],
        })
    } else {
        Ok(())
    }
}

/// §4.5 "IP-version coherence". The core is IPv4-only today (§9); this
/// exists so a future dual-stack Network can plug in a real family check
/// without touching call sites.
pub fn check_ip_version_coherence(_destination_cidr: Ipv4Net) -> CoreResult<()> {
    Ok(())
}

/// §4.5 "DNS-mapping in-range".
pub fn check_dns_mapping_in_range(world: &World, route_id: i64, ip: Ipv4Addr) -> CoreResult<()> {
    let route = world.route(route_id).ok_or(CoreError::NotFound)?;
    if route.destination_cidr.contains(&ip) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "{ip} is not inside route destination {}",
            route.destination_cidr
        )))
    }
}

/// §4.5 "CIDR change" — rejected if the network has any peer with
/// `use_agent == false` (their config was copied out by hand and a CIDR
/// change would silently break it).
pub fn check_cidr_change_allowed(world: &World) -> CoreResult<()> {
    if world.peers.iter().any(|p| !p.use_agent) {
        Err(CoreError::DependencyBlocked(
            "network has static (non-agent) peers; CIDR change is blocked".into(),
        ))
    } else {
        Ok(())
    }
}

/// §4.5 "Jump preconditions", first-peer case: the first peer created in an
/// otherwise-empty network must be a jump peer.
pub fn check_first_peer_is_jump(world: &World, is_jump: bool) -> CoreResult<()> {
    if !world.peers.is_empty() || is_jump {
        Ok(())
    } else {
        Err(CoreError::Validation(
            "the first peer in a network must be a jump peer".into(),
        ))
    }
}

/// §4.5 "Jump preconditions", retention case: deleting `peer_id` (a jump
/// peer) must leave at least one jump while the network still has regular
/// peers.
pub fn check_jump_retained_on_delete(world: &World, peer_id: i64) -> CoreResult<()> {
    let peer = world.peer(peer_id).ok_or(CoreError::NotFound)?;
    if !peer.is_jump {
        return Ok(());
    }
    let remaining_jumps = world.jump_peers().filter(|p| p.id != peer_id).count();
    let remaining_regular = world.peers.iter().filter(|p| p.id != peer_id && !p.is_jump).count();
    if remaining_jumps == 0 && remaining_regular > 0 {
        Err(CoreError::DependencyBlocked(
            "deleting this jump peer would leave regular peers without a jump".into(),
        ))
    } else {
        Ok(())
    }
}

/// §4.5 "Jump preconditions", route-deletion / jump-peer-deletion case:
/// cannot delete a jump peer that any route still references, and cannot
/// delete a route while it is attached to a group (checked by the caller
/// via `world.groups` before calling the store delete).
pub fn check_jump_peer_not_referenced(world: &World, peer_id: i64) -> CoreResult<()> {
    let referencing: Vec<i64> = world.routes.iter().filter(|r| r.jump_peer_id == peer_id).map(|r| r.id).collect();
    if referencing.is_empty() {
        Ok(())
    } else {
        Err(CoreError::DependencyBlocked(format!(
            "jump peer is referenced by route(s) {referencing:?}"
        )))
    }
}

pub fn check_route_not_attached_to_group(world: &World, route_id: i64) -> CoreResult<()> {
    let attached: Vec<i64> = world.groups.iter().filter(|g| g.route_ids.contains(&route_id)).map(|g| g.id).collect();
    if attached.is_empty() {
        Ok(())
    } else {
        Err(CoreError::DependencyBlocked(format!(
            "route is attached to group(s) {attached:?}"
        )))
    }
}

/// §8 Invariant: peer address lies inside its network's CIDR.
pub fn check_address_in_cidr(cidr: Ipv4Net, address: Ipv4Addr) -> CoreResult<()> {
    if cidr.contains(&address) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!("{address} is not inside {cidr}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Group, Network, NetworkContents, Peer, PeerContents, Route};
    use std::time::SystemTime;

    fn network() -> Network {
        Network {
            id: 1,
            contents: NetworkContents {
                name: "n".into(),
                cidr: "10.0.0.0/24".parse().unwrap(),
                dns_domain: "mesh.internal".into(),
                created_at: SystemTime::now(),
                updated_at: SystemTime::now(),
            },
        }
    }

    fn jump_peer(id: i64) -> Peer {
        Peer {
            id,
            contents: PeerContents {
                network_id: 1,
                name: "jump".into(),
                public_key: format!("pub{id}"),
                address: "10.0.0.1".parse().unwrap(),
                endpoint: Some("jump.example.com:51820".parse().unwrap()),
                listen_port: Some(51820),
                is_jump: true,
                use_agent: true,
                nat_forwarding_interface: None,
                owner_id: None,
                extra_allowed_ips: vec![],
                created_at: SystemTime::now(),
                updated_at: SystemTime::now(),
            },
        }
    }

    fn regular_peer(id: i64, address: &str) -> Peer {
        Peer {
            id,
            contents: PeerContents {
                network_id: 1,
                name: format!("peer{id}"),
                public_key: format!("pub{id}"),
                address: address.parse().unwrap(),
                endpoint: None,
                listen_port: None,
                is_jump: false,
                use_agent: true,
                nat_forwarding_interface: None,
                owner_id: None,
                extra_allowed_ips: vec![],
                created_at: SystemTime::now(),
                updated_at: SystemTime::now(),
            },
        }
    }

    fn world_with(peers: Vec<Peer>, groups: Vec<Group>, routes: Vec<Route>) -> World {
        World {
            network: network(),
            peers,
            groups,
            policies: Default::default(),
            routes,
            dns_mappings: vec![],
            blocking_set: Default::default(),
            whitelist_set: Default::default(),
            upstream_resolvers: vec![],
        }
    }

    /// §8 scenario 1: adding the jump peer itself to a group holding the
    /// route it jumps for is circular.
    #[test]
    fn circular_routing_v1_on_peer_add() {
        let j = jump_peer(1);
        let route = Route {
            id: 10,
            network_id: 1,
            name: "r".into(),
            destination_cidr: "192.168.1.0/24".parse().unwrap(),
            jump_peer_id: 1,
            dns_suffix: String::new(),
        };
        let group = Group {
            id: 100,
            network_id: 1,
            name: "g".into(),
            priority: 100,
            description: String::new(),
            created_at: SystemTime::now(),
            peer_ids: Default::default(),
            policy_ids: vec![],
            route_ids: [10].into_iter().collect(),
        };
        let world = world_with(vec![j], vec![group], vec![route]);

        let err = check_add_peer_to_group(&world, 1, 100).unwrap_err();
        assert!(matches!(err, CoreError::CircularRouting { peer_id: 1, group_id: 100, .. }));
    }

    #[test]
    fn circular_routing_v1_allows_regular_peer() {
        let j = jump_peer(1);
        let r = regular_peer(2, "10.0.0.2");
        let route = Route {
            id: 10,
            network_id: 1,
            name: "r".into(),
            destination_cidr: "192.168.1.0/24".parse().unwrap(),
            jump_peer_id: 1,
            dns_suffix: String::new(),
        };
        let group = Group {
            id: 100,
            network_id: 1,
            name: "g".into(),
            priority: 100,
            description: String::new(),
            created_at: SystemTime::now(),
            peer_ids: Default::default(),
            policy_ids: vec![],
            route_ids: [10].into_iter().collect(),
        };
        let world = world_with(vec![j, r], vec![group], vec![route]);

        check_add_peer_to_group(&world, 2, 100).unwrap();
    }

    /// §8 scenario 2: route-attach direction of the same conflict.
    #[test]
    fn circular_routing_v2_on_route_attach() {
        let j = jump_peer(1);
        let route = Route {
            id: 10,
            network_id: 1,
            name: "r".into(),
            destination_cidr: "192.168.1.0/24".parse().unwrap(),
            jump_peer_id: 1,
            dns_suffix: String::new(),
        };
        let group = Group {
            id: 200,
            network_id: 1,
            name: "g2".into(),
            priority: 100,
            description: String::new(),
            created_at: SystemTime::now(),
            peer_ids: [1].into_iter().collect(),
            policy_ids: vec![],
            route_ids: Default::default(),
        };
        let world = world_with(vec![j], vec![group], vec![route]);

        let err = check_attach_route_to_group(&world, 10, 200).unwrap_err();
        assert!(matches!(err, CoreError::CircularRouting { peer_id: 1, group_id: 200, .. }));
    }

    #[test]
    fn cidr_change_blocked_by_static_peer() {
        let mut p = regular_peer(2, "10.0.0.2");
        p.contents.use_agent = false;
        let world = world_with(vec![p], vec![], vec![]);
        assert!(matches!(check_cidr_change_allowed(&world), Err(CoreError::DependencyBlocked(_))));
    }

    #[test]
    fn first_peer_must_be_jump() {
        let world = world_with(vec![], vec![], vec![]);
        assert!(check_first_peer_is_jump(&world, false).is_err());
        assert!(check_first_peer_is_jump(&world, true).is_ok());
    }

    #[test]
    fn jump_retained_while_regular_peers_exist() {
        let j = jump_peer(1);
        let r = regular_peer(2, "10.0.0.2");
        let world = world_with(vec![j, r], vec![], vec![]);
        assert!(matches!(check_jump_retained_on_delete(&world, 1), Err(CoreError::DependencyBlocked(_))));
    }
}
