//! Config Synthesizer (§4.4) — the centerpiece. A pure function of
//! `(peer, network, world)`, store reads only (the one exception being the
//! lazily-memoized preshared key, created on first need per §3/§4.4 Step 2
//! and persisted through the same connection).
//!
//! Grounded on the teacher's `PeerDiff`/`interface_config` rendering
//! (`shared/src/types.rs`, `shared/src/interface_config.rs`) for the output
//! shape, generalized from "one full mesh" to the jump-topology reachability
//! rules this spec adds.

use crate::error::{CoreError, CoreResult};
use crate::model::{Direction, Endpoint, Peer, RuleAction, RuleTarget, PERSISTENT_KEEPALIVE_INTERVAL_SECS};
use crate::store::PresharedKeyStore;
use crate::world::World;
use ipnet::Ipv4Net;
use serde::Serialize;
use std::net::Ipv4Addr;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceBlock {
    pub private_key: String,
    pub address: Ipv4Addr,
    pub listen_port: Option<u16>,
    pub dns: Option<Ipv4Addr>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerBlock {
    pub public_key: String,
    pub name: String,
    pub preshared_key: String,
    pub allowed_ips: Vec<Ipv4Net>,
    pub endpoint: Option<Endpoint>,
    pub persistent_keepalive: u16,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FirewallRuleEntry {
    pub direction: Direction,
    pub action: RuleAction,
    pub target: RuleTarget,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FirewallPolicy {
    /// IPs currently in the network's blocking set; rendered as a deny-all
    /// prelude ahead of `entries` (§4.4 Step 4, §4.7).
    pub blocked_ips: Vec<Ipv4Addr>,
    pub entries: Vec<FirewallRuleEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DnsEntry {
    pub name: String,
    pub ip: Ipv4Addr,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DnsPayload {
    pub entries: Vec<DnsEntry>,
    pub upstream_resolvers: Vec<Ipv4Addr>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WhitelistPayload {
    pub ips: Vec<Ipv4Addr>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesizedConfig {
    pub interface_block: InterfaceBlock,
    pub peer_blocks: Vec<PeerBlock>,
    pub firewall_policy: Option<FirewallPolicy>,
    pub dns_payload: Option<DnsPayload>,
    pub whitelist_payload: Option<WhitelistPayload>,
}

pub fn synthesize(conn: &rusqlite::Connection, peer_id: i64, private_key: &str, world: &World) -> CoreResult<SynthesizedConfig> {
    let p = world.peer(peer_id).ok_or(CoreError::NotFound)?;

    let dns = if p.is_jump {
        None
    } else {
        world.primary_jump().map(|j| j.address)
    };

    let interface_block = InterfaceBlock {
        private_key: private_key.to_string(),
        address: p.address,
        listen_port: if p.is_jump { p.listen_port } else { None },
        dns,
    };

    let mut peer_blocks = Vec::new();
    for q in &world.peers {
        if q.id == p.id {
            continue;
        }
        if !reachable(world, p, q) {
            continue;
        }

        let psk = PresharedKeyStore::get_or_create(conn, p.id, q.id)?;
        let allowed_ips = allowed_ips_for(world, p, q);

        peer_blocks.push(PeerBlock {
            public_key: q.public_key.clone(),
            name: q.name.clone(),
            preshared_key: psk.key,
            allowed_ips,
            endpoint: q.endpoint.clone(),
            persistent_keepalive: PERSISTENT_KEEPALIVE_INTERVAL_SECS,
        });
    }
    peer_blocks.sort_by(|a, b| a.public_key.cmp(&b.public_key));

    let (firewall_policy, dns_payload, whitelist_payload) = if p.is_jump {
        (
            Some(firewall_policy_for(world)),
            Some(dns_payload_for(world)),
            Some(whitelist_payload_for(world)),
        )
    } else {
        (None, None, None)
    };

    Ok(SynthesizedConfig {
        interface_block,
        peer_blocks,
        firewall_policy,
        dns_payload,
        whitelist_payload,
    })
}

/// §4.4 Step 2.
fn reachable(world: &World, p: &Peer, q: &Peer) -> bool {
    if p.is_jump || q.is_jump {
        return true;
    }

    let p_groups: std::collections::HashSet<i64> = world
        .groups_containing(p.id)
        .into_iter()
        .map(|g| g.id)
        .collect();
    let mut common_groups: Vec<_> = world
        .groups_containing(q.id)
        .into_iter()
        .filter(|g| p_groups.contains(&g.id))
        .collect();
    if common_groups.is_empty() {
        return false;
    }
    common_groups.sort_by_key(|g| (g.priority, g.created_at));

    for group in common_groups {
        for policy_id in &group.policy_ids {
            let Some(policy) = world.policies.get(policy_id) else { continue };
            for rule in &policy.rules {
                if rule.direction != Direction::Output {
                    continue;
                }
                if target_matches(world, &rule.target, q) {
                    return rule.action == RuleAction::Allow;
                }
            }
        }
    }
    false
}

fn target_matches(world: &World, target: &RuleTarget, q: &Peer) -> bool {
    match target {
        RuleTarget::Cidr(cidr) => cidr.contains(&q.address),
        RuleTarget::Peer(id) => *id == q.id,
        RuleTarget::Group(id) => world.group(*id).map(|g| g.peer_ids.contains(&q.id)).unwrap_or(false),
    }
}

/// §4.4 Step 3.
fn allowed_ips_for(world: &World, p: &Peer, q: &Peer) -> Vec<Ipv4Net> {
    let mut ips = Vec::new();

    if q.is_jump {
        ips.push(world.network.cidr);
        for route in world.routes_by_jump(q.id) {
            ips.push(route.destination_cidr);
        }
        ips.extend(q.extra_allowed_ips.iter().copied());
    } else if p.is_jump {
        ips.push(single_host(q.address));
        for route in world.routes_by_jump(p.id) {
            let route_reaches_q = world.groups.iter().any(|g| g.route_ids.contains(&route.id) && g.peer_ids.contains(&q.id));
            if route_reaches_q {
                ips.push(route.destination_cidr);
            }
        }
    } else {
        ips.push(single_host(q.address));
    }

    ips.sort();
    ips.dedup();
    ips
}

fn single_host(addr: Ipv4Addr) -> Ipv4Net {
    Ipv4Net::new(addr, 32).expect("/32 is always a valid prefix length")
}

/// §4.4 Step 4, jump peers only.
fn firewall_policy_for(world: &World) -> FirewallPolicy {
    let mut blocked_ips: Vec<Ipv4Addr> = world.blocking_set.iter().copied().collect();
    blocked_ips.sort();

    let mut groups: Vec<_> = world.groups.iter().collect();
    groups.sort_by_key(|g| (g.priority, g.created_at));

    let mut entries = Vec::new();
    for group in groups {
        for policy_id in &group.policy_ids {
            let Some(policy) = world.policies.get(policy_id) else { continue };
            for rule in &policy.rules {
                entries.push(FirewallRuleEntry {
                    direction: rule.direction,
                    action: rule.action,
                    target: rule.target.clone(),
                });
            }
        }
    }

    FirewallPolicy { blocked_ips, entries }
}

/// §4.4 Step 5, jump peers only.
fn dns_payload_for(world: &World) -> DnsPayload {
    let mut entries: Vec<DnsEntry> = world
        .peers
        .iter()
        .map(|peer| DnsEntry { name: peer.name.clone(), ip: peer.address })
        .collect();

    for mapping in &world.dns_mappings {
        let suffix = world.route(mapping.route_id).map(|r| r.dns_suffix.as_str()).unwrap_or("");
        let name = if suffix.is_empty() {
            mapping.name.clone()
        } else {
            format!("{}.{}", mapping.name, suffix)
        };
        entries.push(DnsEntry { name, ip: mapping.ip });
    }

    entries.sort_by(|a, b| (a.name.clone(), a.ip).cmp(&(b.name.clone(), b.ip)));

    DnsPayload { entries, upstream_resolvers: world.upstream_resolvers.clone() }
}

/// §4.4 Step 6, jump peers only.
fn whitelist_payload_for(world: &World) -> WhitelistPayload {
    let mut ips: Vec<Ipv4Addr> = world
        .peers
        .iter()
        .filter(|peer| !peer.use_agent && world.whitelist_set.contains(&peer.address))
        .map(|peer| peer.address)
        .collect();
    ips.sort();
    WhitelistPayload { ips }
}
