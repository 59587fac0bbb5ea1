//! Textual WireGuard interface format (§6). Renders a [`SynthesizedConfig`]
//! into the `[Interface]`/`[Peer]` text an agent writes to its local
//! `wg-quick`-style config file. Purely textual — no kernel or netlink
//! interaction, which stays agent-side and out of scope (§1).

use crate::synth::SynthesizedConfig;
use std::fmt::Write as _;

pub fn render_interface_config(config: &SynthesizedConfig) -> String {
    let mut out = String::new();

    writeln!(out, "[Interface]").unwrap();
    writeln!(out, "PrivateKey = {}", config.interface_block.private_key).unwrap();
    writeln!(out, "Address = {}", config.interface_block.address).unwrap();
    if let Some(port) = config.interface_block.listen_port {
        writeln!(out, "ListenPort = {port}").unwrap();
    }
    if let Some(dns) = config.interface_block.dns {
        writeln!(out, "DNS = {dns}").unwrap();
    }

    for peer in &config.peer_blocks {
        writeln!(out).unwrap();
        writeln!(out, "# Name: {}", peer.name).unwrap();
        writeln!(out, "[Peer]").unwrap();
        writeln!(out, "PublicKey = {}", peer.public_key).unwrap();
        writeln!(out, "PresharedKey = {}", peer.preshared_key).unwrap();
        let allowed_ips = peer.allowed_ips.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        writeln!(out, "AllowedIPs = {allowed_ips}").unwrap();
        if let Some(endpoint) = &peer.endpoint {
            writeln!(out, "Endpoint = {endpoint}").unwrap();
        }
        writeln!(out, "PersistentKeepalive = {}", peer.persistent_keepalive).unwrap();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PERSISTENT_KEEPALIVE_INTERVAL_SECS;
    use crate::synth::{InterfaceBlock, PeerBlock};

    /// §8 scenario 3: synthesized config for a regular peer behind a jump.
    #[test]
    fn renders_scenario_three() {
        let config = SynthesizedConfig {
            interface_block: InterfaceBlock {
                private_key: "PRIVATE".into(),
                address: "10.0.0.10".parse().unwrap(),
                listen_port: None,
                dns: Some("10.0.0.1".parse().unwrap()),
            },
            peer_blocks: vec![PeerBlock {
                public_key: "JUMPPUBKEY".into(),
                name: "jump".into(),
                preshared_key: "PSK1".into(),
                allowed_ips: vec!["10.0.0.0/24".parse().unwrap(), "192.168.1.0/24".parse().unwrap()],
                endpoint: Some("jump.example.com:51820".parse().unwrap()),
                persistent_keepalive: PERSISTENT_KEEPALIVE_INTERVAL_SECS,
            }],
            firewall_policy: None,
            dns_payload: None,
            whitelist_payload: None,
        };

        let rendered = render_interface_config(&config);
        assert!(rendered.contains("Address = 10.0.0.10"));
        assert!(rendered.contains("PublicKey = JUMPPUBKEY"));
        assert!(rendered.contains("PresharedKey = PSK1"));
        assert!(rendered.contains("AllowedIPs = 10.0.0.0/24, 192.168.1.0/24"));
        assert!(rendered.contains("Endpoint = jump.example.com:51820"));
        assert!(rendered.contains("PersistentKeepalive = 25"));
    }
}
