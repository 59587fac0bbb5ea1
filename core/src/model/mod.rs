//! The entity types of §3: networks, peers, groups, policies, routes, DNS
//! mappings, agent sessions, endpoint-change records, incidents, users,
//! auth sessions and enrollment tokens.
//!
//! Entities reference each other by id, never by embedded pointer (see
//! DESIGN.md — Cyclic references); the store resolves ids on demand.

mod agent_session;
mod enrollment;
mod group;
mod incident;
mod network;
mod peer;
mod policy;
mod route;
mod user;

pub use agent_session::*;
pub use enrollment::*;
pub use group::*;
pub use incident::*;
pub use network::*;
pub use peer::*;
pub use policy::*;
pub use route::*;
pub use user::*;

use serde::{Deserialize, Serialize};
use std::{fmt, net::SocketAddr, str::FromStr};

/// An external endpoint: an IP or hostname plus a port. Ported from the
/// teacher's `Endpoint` (innernet `shared::types::Endpoint`), trimmed to
/// the subset the core needs (no DNS resolution here — that belongs to
/// whatever delivers the config text to a socket).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

impl FromStr for Endpoint {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or("endpoint must be in 'host:port' form")?;
        let port: u16 = port.parse().map_err(|_| "couldn't parse port")?;
        if host.is_empty() {
            return Err("endpoint host must not be empty");
        }
        Ok(Endpoint {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Serialize for Endpoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Endpoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

pub const PERSISTENT_KEEPALIVE_INTERVAL_SECS: u16 = 25;
