//! Minimal Curve25519 key utilities, trimmed from the full `wireguard-control`
//! crate down to the parts the control plane needs: key generation, base64
//! encoding, and keypair derivation. Kernel device configuration, netlink
//! backends and interface management live on the agent side and are not
//! part of this crate.

mod key;

pub use crate::key::*;
