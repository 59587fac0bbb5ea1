use std::time::SystemTime;

/// Binds an opaque token to `(network_id, peer_id)` at issuance (§3, §4.8).
/// Static (non-agent) peers never have one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnrollmentToken {
    pub token: String,
    pub network_id: i64,
    pub peer_id: i64,
    pub created_at: SystemTime,
}
