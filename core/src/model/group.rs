use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    time::SystemTime,
};

/// The default priority assigned to a new group (§3). Lower priorities are
/// evaluated first by the synthesizer (§4.4 Step 4).
pub const DEFAULT_GROUP_PRIORITY: u16 = 100;

/// A set of peers with attached policies and routes.
///
/// Note (§9 Open questions): a group literally named "quarantine" has no
/// special-cased behavior here — priority is ordinary numeric priority, and
/// a caller that wants quarantine semantics sets priority 0 explicitly.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: i64,
    pub network_id: i64,
    pub name: String,
    pub priority: u16,
    pub description: String,
    #[serde(with = "crate::util::unix_time")]
    pub created_at: SystemTime,
    pub peer_ids: HashSet<i64>,
    /// Ordered list of attached policies; ordering is the attachment order
    /// used by the synthesizer (§4.4 Step 4).
    pub policy_ids: Vec<i64>,
    pub route_ids: HashSet<i64>,
}
