use super::Endpoint;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum IncidentKind {
    SharedConfig,
    SessionConflict,
    SuspiciousActivity,
}

/// A persisted detection record; remains until an administrator resolves
/// it (§3, §4.7). Incidents are additive — they are never merged.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityIncident {
    pub id: i64,
    pub peer_id: i64,
    pub network_id: i64,
    pub kind: IncidentKind,
    #[serde(with = "crate::util::unix_time")]
    pub detected_at: SystemTime,
    pub public_key: String,
    pub endpoints: Vec<Endpoint>,
    pub detail: String,
    pub resolved: bool,
    pub resolved_by: Option<String>,
    #[serde(with = "crate::util::unix_time_opt")]
    pub resolved_at: Option<SystemTime>,
}

/// Per-network thresholds for the detectors (§4.7, configurable).
#[derive(Clone, Copy, Debug)]
pub struct DetectorThresholds {
    pub shared_config_window_secs: u64,
    pub session_conflict_threshold_secs: u64,
    pub max_endpoint_changes_per_day: u32,
}

impl Default for DetectorThresholds {
    fn default() -> Self {
        Self {
            shared_config_window_secs: 5 * 60,
            session_conflict_threshold_secs: 5 * 60,
            max_endpoint_changes_per_day: 10,
        }
    }
}
