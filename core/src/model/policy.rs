use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RuleAction {
    Allow,
    Deny,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RuleTarget {
    Cidr(Ipv4Net),
    Peer(i64),
    Group(i64),
}

/// One entry in a [`Policy`]'s ordered rule list. Rules within a policy are
/// evaluated in `rule_order`; the first match wins (§4.4 Step 4).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyRule {
    pub direction: Direction,
    pub action: RuleAction,
    pub target: RuleTarget,
    pub rule_order: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Policy {
    pub id: i64,
    pub network_id: i64,
    pub name: String,
    pub rules: Vec<PolicyRule>,
}
