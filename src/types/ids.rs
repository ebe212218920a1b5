//! Numeric and string identifiers used throughout the election engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Chain-consensus clock tick count (not wall-clock time)
pub type LogicTime = u64;

/// Network (chain) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct NetworkId(pub u32);

/// Zone identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ZoneId(pub u8);

/// Cluster identifier within a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ClusterId(pub u8);

/// Group identifier within a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct GroupId(pub u8);

/// The zone that hosts auditor and validator groups
pub const CONSENSUS_ZONE_ID: ZoneId = ZoneId(0);

/// The only cluster in the consensus zone
pub const DEFAULT_CLUSTER_ID: ClusterId = ClusterId(1);

/// Auditor group ids occupy `[AUDITOR_GROUP_ID_BEGIN, AUDITOR_GROUP_ID_END)`
pub const AUDITOR_GROUP_ID_BEGIN: u8 = 1;
pub const AUDITOR_GROUP_ID_END: u8 = 64;

/// Validator group ids occupy `[VALIDATOR_GROUP_ID_BEGIN, VALIDATOR_GROUP_ID_END)`
pub const VALIDATOR_GROUP_ID_BEGIN: u8 = 64;
pub const VALIDATOR_GROUP_ID_END: u8 = 127;

impl GroupId {
    /// Id of the auditor group at `index` (0-based).
    ///
    /// Callers bound `index` by the governance auditor group count, which
    /// is validated to fit the auditor id range.
    pub fn auditor(index: u16) -> Self {
        GroupId(AUDITOR_GROUP_ID_BEGIN.wrapping_add(index as u8))
    }

    /// Id of the validator group at `index` (0-based)
    pub fn validator(index: u16) -> Self {
        GroupId(VALIDATOR_GROUP_ID_BEGIN.wrapping_add(index as u8))
    }

    pub fn is_auditor(&self) -> bool {
        (AUDITOR_GROUP_ID_BEGIN..AUDITOR_GROUP_ID_END).contains(&self.0)
    }

    pub fn is_validator(&self) -> bool {
        (VALIDATOR_GROUP_ID_BEGIN..VALIDATOR_GROUP_ID_END).contains(&self.0)
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node identity (the node's account string)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}
