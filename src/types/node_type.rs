//! Node roles and role sets

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a node can be elected into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Rec,
    Zec,
    Archive,
    ConsensusAuditor,
    ConsensusValidator,
    Edge,
}

impl NodeType {
    pub const ALL: [NodeType; 6] = [
        NodeType::Rec,
        NodeType::Zec,
        NodeType::Archive,
        NodeType::ConsensusAuditor,
        NodeType::ConsensusValidator,
        NodeType::Edge,
    ];

    fn bit(self) -> u16 {
        match self {
            NodeType::Rec => 1 << 0,
            NodeType::Zec => 1 << 1,
            NodeType::Archive => 1 << 2,
            NodeType::ConsensusAuditor => 1 << 3,
            NodeType::ConsensusValidator => 1 << 4,
            NodeType::Edge => 1 << 5,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::Rec => "rec",
            NodeType::Zec => "zec",
            NodeType::Archive => "archive",
            NodeType::ConsensusAuditor => "auditor",
            NodeType::ConsensusValidator => "validator",
            NodeType::Edge => "edge",
        };
        f.write_str(name)
    }
}

/// Set of node types, used to address broadcast destinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeTypeSet(u16);

impl NodeTypeSet {
    /// Committee (beacon) nodes, which are not an electable role
    const COMMITTEE_BIT: u16 = 1 << 15;

    pub const fn empty() -> Self {
        NodeTypeSet(0)
    }

    pub fn all() -> Self {
        NodeType::ALL
            .iter()
            .fold(Self::empty().with_committee(), |set, t| set.with(*t))
    }

    pub fn with(mut self, node_type: NodeType) -> Self {
        self.0 |= node_type.bit();
        self
    }

    pub fn with_committee(mut self) -> Self {
        self.0 |= Self::COMMITTEE_BIT;
        self
    }

    pub fn contains(&self, node_type: NodeType) -> bool {
        self.0 & node_type.bit() != 0
    }

    pub fn has_committee(&self) -> bool {
        self.0 & Self::COMMITTEE_BIT != 0
    }

    pub fn is_all(&self) -> bool {
        *self == Self::all()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<NodeType> for NodeTypeSet {
    fn from_iter<I: IntoIterator<Item = NodeType>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), |set, t| set.with(t))
    }
}
