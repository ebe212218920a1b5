//! Common identifiers - networks, zones, clusters, groups, nodes and accounts

mod ids;
mod node_type;
mod address;

pub use ids::*;
pub use node_type::*;
pub use address::*;
