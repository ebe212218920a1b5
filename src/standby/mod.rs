//! Standby pool: nodes registered as eligible for election, by role

mod contract;
mod node_info;
mod registration;

pub use contract::*;
pub use node_info::*;
pub use registration::*;
