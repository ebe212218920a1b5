//! Dispatch module - routes timer and block events to system contract calls

mod contract_info;
mod outbound;
mod role_context;

pub use contract_info::*;
pub use outbound::*;
pub use role_context::*;
