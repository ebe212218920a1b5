//! Configuration - on-chain governance parameters and node settings

mod governance;
mod node;

pub use governance::*;
pub use node::*;
