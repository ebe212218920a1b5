//! Chain module - committed block snapshots and historical reads

mod block;
mod reader;

pub use block::*;
pub use reader::*;
