//! Election module - result store, association table, group elector,
//! rotation scheduler and genesis bootstrap

mod association;
mod elector;
mod genesis;
mod result;
mod scheduler;

pub use association::*;
pub use elector::*;
pub use genesis::*;
pub use result::*;
pub use scheduler::*;
