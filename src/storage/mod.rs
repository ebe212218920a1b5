//! Storage module - contract property store, staged tick writes, sled persistence

mod property;
mod staged;
pub mod db;

pub use property::*;
pub use staged::*;
