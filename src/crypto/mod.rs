//! Cryptography module - BLAKE3 digests, seed derivation, consensus keys

mod hash;
mod seed;
mod keys;

pub use hash::*;
pub use seed::*;
pub use keys::*;
