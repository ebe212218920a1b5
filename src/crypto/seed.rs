//! Deterministic randomness for elections
//!
//! Every replica must derive the identical committee from the same inputs, so
//! all randomness is a pure function of the per-tick seed. The stream is the
//! BLAKE3 extendable output keyed by the seed and a domain tag.

use super::hash_bytes;

/// Collapse the raw random seed bytes into the 64-bit election seed
pub fn seed_from_bytes(bytes: &[u8]) -> u64 {
    let digest = hash_bytes(bytes);
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest.0[..8]);
    u64::from_le_bytes(word)
}

/// Reproducible pseudo-random stream
pub struct SeedStream {
    reader: blake3::OutputReader,
}

impl SeedStream {
    /// Create a stream for `seed` separated by the `domain` parts
    pub fn new(seed: u64, domain: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&seed.to_le_bytes());
        for part in domain {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        Self {
            reader: hasher.finalize_xof(),
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut word = [0u8; 8];
        self.reader.fill(&mut word);
        u64::from_le_bytes(word)
    }

    /// Uniform value in `[0, bound)`; `bound` must be non-zero.
    ///
    /// Uses rejection sampling so the result carries no modulo bias.
    pub fn next_below(&mut self, bound: u64) -> u64 {
        debug_assert!(bound > 0);
        let limit = u64::MAX - u64::MAX % bound;
        loop {
            let value = self.next_u64();
            if value < limit {
                return value % bound;
            }
        }
    }
}
