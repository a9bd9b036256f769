//! Seeded random streams
//!
//! Every independent unit of work (a CV fold, a permutation trial, a
//! bootstrap resample, a forest tree) draws from its own generator. Sub-seeds
//! are derived from a root seed, a stream label, and a work-unit index, so a
//! unit's randomness does not depend on scheduling order or on how many other
//! units exist.

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Root of a family of reproducible random streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeedSequence {
    root: u64,
}

impl SeedSequence {
    /// Create a sequence from a root seed
    pub const fn new(root: u64) -> Self {
        Self { root }
    }

    /// Root seed
    pub const fn root(&self) -> u64 {
        self.root
    }

    /// Derive the seed for work unit `index` of stream `stream`
    pub fn derive(&self, stream: &str, index: u64) -> u64 {
        let labelled = splitmix64(self.root ^ fnv1a(stream));
        splitmix64(labelled.wrapping_add(splitmix64(index)))
    }

    /// Nested sequence for a work unit that spawns its own streams
    pub fn child(&self, stream: &str, index: u64) -> Self {
        Self::new(self.derive(stream, index))
    }

    /// Generator for work unit `index` of stream `stream`
    pub fn rng(&self, stream: &str, index: u64) -> StdRng {
        StdRng::seed_from_u64(self.derive(stream, index))
    }
}

/// SplitMix64 finalizer
const fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// FNV-1a hash of a stream label (stable across builds, unlike `std::hash`)
fn fnv1a(label: &str) -> u64 {
    let mut hash: u64 = 0xCBF2_9CE4_8422_2325;
    for byte in label.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
    }
    hash
}
