//! Client-seed sources.
//!
//! The game mixes the client seed with its own entropy, so every round needs
//! a fresh full-width value that cannot be predicted from earlier rounds.

use alloy::primitives::U256;
use rand::rngs::OsRng;
use rand::RngCore;

pub trait SeedSource: Send + Sync {
    fn next_seed(&mut self) -> U256;
}

/// 256-bit seeds from the operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSeedSource;

impl SeedSource for OsSeedSource {
    fn next_seed(&mut self) -> U256 {
        let mut buf = [0u8; 32];
        OsRng.fill_bytes(&mut buf);
        U256::from_be_bytes(buf)
    }
}

/// Replays a fixed list of seeds, cycling when exhausted. For tests.
#[derive(Debug, Clone)]
pub struct FixedSeeds {
    seeds: Vec<U256>,
    next: usize,
}

impl FixedSeeds {
    pub fn new(seeds: Vec<U256>) -> Self {
        Self { seeds, next: 0 }
    }

    /// Seeds 1, 2, 3, ... `n`.
    pub fn counting(n: u64) -> Self {
        Self::new((1..=n).map(U256::from).collect())
    }
}

impl SeedSource for FixedSeeds {
    fn next_seed(&mut self) -> U256 {
        if self.seeds.is_empty() {
            return U256::ZERO;
        }
        let seed = self.seeds[self.next % self.seeds.len()];
        self.next += 1;
        seed
    }
}
