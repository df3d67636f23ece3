//! Deterministic player names for simulation.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

const HANDLES: &[&str] = &[
    "ash", "blitz", "cinder", "dusk", "ember", "frost", "gale", "hex",
    "ion", "jolt", "kite", "lumen", "moth", "nova", "onyx", "pike",
    "quill", "rune", "sable", "tide", "umbra", "vex", "wisp", "zephyr",
];

/// Hands out reproducible usernames.
///
/// Names are:
/// - Deterministic: same master seed, same name for each index
/// - Unique: the index is part of the name
/// - Isolated: asking for more players never renames earlier ones
pub struct DeterministicNameProvider {
    /// Master seed
    master_seed: u64,
    
    /// Cache of generated names by index
    cache: HashMap<u64, String>,
}

impl DeterministicNameProvider {
    /// Creates a provider with the given master seed.
    pub fn new(master_seed: u64) -> Self {
        Self {
            master_seed,
            cache: HashMap::new(),
        }
    }
    
    /// Username for player `index`.
    ///
    /// The handle is drawn from an RNG seeded with
    /// `master_seed * golden + index * prime`.
    pub fn username(&mut self, index: u64) -> String {
        if let Some(name) = self.cache.get(&index) {
            return name.clone();
        }
        
        let player_seed = self
            .master_seed
            .wrapping_mul(0x9e3779b97f4a7c15)
            .wrapping_add(index.wrapping_mul(0x517cc1b727220a95));
        let mut rng = ChaCha8Rng::seed_from_u64(player_seed);
        let handle = HANDLES.choose(&mut rng).copied().unwrap_or("runner");
        let name = format!("{}_{:03}", handle, index);
        
        self.cache.insert(index, name.clone());
        name
    }
    
    /// Usernames for players `0..count`.
    pub fn usernames(&mut self, count: usize) -> Vec<String> {
        (0..count as u64).map(|i| self.username(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_deterministic_names() {
        let mut a = DeterministicNameProvider::new(42);
        let mut b = DeterministicNameProvider::new(42);
        
        assert_eq!(a.usernames(20), b.usernames(20));
    }
    
    #[test]
    fn test_names_are_unique() {
        let mut provider = DeterministicNameProvider::new(7);
        let mut names = provider.usernames(200);
        names.sort();
        names.dedup();
        
        assert_eq!(names.len(), 200);
    }
    
    #[test]
    fn test_name_isolation() {
        let mut small = DeterministicNameProvider::new(42);
        let mut large = DeterministicNameProvider::new(42);
        
        let first: Vec<_> = small.usernames(3);
        let _ = large.usernames(50);
        
        for (i, name) in first.iter().enumerate() {
            assert_eq!(&large.username(i as u64), name);
        }
    }
}
