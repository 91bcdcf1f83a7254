//! Deterministic storage-order shuffle.
//!
//! Randomized builds permute the enumerated (path, label) pairs before
//! storage indices are assigned, so a shuffled dataset is reproducible
//! run-to-run: the seed is a fixed constant, not wall-clock entropy.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

pub const SHUFFLE_SEED: u64 = 0xBEEF;

pub fn shuffle_in_place<T>(items: &mut [T]) {
    let mut rng = StdRng::seed_from_u64(SHUFFLE_SEED);
    items.shuffle(&mut rng);
}
