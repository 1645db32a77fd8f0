//! Deterministic RNG construction for reproducible minimization runs.
//!
//! The deletion sampler is seeded from a caller-supplied value; the same
//! seed always produces the same deletion batches.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Create the deletion RNG for a given caller seed.
pub fn deletion_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_same_seed_same_stream() {
        let mut rng1 = deletion_rng(7);
        let mut rng2 = deletion_rng(7);

        let vals1: Vec<u64> = (0..10).map(|_| rng1.gen()).collect();
        let vals2: Vec<u64> = (0..10).map(|_| rng2.gen()).collect();

        assert_eq!(vals1, vals2);
    }

    #[test]
    fn test_different_seeds_different_stream() {
        let mut rng1 = deletion_rng(7);
        let mut rng2 = deletion_rng(8);

        let val1: u64 = rng1.gen();
        let val2: u64 = rng2.gen();

        assert_ne!(val1, val2);
    }
}
