//! Tensor alias and the random key type.

use ndarray::{ArrayD, IxDyn};
use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::constants::GOLDEN_GAMMA;

/// Dense tensor of arbitrary rank. Image tensors are laid out NHWC.
pub type Tensor = ArrayD<f32>;

/// Build a rank-0 tensor holding `value`.
pub fn scalar_tensor(value: f32) -> Tensor {
    Tensor::from_elem(IxDyn(&[]), value)
}

/// Counter-based seed mixing (SplitMix64 finalizer over `seed` and `counter`).
///
/// Distinct counters give well-separated seeds even for adjacent inputs,
/// so `(seed, i)` pairs can seed independent generators.
pub fn counter_rng_seed(seed: u64, counter: u64) -> u64 {
    let mut z = seed ^ counter.wrapping_add(1).wrapping_mul(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// A random key: the only per-call input of a concrete process.
///
/// Keys are plain values. Every random draw in this workspace is a pure
/// function of a key, which is what makes batches reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key(u64);

impl Key {
    /// Derive a root key from an integer seed.
    pub fn new(seed: u64) -> Self {
        Key(counter_rng_seed(seed, 0))
    }

    /// Wrap raw key material without mixing.
    pub fn from_raw(raw: u64) -> Self {
        Key(raw)
    }

    /// Raw key material.
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Split into `n` independent subkeys, deterministically.
    pub fn split(&self, n: usize) -> Vec<Key> {
        let mut rng = self.rng();
        (0..n).map(|_| Key(rng.next_u64())).collect()
    }

    /// Derive a new key from this one and an integer tag.
    pub fn fold_in(&self, data: u64) -> Key {
        Key(counter_rng_seed(self.0, data))
    }

    /// Generator seeded by this key.
    pub fn rng(&self) -> Xoshiro256PlusPlus {
        Xoshiro256PlusPlus::seed_from_u64(self.0)
    }
}
