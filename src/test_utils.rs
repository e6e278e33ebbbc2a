//! Deterministic synthetic descriptor sets for tests and benchmarks.
//!
//! Everything is driven by a small seeded xorshift generator, so the same
//! seed always yields the same set.

use crate::features::{DescriptorSet, FeatureError, Position};

/// Image size positions are drawn from
const IMAGE_WIDTH: f32 = 640.0;
const IMAGE_HEIGHT: f32 = 480.0;

/// Seeded xorshift64* generator
#[derive(Debug, Clone)]
pub struct SyntheticRng(u64);

impl SyntheticRng {
    pub fn new(seed: u64) -> Self {
        // The state must never be zero.
        Self((seed ^ 0x9E37_79B9_7F4A_7C15).max(1))
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        (x.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 32) as u32
    }

    /// Uniform in `[0, 1)`
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Uniform in `[low, high)`
    pub fn uniform(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32()
    }

    /// `-1` or `1`, like the sign of a Laplacian
    pub fn sign(&mut self) -> i32 {
        if self.next_u32() & 1 == 0 {
            -1
        } else {
            1
        }
    }

    fn position(&mut self) -> Position {
        (self.uniform(0.0, IMAGE_WIDTH), self.uniform(0.0, IMAGE_HEIGHT))
    }
}

/// `count` descriptors with values in `[0, 1)` and random `±1` discriminators
pub fn random_set(count: usize, length: usize, seed: u64) -> Result<DescriptorSet, FeatureError> {
    let mut rng = SyntheticRng::new(seed);
    let mut set = DescriptorSet::new(length);
    let mut row = vec![0.0; length];
    for _ in 0..count {
        row.iter_mut().for_each(|v| *v = rng.next_f32());
        let discriminator = rng.sign();
        set.push(&row, discriminator, rng.position())?;
    }
    Ok(set)
}

/// `count` descriptors spread over `[0, 10)` per dimension, all with
/// discriminator 0.
///
/// Rows are far apart compared to the noise [`perturbed`] adds, so every
/// perturbed row has one clear nearest neighbour.
pub fn separated_set(count: usize, length: usize, seed: u64) -> Result<DescriptorSet, FeatureError> {
    let mut rng = SyntheticRng::new(seed);
    let mut set = DescriptorSet::new(length);
    let mut row = vec![0.0; length];
    for _ in 0..count {
        row.iter_mut().for_each(|v| *v = rng.uniform(0.0, 10.0));
        set.push(&row, 0, rng.position())?;
    }
    Ok(set)
}

/// Copy of `set` with every value moved by up to `noise`, keeping
/// discriminators and shifting positions by a few pixels
pub fn perturbed(set: &DescriptorSet, noise: f32, seed: u64) -> Result<DescriptorSet, FeatureError> {
    let mut rng = SyntheticRng::new(seed);
    let mut out = DescriptorSet::new(set.length());
    let mut row = vec![0.0; set.length()];
    for (idx, (values, discriminator)) in set.rows().enumerate() {
        for (dst, src) in row.iter_mut().zip(values) {
            *dst = src + rng.uniform(-noise, noise);
        }
        let (x, y) = set.positions()[idx];
        out.push(&row, discriminator, (x + rng.uniform(-3.0, 3.0), y + rng.uniform(-3.0, 3.0)))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_set() {
        let a = random_set(20, 16, 7).unwrap();
        let b = random_set(20, 16, 7).unwrap();
        let c = random_set(20, 16, 8).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_value_ranges() {
        let set = random_set(50, 8, 1).unwrap();
        assert_eq!(set.len(), 50);
        assert!(set.data().iter().all(|v| (0.0..1.0).contains(v)));
        assert!(set.discriminators().iter().all(|d| *d == 1 || *d == -1));
    }

    #[test]
    fn test_perturbed_keeps_shape() {
        let set = separated_set(10, 8, 3).unwrap();
        let noisy = perturbed(&set, 0.05, 4).unwrap();
        assert_eq!(noisy.len(), set.len());
        assert_eq!(noisy.discriminators(), set.discriminators());
        for (a, b) in set.data().iter().zip(noisy.data()) {
            assert!((a - b).abs() <= 0.05 + 1e-6);
        }
    }
}
