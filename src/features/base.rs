//! Core descriptor types shared by the matchers

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("descriptor length mismatch: query has {query}, reference has {reference}")]
    DimensionMismatch { query: usize, reference: usize },

    #[error("no descriptors to match")]
    EmptyInput,

    #[error("extraction failed: {0}")]
    Extraction(String),
}

/// A 2D keypoint position in image coordinates
pub type Position = (f32, f32);

/// Identifies the contents of a descriptor set.
///
/// An index only answers queries correctly for the set it was built from;
/// comparing fingerprints is how a cached index is recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetFingerprint {
    count: usize,
    length: usize,
    digest: u64,
}

impl SetFingerprint {
    fn compute(set: &DescriptorSet) -> Self {
        let mut hasher = DefaultHasher::new();
        for value in &set.data {
            value.to_bits().hash(&mut hasher);
        }
        set.discriminators.hash(&mut hasher);
        Self {
            count: set.len(),
            length: set.length,
            digest: hasher.finish(),
        }
    }
}

/// Descriptors extracted from one image.
///
/// Descriptors are stored row-major in `data`; `discriminators` and
/// `positions` run parallel to the rows so index `i` always refers to the
/// same keypoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawDescriptorSet", into = "RawDescriptorSet")]
pub struct DescriptorSet {
    length: usize,
    data: Vec<f32>,
    discriminators: Vec<i32>,
    positions: Vec<Position>,
    /// Cleared whenever a descriptor is appended
    fingerprint: OnceLock<SetFingerprint>,
}

impl PartialEq for DescriptorSet {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length
            && self.data == other.data
            && self.discriminators == other.discriminators
            && self.positions == other.positions
    }
}

impl DescriptorSet {
    /// Create an empty set for descriptors of `length` values
    pub fn new(length: usize) -> Self {
        Self {
            length,
            data: Vec::new(),
            discriminators: Vec::new(),
            positions: Vec::new(),
            fingerprint: OnceLock::new(),
        }
    }

    /// Create a set from its parallel parts, checking they line up
    pub fn from_parts(
        length: usize,
        data: Vec<f32>,
        discriminators: Vec<i32>,
        positions: Vec<Position>,
    ) -> Result<Self, FeatureError> {
        let count = discriminators.len();
        if positions.len() != count {
            return Err(FeatureError::InvalidInput(format!(
                "{} discriminators but {} positions",
                count,
                positions.len()
            )));
        }
        if count > 0 {
            check_length(length)?;
        }
        if data.len() != count * length {
            return Err(FeatureError::InvalidInput(format!(
                "expected {} descriptor values for {} rows of length {}, got {}",
                count * length,
                count,
                length,
                data.len()
            )));
        }

        Ok(Self {
            length,
            data,
            discriminators,
            positions,
            fingerprint: OnceLock::new(),
        })
    }

    /// Append one descriptor
    pub fn push(
        &mut self,
        descriptor: &[f32],
        discriminator: i32,
        position: Position,
    ) -> Result<(), FeatureError> {
        check_length(self.length)?;
        if descriptor.len() != self.length {
            return Err(FeatureError::InvalidInput(format!(
                "descriptor has {} values, set expects {}",
                descriptor.len(),
                self.length
            )));
        }
        self.data.extend_from_slice(descriptor);
        self.discriminators.push(discriminator);
        self.positions.push(position);
        self.fingerprint = OnceLock::new();
        Ok(())
    }

    /// Number of values per descriptor
    pub fn length(&self) -> usize {
        self.length
    }

    /// Number of descriptors
    pub fn len(&self) -> usize {
        self.discriminators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.discriminators.is_empty()
    }

    /// Get descriptor at index
    pub fn get(&self, idx: usize) -> Option<&[f32]> {
        if idx < self.len() {
            let start = idx * self.length;
            Some(&self.data[start..start + self.length])
        } else {
            None
        }
    }

    pub fn discriminator(&self, idx: usize) -> Option<i32> {
        self.discriminators.get(idx).copied()
    }

    pub fn position(&self, idx: usize) -> Option<Position> {
        self.positions.get(idx).copied()
    }

    /// Row-major descriptor matrix
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn discriminators(&self) -> &[i32] {
        &self.discriminators
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Content fingerprint, hashed on first use
    pub fn fingerprint(&self) -> SetFingerprint {
        *self.fingerprint.get_or_init(|| SetFingerprint::compute(self))
    }

    /// Iterate over `(descriptor, discriminator)` rows
    pub fn rows(&self) -> impl Iterator<Item = (&[f32], i32)> + '_ {
        // chunks_exact panics on a zero chunk size, which only an empty set can have.
        let chunk = self.length.max(1);
        self.data
            .chunks_exact(chunk)
            .zip(self.discriminators.iter().copied())
    }
}

fn check_length(length: usize) -> Result<(), FeatureError> {
    if length == 0 || length % 4 != 0 {
        return Err(FeatureError::InvalidInput(format!(
            "descriptor length must be a non-zero multiple of 4, got {}",
            length
        )));
    }
    Ok(())
}

/// On-disk shape of a [`DescriptorSet`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawDescriptorSet {
    length: usize,
    descriptors: Vec<f32>,
    discriminators: Vec<i32>,
    positions: Vec<Position>,
}

impl TryFrom<RawDescriptorSet> for DescriptorSet {
    type Error = FeatureError;

    fn try_from(raw: RawDescriptorSet) -> Result<Self, Self::Error> {
        DescriptorSet::from_parts(raw.length, raw.descriptors, raw.discriminators, raw.positions)
    }
}

impl From<DescriptorSet> for RawDescriptorSet {
    fn from(set: DescriptorSet) -> Self {
        Self {
            length: set.length,
            descriptors: set.data,
            discriminators: set.discriminators,
            positions: set.positions,
        }
    }
}

/// A correspondence between a query and a reference descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchPair {
    /// Query descriptor index
    pub query_idx: usize,
    /// Reference descriptor index
    pub reference_idx: usize,
}

impl MatchPair {
    pub fn new(query_idx: usize, reference_idx: usize) -> Self {
        Self {
            query_idx,
            reference_idx,
        }
    }
}

/// Trait for descriptor matchers
pub trait FeatureMatcher {
    /// Match every query descriptor against the reference set
    fn match_descriptors(
        &self,
        query: &DescriptorSet,
        reference: &DescriptorSet,
    ) -> Result<Vec<MatchPair>, FeatureError>;
}

/// Lowe's distinctiveness test: the best candidate must be clearly closer
/// than the runner-up. Strict, so `best == ratio * second` is rejected.
#[inline]
pub fn passes_ratio_test(best: f64, second: f64, ratio: f64) -> bool {
    best < ratio * second
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_follows_contents() {
        let mut set = DescriptorSet::new(4);
        set.push(&[1.0, 2.0, 3.0, 4.0], 1, (0.0, 0.0)).unwrap();
        let first = set.fingerprint();
        assert_eq!(set.fingerprint(), first);
        assert_eq!(set.clone().fingerprint(), first);

        // Appending drops the cached value.
        set.push(&[5.0, 6.0, 7.0, 8.0], -1, (1.0, 1.0)).unwrap();
        assert_ne!(set.fingerprint(), first);

        let mut flipped = DescriptorSet::new(4);
        flipped.push(&[1.0, 2.0, 3.0, 4.0], -1, (0.0, 0.0)).unwrap();
        assert_ne!(flipped.fingerprint(), first);
    }

    #[test]
    fn test_equality_ignores_cached_fingerprint() {
        let parts = || DescriptorSet::from_parts(4, vec![0.5; 4], vec![0], vec![(2.0, 3.0)]).unwrap();
        let hashed = parts();
        let _ = hashed.fingerprint();
        assert_eq!(hashed, parts());
    }

    #[test]
    fn test_from_parts_checks_parallel_lengths() {
        let err = DescriptorSet::from_parts(4, vec![0.0; 4], vec![0], vec![]).unwrap_err();
        assert!(matches!(err, FeatureError::InvalidInput(_)));

        let err = DescriptorSet::from_parts(4, vec![0.0; 5], vec![0], vec![(0.0, 0.0)]).unwrap_err();
        assert!(matches!(err, FeatureError::InvalidInput(_)));
    }

    #[test]
    fn test_length_must_be_multiple_of_four() {
        let err = DescriptorSet::from_parts(6, vec![0.0; 6], vec![1], vec![(1.0, 2.0)]).unwrap_err();
        assert!(err.to_string().contains("multiple of 4"));

        // An empty set carries no descriptors to validate.
        assert!(DescriptorSet::from_parts(0, vec![], vec![], vec![]).is_ok());
    }

    #[test]
    fn test_push_and_get() {
        let mut set = DescriptorSet::new(4);
        set.push(&[1.0, 2.0, 3.0, 4.0], 1, (10.0, 20.0)).unwrap();
        set.push(&[5.0, 6.0, 7.0, 8.0], -1, (30.0, 40.0)).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.get(1), Some(&[5.0, 6.0, 7.0, 8.0][..]));
        assert_eq!(set.discriminator(1), Some(-1));
        assert_eq!(set.position(0), Some((10.0, 20.0)));
        assert!(set.get(2).is_none());

        let err = set.push(&[1.0, 2.0], 0, (0.0, 0.0)).unwrap_err();
        assert!(matches!(err, FeatureError::InvalidInput(_)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_rows_on_empty_set() {
        let set = DescriptorSet::new(0);
        assert_eq!(set.rows().count(), 0);
    }

    #[test]
    fn test_deserialize_rejects_broken_set() {
        let json = r#"{"length":4,"descriptors":[0.0,0.0,0.0,0.0],"discriminators":[0,1],"positions":[[0.0,0.0],[1.0,1.0]]}"#;
        assert!(serde_json::from_str::<DescriptorSet>(json).is_err());
    }

    #[test]
    fn test_ratio_test_is_strict() {
        assert!(passes_ratio_test(0.5, 1.0, 0.6));
        assert!(!passes_ratio_test(0.6, 1.0, 0.6));
        assert!(passes_ratio_test(1.0, f64::INFINITY, 0.6));
        assert!(!passes_ratio_test(0.0, 0.0, 0.6));
    }
}
