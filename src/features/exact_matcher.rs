//! Brute-force matcher for float descriptors.
//!
//! Every query descriptor is compared against every reference descriptor of
//! the same discriminator class, tracking the best and second-best distance
//! so Lowe's ratio test can reject ambiguous matches. The running
//! second-best distance is passed to the metric as an early-exit bound.

use log::debug;

use crate::features::base::{
    passes_ratio_test, DescriptorSet, FeatureError, FeatureMatcher, MatchPair,
};
use crate::features::distance::bounded_distance;

/// Default distinctiveness threshold
pub const DEFAULT_RATIO: f64 = 0.6;

/// Linear-scan matcher with discriminator filtering
#[derive(Debug, Clone)]
pub struct ExactMatcher {
    ratio_threshold: f64,
}

impl Default for ExactMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ExactMatcher {
    pub fn new() -> Self {
        Self {
            ratio_threshold: DEFAULT_RATIO,
        }
    }

    /// Set the distinctiveness ratio.
    pub fn with_ratio_threshold(mut self, ratio_threshold: f64) -> Self {
        self.ratio_threshold = ratio_threshold;
        self
    }

    pub fn ratio_threshold(&self) -> f64 {
        self.ratio_threshold
    }

    /// Find the reference index matching one query descriptor, if it passes
    /// the ratio test.
    pub fn nearest_neighbor(
        &self,
        descriptor: &[f32],
        discriminator: i32,
        reference: &DescriptorSet,
    ) -> Option<usize> {
        let mut best = f64::INFINITY;
        let mut second = f64::INFINITY;
        let mut neighbor = None;

        for (r_idx, (r_desc, r_disc)) in reference.rows().enumerate() {
            if r_disc != discriminator {
                continue;
            }
            let dist = bounded_distance(descriptor, r_desc, second);
            if dist < best {
                second = best;
                best = dist;
                neighbor = Some(r_idx);
            } else if dist < second {
                second = dist;
            }
        }

        neighbor.filter(|_| passes_ratio_test(best, second, self.ratio_threshold))
    }
}

impl FeatureMatcher for ExactMatcher {
    fn match_descriptors(
        &self,
        query: &DescriptorSet,
        reference: &DescriptorSet,
    ) -> Result<Vec<MatchPair>, FeatureError> {
        if query.is_empty() || reference.is_empty() {
            return Ok(Vec::new());
        }
        if query.length() != reference.length() {
            return Err(FeatureError::DimensionMismatch {
                query: query.length(),
                reference: reference.length(),
            });
        }

        let matches: Vec<MatchPair> = query
            .rows()
            .enumerate()
            .filter_map(|(q_idx, (q_desc, q_disc))| {
                self.nearest_neighbor(q_desc, q_disc, reference)
                    .map(|r_idx| MatchPair::new(q_idx, r_idx))
            })
            .collect();

        debug!(
            "exact matcher: {} of {} query descriptors matched against {}",
            matches.len(),
            query.len(),
            reference.len()
        );
        Ok(matches)
    }
}
