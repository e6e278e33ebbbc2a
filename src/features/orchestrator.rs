//! Strategy dispatch between the exact and approximate matchers.

use log::debug;

use crate::config::{MatchStrategy, MatcherParams};
use crate::features::base::{DescriptorSet, FeatureError, FeatureMatcher, MatchPair};
use crate::features::exact_matcher::ExactMatcher;
use crate::features::knn_matcher::ApproximateMatcher;

/// Runs the configured matcher.
///
/// The orchestrator holds configuration and, for the approximate strategy,
/// the retained reference index; every call is otherwise independent.
#[derive(Debug, Clone)]
pub struct MatchOrchestrator {
    strategy: MatchStrategy,
    exact: ExactMatcher,
    approximate: ApproximateMatcher,
}

impl Default for MatchOrchestrator {
    fn default() -> Self {
        Self::new(&MatcherParams::default())
    }
}

impl MatchOrchestrator {
    pub fn new(params: &MatcherParams) -> Self {
        Self {
            strategy: params.strategy,
            exact: ExactMatcher::new().with_ratio_threshold(params.ratio),
            approximate: ApproximateMatcher::new()
                .with_ratio_threshold(params.ratio)
                .with_tree_count(params.tree_count)
                .with_search_budget(params.search_budget)
                .with_seed(params.seed)
                .with_discriminator_partitioning(params.partition_by_discriminator),
        }
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    /// Prepare for matching against `reference`.
    ///
    /// Builds the proximity index up front for the approximate strategy so
    /// the first capture does not pay for it. No-op for the exact strategy
    /// or an empty reference.
    pub fn prepare(&mut self, reference: &DescriptorSet) -> Result<(), FeatureError> {
        if self.strategy == MatchStrategy::Approximate && !reference.is_empty() {
            self.approximate.build_index(reference)?;
        }
        Ok(())
    }

    /// Forget anything derived from a previous reference
    pub fn reset(&mut self) {
        self.approximate.clear_index();
    }

    /// Correspondences from `query` into `reference`, in query order.
    ///
    /// Either set being empty yields no correspondences rather than an error.
    pub fn find_correspondences(
        &self,
        query: &DescriptorSet,
        reference: &DescriptorSet,
    ) -> Result<Vec<MatchPair>, FeatureError> {
        if query.is_empty() || reference.is_empty() {
            debug!(
                "skipping match: {} query and {} reference descriptors",
                query.len(),
                reference.len()
            );
            return Ok(Vec::new());
        }

        match self.strategy {
            MatchStrategy::Exact => self.exact.match_descriptors(query, reference),
            MatchStrategy::Approximate => self.approximate.match_descriptors(query, reference),
        }
    }
}

impl FeatureMatcher for MatchOrchestrator {
    fn match_descriptors(
        &self,
        query: &DescriptorSet,
        reference: &DescriptorSet,
    ) -> Result<Vec<MatchPair>, FeatureError> {
        self.find_correspondences(query, reference)
    }
}

/// One-shot matching with the given parameters
pub fn find_correspondences(
    query: &DescriptorSet,
    reference: &DescriptorSet,
    params: &MatcherParams,
) -> Result<Vec<MatchPair>, FeatureError> {
    MatchOrchestrator::new(params).find_correspondences(query, reference)
}
