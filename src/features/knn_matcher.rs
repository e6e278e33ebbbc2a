//! KNN matcher backed by a randomized kd-tree forest
//!
//! Builds a [`ProximityIndex`] over the reference descriptors and runs one
//! batched 2-nearest-neighbour query for the whole query set, keeping the
//! matches that pass Lowe's ratio test.
//!
//! Discriminators are ignored unless discriminator partitioning is enabled,
//! in which case one forest is built per discriminator value and each query
//! only searches the forest of its own class.

use std::collections::BTreeMap;

use log::debug;

use crate::features::base::{
    passes_ratio_test, DescriptorSet, FeatureError, FeatureMatcher, MatchPair, SetFingerprint,
};
use crate::features::exact_matcher::DEFAULT_RATIO;
use crate::features::kd_forest::{IndexParams, Neighbor, ProximityIndex};

/// Neighbours requested per query
const K: usize = 2;

/// Forest(s) built over one reference set
#[derive(Debug, Clone)]
enum ReferenceIndex {
    Whole(ProximityIndex),
    Partitioned {
        source: SetFingerprint,
        parts: BTreeMap<i32, ProximityIndex>,
    },
}

/// A reference index plus the settings it was built with
#[derive(Debug, Clone)]
struct CachedIndex {
    params: IndexParams,
    index: ReferenceIndex,
}

impl CachedIndex {
    fn build(
        reference: &DescriptorSet,
        params: IndexParams,
        partitioned: bool,
    ) -> Result<Self, FeatureError> {
        let index = if partitioned {
            let mut classes: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
            for (idx, disc) in reference.discriminators().iter().enumerate() {
                classes.entry(*disc).or_default().push(idx);
            }
            let mut parts = BTreeMap::new();
            for (disc, rows) in classes {
                parts.insert(disc, ProximityIndex::build_rows(reference, rows, &params)?);
            }
            ReferenceIndex::Partitioned {
                source: reference.fingerprint(),
                parts,
            }
        } else {
            ReferenceIndex::Whole(ProximityIndex::build(reference, &params)?)
        };

        Ok(Self { params, index })
    }

    fn is_valid_for(&self, reference: &DescriptorSet, params: &IndexParams, partitioned: bool) -> bool {
        if self.params != *params {
            return false;
        }
        match &self.index {
            ReferenceIndex::Whole(index) => !partitioned && index.is_built_from(reference),
            ReferenceIndex::Partitioned { source, .. } => {
                partitioned && *source == reference.fingerprint()
            }
        }
    }
}

/// Approximate matcher using a randomized kd-tree forest
#[derive(Debug, Clone)]
pub struct ApproximateMatcher {
    /// Lowe's ratio threshold
    ratio_threshold: f64,
    /// Forest construction settings
    params: IndexParams,
    /// Descriptors examined per query once two neighbours are known
    search_budget: usize,
    /// Search only reference descriptors with the query's discriminator
    partition_by_discriminator: bool,
    /// Index retained by [`ApproximateMatcher::build_index`]
    cache: Option<CachedIndex>,
}

impl Default for ApproximateMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ApproximateMatcher {
    pub fn new() -> Self {
        Self {
            ratio_threshold: DEFAULT_RATIO,
            params: IndexParams::default(),
            search_budget: 64,
            partition_by_discriminator: false,
            cache: None,
        }
    }

    /// Set the distinctiveness ratio.
    pub fn with_ratio_threshold(mut self, ratio_threshold: f64) -> Self {
        self.ratio_threshold = ratio_threshold;
        self
    }

    /// Set the number of randomized trees.
    pub fn with_tree_count(mut self, tree_count: usize) -> Self {
        self.params.tree_count = tree_count;
        self
    }

    /// Set the per-query search budget.
    pub fn with_search_budget(mut self, search_budget: usize) -> Self {
        self.search_budget = search_budget;
        self
    }

    /// Seed the split-dimension choice.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.params.seed = seed;
        self
    }

    /// Restrict candidates to the query's discriminator class.
    pub fn with_discriminator_partitioning(mut self, enabled: bool) -> Self {
        self.partition_by_discriminator = enabled;
        self
    }

    pub fn ratio_threshold(&self) -> f64 {
        self.ratio_threshold
    }

    pub fn tree_count(&self) -> usize {
        self.params.tree_count
    }

    pub fn search_budget(&self) -> usize {
        self.search_budget
    }

    pub fn partitions_by_discriminator(&self) -> bool {
        self.partition_by_discriminator
    }

    /// Build and retain the index for `reference`.
    ///
    /// Later match calls reuse it as long as they are given the same
    /// reference; any other reference gets a freshly built index.
    pub fn build_index(&mut self, reference: &DescriptorSet) -> Result<(), FeatureError> {
        if reference.is_empty() {
            return Err(FeatureError::EmptyInput);
        }
        self.cache = Some(CachedIndex::build(
            reference,
            self.params,
            self.partition_by_discriminator,
        )?);
        debug!(
            "built proximity index over {} reference descriptors ({} trees)",
            reference.len(),
            self.params.tree_count
        );
        Ok(())
    }

    /// Drop the retained index
    pub fn clear_index(&mut self) {
        self.cache = None;
    }

    /// Whether a retained index exists
    pub fn is_built(&self) -> bool {
        self.cache.is_some()
    }

    /// Whether the retained index can answer queries against `reference`
    pub fn has_index_for(&self, reference: &DescriptorSet) -> bool {
        self.cache
            .as_ref()
            .map(|c| c.is_valid_for(reference, &self.params, self.partition_by_discriminator))
            .unwrap_or(false)
    }

    fn accept(&self, q_idx: usize, neighbors: &[Neighbor]) -> Option<MatchPair> {
        match neighbors {
            [first, second, ..] if passes_ratio_test(first.distance, second.distance, self.ratio_threshold) => {
                Some(MatchPair::new(q_idx, first.index))
            }
            _ => None,
        }
    }
}

impl FeatureMatcher for ApproximateMatcher {
    fn match_descriptors(
        &self,
        query: &DescriptorSet,
        reference: &DescriptorSet,
    ) -> Result<Vec<MatchPair>, FeatureError> {
        if query.is_empty() || reference.is_empty() {
            return Err(FeatureError::EmptyInput);
        }
        if query.length() != reference.length() {
            return Err(FeatureError::DimensionMismatch {
                query: query.length(),
                reference: reference.length(),
            });
        }

        let fresh;
        let cached = match &self.cache {
            Some(cache) if cache.is_valid_for(reference, &self.params, self.partition_by_discriminator) => cache,
            _ => {
                if self.cache.is_some() {
                    debug!("retained proximity index is stale; building a fresh one");
                }
                fresh = CachedIndex::build(reference, self.params, self.partition_by_discriminator)?;
                &fresh
            }
        };

        let matches: Vec<MatchPair> = match &cached.index {
            ReferenceIndex::Whole(index) => index
                .knn_search(query.data(), K, self.search_budget)?
                .iter()
                .enumerate()
                .filter_map(|(q_idx, neighbors)| self.accept(q_idx, neighbors))
                .collect(),
            ReferenceIndex::Partitioned { parts, .. } => {
                let mut matches = Vec::new();
                for (q_idx, (q_desc, q_disc)) in query.rows().enumerate() {
                    let Some(index) = parts.get(&q_disc) else { continue; };
                    let neighbors = index.nearest(q_desc, K, self.search_budget)?;
                    matches.extend(self.accept(q_idx, &neighbors));
                }
                matches
            }
        };

        debug!(
            "approximate matcher: {} of {} query descriptors matched against {}",
            matches.len(),
            query.len(),
            reference.len()
        );
        Ok(matches)
    }
}
