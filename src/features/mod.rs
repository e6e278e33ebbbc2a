//! Descriptor matching module

pub mod base;
pub mod distance;
pub mod exact_matcher;
pub mod kd_forest;
pub mod knn_matcher;
pub mod orchestrator;

pub use base::{
    passes_ratio_test, DescriptorSet, FeatureError, FeatureMatcher, MatchPair, Position, SetFingerprint,
};
pub use distance::distance;
pub use exact_matcher::{ExactMatcher, DEFAULT_RATIO};
pub use kd_forest::{IndexParams, Neighbor, ProximityIndex};
pub use knn_matcher::ApproximateMatcher;
pub use orchestrator::{find_correspondences, MatchOrchestrator};
