//! Parameter structures for the matching components

use serde::{Deserialize, Serialize};

/// Which matcher answers a correspondence request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    /// Linear scan with discriminator filtering
    #[default]
    Exact,
    /// Randomized kd-tree forest
    Approximate,
}

impl MatchStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStrategy::Exact => "exact",
            MatchStrategy::Approximate => "approximate",
        }
    }
}

/// Matcher parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherParams {
    /// Matching strategy
    pub strategy: MatchStrategy,
    /// Distinctiveness ratio (Lowe's ratio test)
    pub ratio: f64,
    /// Randomized trees in the proximity index (approximate only)
    pub tree_count: usize,
    /// Descriptors examined per query (approximate only)
    pub search_budget: usize,
    /// Seed for the proximity index (approximate only)
    pub seed: u64,
    /// Only match descriptors of the same discriminator class in the
    /// approximate path
    pub partition_by_discriminator: bool,
}

impl Default for MatcherParams {
    fn default() -> Self {
        Self {
            strategy: MatchStrategy::Exact,
            ratio: 0.6,
            tree_count: 4,
            search_budget: 64,
            seed: 0x1234_5678,
            partition_by_discriminator: false,
        }
    }
}

/// Parameters handed to the feature extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorParams {
    /// Minimum detector response for a keypoint to be kept
    pub response_threshold: f64,
    /// Extended (128-value) descriptors instead of 64-value ones
    pub extended: bool,
}

impl Default for ExtractorParams {
    fn default() -> Self {
        Self {
            response_threshold: 500.0,
            extended: true,
        }
    }
}

/// Capture session parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionParams {
    /// How long matches stay on screen (milliseconds)
    pub display_pause_ms: u64,
    /// How long one poll for a frame or key waits (milliseconds)
    pub poll_timeout_ms: u64,
    /// Key that captures the current frame
    pub capture_key: char,
    /// Key that ends the session
    pub quit_key: char,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            display_pause_ms: 3000,
            poll_timeout_ms: 30,
            capture_key: 'c',
            quit_key: 'q',
        }
    }
}
