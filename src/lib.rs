//! # rustmatch
//!
//! Correspondence search between the local feature descriptors of a goal
//! image and those extracted from camera captures.
//!
//! ## Overview
//!
//! Descriptors are fixed-length float vectors (SURF style, 64 or 128 values)
//! carrying a discriminator sign and an image position. Two matchers are
//! provided:
//! - [`ExactMatcher`](features::ExactMatcher): exhaustive scan with early-exit
//!   distances and a hard discriminator filter
//! - [`ApproximateMatcher`](features::ApproximateMatcher): randomized kd-forest
//!   with a bounded best-bin-first search
//!
//! Both accept a pair only when it passes the nearest/second-nearest ratio
//! test. A [`CaptureSession`](session::CaptureSession) drives the capture,
//! extract, match and display cycle against a fixed reference set.
//!
//! ## Example
//!
//! ```rust
//! use rustmatch::config::MatcherParams;
//! use rustmatch::features::{find_correspondences, DescriptorSet, MatchPair};
//!
//! let mut reference = DescriptorSet::new(4);
//! reference.push(&[0.0, 0.0, 0.0, 0.0], 0, (10.0, 10.0)).unwrap();
//! reference.push(&[5.0, 5.0, 5.0, 5.0], 0, (20.0, 20.0)).unwrap();
//!
//! let mut query = DescriptorSet::new(4);
//! query.push(&[0.1, 0.0, 0.0, 0.0], 0, (3.0, 4.0)).unwrap();
//!
//! let matches = find_correspondences(&query, &reference, &MatcherParams::default()).unwrap();
//! assert_eq!(matches, vec![MatchPair::new(0, 0)]);
//! ```

pub mod cli;
pub mod config;
pub mod features;
pub mod io;
pub mod session;
pub mod test_utils;

pub use config::{MatchConfig, MatchStrategy, MatcherParams};
pub use features::{DescriptorSet, FeatureError, MatchOrchestrator, MatchPair};
pub use session::CaptureSession;
