//! Interfaces to the collaborators around a capture session: the frame and
//! key source, the feature extractor and the match renderer.

use std::time::Duration;

use crate::config::ExtractorParams;
use crate::features::{DescriptorSet, FeatureError, MatchPair};
use crate::io::Frame;

/// What one poll of the event source produced
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A new camera frame
    Frame(Frame),
    /// A key was pressed
    KeyPress(char),
    /// Nothing arrived within the poll timeout
    Timeout,
    /// The source has no more frames (camera gone, script finished)
    Closed,
}

/// Blocking source of frames and key presses
pub trait EventSource {
    /// Wait up to `timeout` for the next event
    fn next_event(&mut self, timeout: Duration) -> SessionEvent;

    /// Hold the displayed result on screen
    fn pause(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Trait for feature extractors
pub trait FeatureExtractor {
    /// Detect keypoints and compute descriptors for a grayscale frame.
    ///
    /// Returns an empty set, not an error, when no keypoints are found.
    fn extract(&mut self, frame: &Frame, params: &ExtractorParams) -> Result<DescriptorSet, FeatureError>;
}

/// Trait for match display
pub trait MatchRenderer {
    /// Mark each matched position in both images
    fn render(&mut self, matches: &[MatchPair], query: &DescriptorSet, reference: &DescriptorSet);
}
