//! Capture session module
//!
//! Drives extraction, matching and display for each capture command against
//! a fixed goal image.

mod capture;
mod collaborators;
pub mod replay;

pub use capture::{
    CaptureSession, CycleOutcome, CycleReport, SessionError, SessionState, SessionSummary, SkipReason,
};
pub use collaborators::{EventSource, FeatureExtractor, MatchRenderer, SessionEvent};
pub use replay::{MatchMarker, MatchRecorder, PrecomputedExtractor, ScriptedEvents};
