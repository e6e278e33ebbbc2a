//! Scripted collaborators for replaying precomputed captures.
//!
//! These drive a [`CaptureSession`](super::CaptureSession) without a camera:
//! events come from a script, descriptors from earlier extraction dumps and
//! rendered matches are recorded instead of drawn.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

use crate::config::ExtractorParams;
use crate::features::{DescriptorSet, FeatureError, MatchPair, Position};
use crate::io::Frame;

use super::collaborators::{EventSource, FeatureExtractor, MatchRenderer, SessionEvent};

/// Plays back a fixed list of events, then reports the source as closed
#[derive(Debug, Clone, Default)]
pub struct ScriptedEvents {
    events: VecDeque<SessionEvent>,
    pauses: Vec<Duration>,
}

impl ScriptedEvents {
    pub fn new(events: Vec<SessionEvent>) -> Self {
        Self {
            events: events.into(),
            pauses: Vec::new(),
        }
    }

    /// `count` frames, each followed by the capture key, then the quit key
    pub fn captures(count: usize, capture_key: char, quit_key: char) -> Self {
        let mut events = Vec::with_capacity(count * 2 + 1);
        for index in 0..count {
            events.push(SessionEvent::Frame(Frame::empty(index, index as f64)));
            events.push(SessionEvent::KeyPress(capture_key));
        }
        events.push(SessionEvent::KeyPress(quit_key));
        Self::new(events)
    }

    /// Display pauses requested so far
    pub fn pauses(&self) -> &[Duration] {
        &self.pauses
    }
}

impl EventSource for ScriptedEvents {
    fn next_event(&mut self, _timeout: Duration) -> SessionEvent {
        self.events.pop_front().unwrap_or(SessionEvent::Closed)
    }

    fn pause(&mut self, duration: Duration) {
        self.pauses.push(duration);
    }
}

/// Hands out descriptor sets extracted ahead of time, one per capture
#[derive(Debug, Clone, Default)]
pub struct PrecomputedExtractor {
    sets: VecDeque<DescriptorSet>,
}

impl PrecomputedExtractor {
    pub fn new(sets: Vec<DescriptorSet>) -> Self {
        Self { sets: sets.into() }
    }

    /// Captures still available
    pub fn remaining(&self) -> usize {
        self.sets.len()
    }
}

impl FeatureExtractor for PrecomputedExtractor {
    fn extract(&mut self, frame: &Frame, _params: &ExtractorParams) -> Result<DescriptorSet, FeatureError> {
        self.sets.pop_front().ok_or_else(|| {
            FeatureError::Extraction(format!("no precomputed descriptors for frame {}", frame.index()))
        })
    }
}

/// One matched keypoint, positioned in both images
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchMarker {
    pub query_idx: usize,
    pub reference_idx: usize,
    pub query_position: Position,
    pub reference_position: Position,
}

/// Records what would have been drawn for each displayed capture
#[derive(Debug, Clone, Default)]
pub struct MatchRecorder {
    frames: Vec<Vec<MatchMarker>>,
}

impl MatchRecorder {
    /// Markers per rendered capture, in order
    pub fn frames(&self) -> &[Vec<MatchMarker>] {
        &self.frames
    }
}

impl MatchRenderer for MatchRecorder {
    fn render(&mut self, matches: &[MatchPair], query: &DescriptorSet, reference: &DescriptorSet) {
        let markers = matches
            .iter()
            .filter_map(|m| {
                Some(MatchMarker {
                    query_idx: m.query_idx,
                    reference_idx: m.reference_idx,
                    query_position: query.position(m.query_idx)?,
                    reference_position: reference.position(m.reference_idx)?,
                })
            })
            .collect();
        self.frames.push(markers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_captures() {
        let mut events = ScriptedEvents::captures(2, 'c', 'q');
        let timeout = Duration::from_millis(30);

        assert_eq!(events.next_event(timeout), SessionEvent::Frame(Frame::empty(0, 0.0)));
        assert_eq!(events.next_event(timeout), SessionEvent::KeyPress('c'));
        assert_eq!(events.next_event(timeout), SessionEvent::Frame(Frame::empty(1, 1.0)));
        assert_eq!(events.next_event(timeout), SessionEvent::KeyPress('c'));
        assert_eq!(events.next_event(timeout), SessionEvent::KeyPress('q'));
        assert_eq!(events.next_event(timeout), SessionEvent::Closed);
    }

    #[test]
    fn test_recorder_positions() {
        let mut query = DescriptorSet::new(4);
        query.push(&[0.0; 4], 0, (1.0, 2.0)).unwrap();
        let mut reference = DescriptorSet::new(4);
        reference.push(&[1.0; 4], 0, (3.0, 4.0)).unwrap();
        reference.push(&[0.0; 4], 0, (5.0, 6.0)).unwrap();

        let mut recorder = MatchRecorder::default();
        recorder.render(&[MatchPair::new(0, 1)], &query, &reference);

        assert_eq!(
            recorder.frames()[0],
            vec![MatchMarker {
                query_idx: 0,
                reference_idx: 1,
                query_position: (1.0, 2.0),
                reference_position: (5.0, 6.0),
            }]
        );
    }

    #[test]
    fn test_precomputed_extractor_runs_dry() {
        let mut extractor = PrecomputedExtractor::new(vec![DescriptorSet::new(4)]);
        let frame = Frame::empty(0, 0.0);
        let params = ExtractorParams::default();

        assert!(extractor.extract(&frame, &params).unwrap().is_empty());
        assert!(matches!(extractor.extract(&frame, &params), Err(FeatureError::Extraction(_))));
    }
}
