//! Capture session: the reactive loop that turns capture commands into
//! match cycles.
//!
//! ```text
//!           capture key                 non-empty set
//!   Idle ───────────────> Extracting ─────────────────> Matching
//!    ^                        │ empty / failed              │
//!    │<───────────────────────┘                             v
//!    └──────────────────────────────────────────────── Displaying
//! ```
//!
//! The quit key (or a closed source) moves any state to `Stopped`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use thiserror::Error;

use crate::config::MatchConfig;
use crate::features::{DescriptorSet, FeatureError, MatchOrchestrator, MatchPair};
use crate::io::Frame;

use super::collaborators::{EventSource, FeatureExtractor, MatchRenderer, SessionEvent};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for a command
    Idle,
    /// Extracting descriptors from the captured frame
    Extracting,
    /// Matching the captured descriptors against the reference
    Matching,
    /// Showing the matches
    Displaying,
    /// Session ended
    Stopped,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session transition from {from:?} to {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },
    #[error("match failed: {0}")]
    Match(#[from] FeatureError),
}

/// Why a capture produced no matches
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Capture requested before any frame arrived
    NoFrame,
    /// The extractor found no keypoints
    NoDescriptors,
    /// The extractor failed
    ExtractionFailed(String),
}

/// Result of one completed match cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Index of the captured frame
    pub frame_index: usize,
    /// Descriptors extracted from the frame
    pub query_count: usize,
    /// Descriptors in the reference snapshot
    pub reference_count: usize,
    /// Correspondences in query order
    pub matches: Vec<MatchPair>,
    /// Extraction plus matching time
    pub elapsed: Duration,
}

/// What handling one event did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Event had no effect
    Ignored,
    /// Latest frame replaced
    FrameUpdated,
    /// Capture skipped without matching
    Skipped(SkipReason),
    /// Capture matched and displayed
    Matched(CycleReport),
    /// Session ended
    Stopped,
}

/// Totals of a finished session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSummary {
    /// Completed match cycles, in order
    pub cycles: Vec<CycleReport>,
    /// Captures skipped before matching
    pub skipped: usize,
    /// Captures aborted by a match error
    pub failed: usize,
}

/// One matching session against a fixed goal image
pub struct CaptureSession<S, E, R> {
    config: MatchConfig,
    orchestrator: MatchOrchestrator,
    /// Shared immutable snapshot; each cycle clones the `Arc`, so replacing
    /// the reference never disturbs a cycle that already holds it.
    reference: Arc<DescriptorSet>,
    source: S,
    extractor: E,
    renderer: R,
    state: SessionState,
    current_frame: Option<Frame>,
}

impl<S, E, R> CaptureSession<S, E, R>
where
    S: EventSource,
    E: FeatureExtractor,
    R: MatchRenderer,
{
    /// Start a session matching captures against `reference`
    pub fn new(
        config: MatchConfig,
        reference: DescriptorSet,
        source: S,
        extractor: E,
        renderer: R,
    ) -> Result<Self, FeatureError> {
        let mut orchestrator = MatchOrchestrator::new(&config.matcher);
        let started = Instant::now();
        orchestrator.prepare(&reference)?;
        info!(
            "Reference descriptors: {} ({} strategy, prepared in {:.2} ms)",
            reference.len(),
            orchestrator.strategy().as_str(),
            started.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            config,
            orchestrator,
            reference: Arc::new(reference),
            source,
            extractor,
            renderer,
            state: SessionState::Idle,
            current_frame: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Snapshot of the current reference set
    pub fn reference(&self) -> Arc<DescriptorSet> {
        Arc::clone(&self.reference)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Replace the goal descriptors. Anything derived from the old
    /// reference is dropped before the new one is prepared.
    pub fn set_reference(&mut self, reference: DescriptorSet) -> Result<(), FeatureError> {
        self.orchestrator.reset();
        self.orchestrator.prepare(&reference)?;
        self.reference = Arc::new(reference);
        Ok(())
    }

    /// Poll events until the session stops
    pub fn run(&mut self) -> SessionSummary {
        let timeout = Duration::from_millis(self.config.session.poll_timeout_ms);
        let mut summary = SessionSummary::default();

        while self.state != SessionState::Stopped {
            let event = self.source.next_event(timeout);
            match self.handle_event(event) {
                Ok(CycleOutcome::Matched(report)) => summary.cycles.push(report),
                Ok(CycleOutcome::Skipped(reason)) => {
                    debug!("capture skipped: {:?}", reason);
                    summary.skipped += 1;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("capture cycle aborted: {}", err);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Session stopped after {} matched, {} skipped and {} failed captures",
            summary.cycles.len(),
            summary.skipped,
            summary.failed
        );
        summary
    }

    /// Process one event to completion
    pub fn handle_event(&mut self, event: SessionEvent) -> Result<CycleOutcome, SessionError> {
        if self.state == SessionState::Stopped {
            return Ok(CycleOutcome::Ignored);
        }

        let quit_key = self.config.session.quit_key;
        let capture_key = self.config.session.capture_key;
        match event {
            SessionEvent::Closed => self.stop(),
            SessionEvent::KeyPress(key) if key == quit_key => self.stop(),
            SessionEvent::KeyPress(key) if key == capture_key => self.capture(),
            SessionEvent::KeyPress(_) | SessionEvent::Timeout => Ok(CycleOutcome::Ignored),
            SessionEvent::Frame(frame) => {
                self.current_frame = Some(frame);
                Ok(CycleOutcome::FrameUpdated)
            }
        }
    }

    fn stop(&mut self) -> Result<CycleOutcome, SessionError> {
        self.transition(SessionState::Stopped)?;
        self.current_frame = None;
        self.orchestrator.reset();
        Ok(CycleOutcome::Stopped)
    }

    fn capture(&mut self) -> Result<CycleOutcome, SessionError> {
        let Some(frame) = &self.current_frame else {
            return Ok(CycleOutcome::Skipped(SkipReason::NoFrame));
        };
        let frame_index = frame.index();
        let started = Instant::now();

        advance(&mut self.state, SessionState::Extracting)?;
        let extracted = self.extractor.extract(frame, &self.config.extractor);
        let query = match extracted {
            Ok(query) if !query.is_empty() => query,
            Ok(_) => {
                self.transition(SessionState::Idle)?;
                return Ok(CycleOutcome::Skipped(SkipReason::NoDescriptors));
            }
            Err(err) => {
                warn!("extraction failed on frame {}: {}", frame_index, err);
                self.transition(SessionState::Idle)?;
                return Ok(CycleOutcome::Skipped(SkipReason::ExtractionFailed(err.to_string())));
            }
        };

        self.transition(SessionState::Matching)?;
        let reference = Arc::clone(&self.reference);
        let matches = match self.orchestrator.find_correspondences(&query, &reference) {
            Ok(matches) => matches,
            Err(err) => {
                self.transition(SessionState::Idle)?;
                return Err(err.into());
            }
        };
        let elapsed = started.elapsed();
        info!(
            "Object descriptors: {}   matches: {}   process time(ms): {:.2}",
            query.len(),
            matches.len(),
            elapsed.as_secs_f64() * 1000.0
        );

        self.transition(SessionState::Displaying)?;
        self.renderer.render(&matches, &query, &reference);
        self.source
            .pause(Duration::from_millis(self.config.session.display_pause_ms));
        self.transition(SessionState::Idle)?;

        Ok(CycleOutcome::Matched(CycleReport {
            frame_index,
            query_count: query.len(),
            reference_count: reference.len(),
            matches,
            elapsed,
        }))
    }

    fn transition(&mut self, next: SessionState) -> Result<(), SessionError> {
        advance(&mut self.state, next)
    }
}

/// Move `state` to `next` if the state machine allows it
fn advance(state: &mut SessionState, next: SessionState) -> Result<(), SessionError> {
    use SessionState::*;

    let allowed = match (*state, next) {
        (Stopped, _) => false,
        (_, Stopped) => true,
        (Idle, Extracting)
        | (Extracting, Matching)
        | (Extracting, Idle)
        | (Matching, Displaying)
        | (Matching, Idle)
        | (Displaying, Idle) => true,
        _ => false,
    };
    if !allowed {
        return Err(SessionError::InvalidTransition { from: *state, to: next });
    }

    debug!("session: {:?} -> {:?}", *state, next);
    *state = next;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchStrategy;
    use crate::session::replay::{MatchRecorder, PrecomputedExtractor, ScriptedEvents};

    fn reference() -> DescriptorSet {
        let mut set = DescriptorSet::new(8);
        set.push(&[0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7], 0, (10.0, 10.0)).unwrap();
        set.push(&[0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7], 1, (20.0, 20.0)).unwrap();
        set.push(&[4.0, 4.0, 4.0, 4.0, 4.0, 4.0, 4.0, 4.0], 0, (30.0, 30.0)).unwrap();
        set
    }

    fn query() -> DescriptorSet {
        let mut set = DescriptorSet::new(8);
        set.push(&[0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7], 0, (5.0, 5.0)).unwrap();
        set
    }

    type TestSession = CaptureSession<ScriptedEvents, PrecomputedExtractor, MatchRecorder>;

    fn session(captures: Vec<DescriptorSet>) -> TestSession {
        CaptureSession::new(
            MatchConfig::default(),
            reference(),
            ScriptedEvents::default(),
            PrecomputedExtractor::new(captures),
            MatchRecorder::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_capture_cycle_returns_to_idle() {
        let mut session = session(vec![query()]);
        assert_eq!(session.state(), SessionState::Idle);

        let outcome = session.handle_event(SessionEvent::Frame(Frame::empty(7, 0.0))).unwrap();
        assert_eq!(outcome, CycleOutcome::FrameUpdated);

        let outcome = session.handle_event(SessionEvent::KeyPress('c')).unwrap();
        let CycleOutcome::Matched(report) = outcome else {
            panic!("expected a match cycle, got {:?}", outcome);
        };
        assert_eq!(report.frame_index, 7);
        assert_eq!(report.query_count, 1);
        assert_eq!(report.reference_count, 3);
        assert_eq!(report.matches, vec![MatchPair::new(0, 0)]);
        assert_eq!(session.state(), SessionState::Idle);

        assert_eq!(session.renderer().frames().len(), 1);
        assert_eq!(session.source().pauses(), &[Duration::from_millis(3000)]);
    }

    #[test]
    fn test_capture_without_frame_is_skipped() {
        let mut session = session(vec![query()]);
        let outcome = session.handle_event(SessionEvent::KeyPress('c')).unwrap();
        assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::NoFrame));
        assert_eq!(session.extractor().remaining(), 1);
    }

    #[test]
    fn test_empty_extraction_skips_matching() {
        let mut session = session(vec![DescriptorSet::new(8)]);
        session.handle_event(SessionEvent::Frame(Frame::empty(0, 0.0))).unwrap();

        let outcome = session.handle_event(SessionEvent::KeyPress('c')).unwrap();
        assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::NoDescriptors));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.renderer().frames().is_empty());
        assert!(session.source().pauses().is_empty());
    }

    #[test]
    fn test_extraction_failure_is_skipped() {
        // No precomputed sets left: the extractor reports a failure.
        let mut session = session(vec![]);
        session.handle_event(SessionEvent::Frame(Frame::empty(0, 0.0))).unwrap();

        let outcome = session.handle_event(SessionEvent::KeyPress('c')).unwrap();
        assert!(matches!(outcome, CycleOutcome::Skipped(SkipReason::ExtractionFailed(_))));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_match_error_aborts_only_that_cycle() {
        let mut wrong_length = DescriptorSet::new(4);
        wrong_length.push(&[0.0, 0.0, 0.0, 0.0], 0, (0.0, 0.0)).unwrap();
        let mut session = session(vec![wrong_length, query()]);
        session.handle_event(SessionEvent::Frame(Frame::empty(0, 0.0))).unwrap();

        let err = session.handle_event(SessionEvent::KeyPress('c')).unwrap_err();
        assert!(matches!(err, SessionError::Match(FeatureError::DimensionMismatch { .. })));
        assert_eq!(session.state(), SessionState::Idle);

        let outcome = session.handle_event(SessionEvent::KeyPress('c')).unwrap();
        assert!(matches!(outcome, CycleOutcome::Matched(_)));
    }

    #[test]
    fn test_transition_table() {
        let mut state = SessionState::Idle;
        assert!(matches!(
            advance(&mut state, SessionState::Matching),
            Err(SessionError::InvalidTransition { from: SessionState::Idle, to: SessionState::Matching })
        ));
        assert_eq!(state, SessionState::Idle);

        advance(&mut state, SessionState::Extracting).unwrap();
        advance(&mut state, SessionState::Stopped).unwrap();
        assert!(advance(&mut state, SessionState::Idle).is_err());
        assert_eq!(state, SessionState::Stopped);
    }

    #[test]
    fn test_frame_is_kept_across_captures() {
        let mut session = session(vec![query(), query()]);
        session.handle_event(SessionEvent::Frame(Frame::empty(4, 0.0))).unwrap();

        for _ in 0..2 {
            let CycleOutcome::Matched(report) = session.handle_event(SessionEvent::KeyPress('c')).unwrap() else {
                panic!("expected a match cycle");
            };
            assert_eq!(report.frame_index, 4);
        }
        assert_eq!(session.extractor().remaining(), 0);
    }

    #[test]
    fn test_quit_stops_and_ignores_later_events() {
        let mut session = session(vec![query()]);
        session.handle_event(SessionEvent::Frame(Frame::empty(0, 0.0))).unwrap();

        assert_eq!(session.handle_event(SessionEvent::KeyPress('q')).unwrap(), CycleOutcome::Stopped);
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.handle_event(SessionEvent::KeyPress('c')).unwrap(), CycleOutcome::Ignored);
        assert_eq!(session.extractor().remaining(), 1);
    }

    #[test]
    fn test_other_keys_and_timeouts_are_ignored() {
        let mut session = session(vec![]);
        assert_eq!(session.handle_event(SessionEvent::KeyPress('x')).unwrap(), CycleOutcome::Ignored);
        assert_eq!(session.handle_event(SessionEvent::Timeout).unwrap(), CycleOutcome::Ignored);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_run_until_closed() {
        let events = ScriptedEvents::new(vec![
            SessionEvent::Frame(Frame::empty(0, 0.0)),
            SessionEvent::KeyPress('c'),
            SessionEvent::Timeout,
            SessionEvent::KeyPress('c'),
        ]);
        let mut session = CaptureSession::new(
            MatchConfig::default(),
            reference(),
            events,
            PrecomputedExtractor::new(vec![query(), DescriptorSet::new(8)]),
            MatchRecorder::default(),
        )
        .unwrap();

        let summary = session.run();
        assert_eq!(summary.cycles.len(), 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_set_reference_replaces_snapshot() {
        let mut config = MatchConfig::default();
        config.matcher.strategy = MatchStrategy::Approximate;
        let mut session = CaptureSession::new(
            config,
            reference(),
            ScriptedEvents::default(),
            PrecomputedExtractor::new(vec![query()]),
            MatchRecorder::default(),
        )
        .unwrap();

        let old = session.reference();
        let mut replacement = DescriptorSet::new(8);
        replacement.push(&[9.0; 8], 0, (1.0, 1.0)).unwrap();
        replacement.push(&[0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7], 0, (2.0, 2.0)).unwrap();
        session.set_reference(replacement).unwrap();

        // The earlier snapshot is untouched.
        assert_eq!(old.len(), 3);

        session.handle_event(SessionEvent::Frame(Frame::empty(0, 0.0))).unwrap();
        let CycleOutcome::Matched(report) = session.handle_event(SessionEvent::KeyPress('c')).unwrap() else {
            panic!("expected a match cycle");
        };
        assert_eq!(report.matches, vec![MatchPair::new(0, 1)]);
    }
}
