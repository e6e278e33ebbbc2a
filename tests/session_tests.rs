use std::time::Duration;

use rustmatch::config::{MatchConfig, MatchStrategy};
use rustmatch::features::{DescriptorSet, MatchPair};
use rustmatch::io::Frame;
use rustmatch::session::{
    CaptureSession, CycleOutcome, MatchRecorder, PrecomputedExtractor, ScriptedEvents, SessionEvent,
    SessionState,
};
use rustmatch::test_utils::{perturbed, separated_set};

#[test]
fn replayed_captures_are_matched_and_displayed() {
    let reference = separated_set(12, 16, 1).unwrap();
    let first = perturbed(&reference, 0.05, 2).unwrap();
    let second = perturbed(&reference, 0.05, 3).unwrap();

    let mut session = CaptureSession::new(
        MatchConfig::default(),
        reference.clone(),
        ScriptedEvents::captures(3, 'c', 'q'),
        PrecomputedExtractor::new(vec![first, DescriptorSet::new(16), second]),
        MatchRecorder::default(),
    )
    .unwrap();

    let summary = session.run();

    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(summary.cycles.len(), 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.cycles[0].frame_index, 0);
    assert_eq!(summary.cycles[1].frame_index, 2);

    let expected: Vec<MatchPair> = (0..12).map(|i| MatchPair::new(i, i)).collect();
    for cycle in &summary.cycles {
        assert_eq!(cycle.query_count, 12);
        assert_eq!(cycle.reference_count, 12);
        assert_eq!(cycle.matches, expected);
    }

    // Only displayed cycles are rendered and held on screen.
    let frames = session.renderer().frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0][3].reference_position, reference.position(3).unwrap());
    assert_eq!(session.source().pauses(), &[Duration::from_millis(3000); 2]);
    assert_eq!(session.extractor().remaining(), 0);
}

#[test]
fn approximate_session_reuses_prepared_reference() {
    let reference = separated_set(20, 32, 11).unwrap();
    let captures = (0..3).map(|seed| perturbed(&reference, 0.05, 100 + seed).unwrap()).collect();

    let mut session = CaptureSession::new(
        MatchConfig::approximate(),
        reference,
        ScriptedEvents::captures(3, 'c', 'q'),
        PrecomputedExtractor::new(captures),
        MatchRecorder::default(),
    )
    .unwrap();

    let summary = session.run();
    assert_eq!(summary.cycles.len(), 3);
    assert!(summary.cycles.iter().all(|cycle| cycle.matches.len() == 20));
}

#[test]
fn custom_keys_drive_the_session() {
    let mut config = MatchConfig::default();
    config.matcher.strategy = MatchStrategy::Exact;
    config.session.capture_key = ' ';
    config.session.quit_key = 'x';
    config.session.display_pause_ms = 10;

    let reference = separated_set(5, 8, 21).unwrap();
    let query = perturbed(&reference, 0.05, 22).unwrap();
    let mut session = CaptureSession::new(
        config,
        reference,
        ScriptedEvents::default(),
        PrecomputedExtractor::new(vec![query]),
        MatchRecorder::default(),
    )
    .unwrap();

    session.handle_event(SessionEvent::Frame(Frame::empty(0, 0.0))).unwrap();
    assert_eq!(session.handle_event(SessionEvent::KeyPress('c')).unwrap(), CycleOutcome::Ignored);
    assert!(matches!(
        session.handle_event(SessionEvent::KeyPress(' ')).unwrap(),
        CycleOutcome::Matched(_)
    ));
    assert_eq!(session.source().pauses(), &[Duration::from_millis(10)]);
    assert_eq!(session.handle_event(SessionEvent::KeyPress('x')).unwrap(), CycleOutcome::Stopped);
}
