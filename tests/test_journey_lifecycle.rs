mod common;

use common::{Harness, recording_listener};

use journeyflow::error::JourneyError;
use journeyflow::journey::{
    Command, DispatchOutcome, JourneyState, MilestoneKind, Stage,
};

// ============================================================================
// Guards
// ============================================================================

#[tokio::test]
async fn view_details_is_informational_until_advance() {
    let h = Harness::new();
    h.create("j-1");

    for _ in 0..3 {
        let outcome = h
            .supervisor
            .dispatch_with_outcome("j-1", Command::new("VIEW_DETAILS"))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Recorded);
    }
    assert_eq!(h.supervisor.snapshot("j-1").unwrap().state, JourneyState::Awareness);

    let outcome = h
        .supervisor
        .dispatch_with_outcome("j-1", Command::new("ADVANCE_STAGE"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Transitioned {
            from: JourneyState::Awareness,
            to: JourneyState::Evaluation,
        }
    );

    let j = h.supervisor.snapshot("j-1").unwrap();
    assert_eq!(j.current_stage, Stage::Evaluation);
    assert!(j.stages[&Stage::Awareness].is_completed);
    assert!(j.stages[&Stage::Awareness].end_time.is_some());
}

#[tokio::test]
async fn booking_advance_without_payment_is_a_no_op() {
    let h = Harness::new();
    h.create("j-1");
    h.send("j-1", "SHOW_INTEREST").await;
    h.send("j-1", "MAKE_BOOKING").await;

    let outcome = h
        .supervisor
        .dispatch_with_outcome("j-1", Command::new("ADVANCE_STAGE"))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        DispatchOutcome::GuardRejected {
            state: JourneyState::Booking,
            ..
        }
    ));
    assert_eq!(h.supervisor.snapshot("j-1").unwrap().state, JourneyState::Booking);
}

// ============================================================================
// Full lifecycle
// ============================================================================

#[tokio::test]
async fn full_lifecycle_reaches_reviewed_with_final_score() {
    let h = Harness::new();
    let handle = h.create("j-1");
    let (seen, listener) = recording_listener();
    h.supervisor.add_listener(listener);

    let steps = [
        "SHOW_INTEREST",
        "MAKE_BOOKING",
        "ADVANCE_STAGE",
        "PAYMENT_SUCCESS",
        "ADVANCE_STAGE",
        "CHECK_IN",
        "SERVICE_REQUEST",
        "CHECK_OUT",
        "SUBMIT_REVIEW",
    ];
    let mut orders = vec![handle.stage().order()];
    for kind in steps {
        h.send("j-1", kind).await;
        orders.push(handle.stage().order());
    }

    // non-decreasing, never skipping an order value
    assert!(orders.windows(2).all(|w| w[1] == w[0] || w[1] == w[0] + 1));

    let j = handle.snapshot();
    assert_eq!(j.state, JourneyState::Reviewed);
    assert_eq!(j.current_stage, Stage::Feedback);
    assert!(!j.is_active);
    assert!((j.final_score.unwrap() - 92.4).abs() < 1e-9);
    assert!((j.overall_score - 57.2).abs() < 1e-9);
    assert_eq!(j.events.len(), steps.len());

    h.supervisor.flush().await;
    let notices = seen.lock().unwrap().clone();
    assert_eq!(notices.len(), steps.len());
    assert_eq!(notices.last().unwrap().state, JourneyState::Reviewed);
    assert!(notices.windows(2).all(|w| w[0].version < w[1].version));

    // reviewed journeys are not active, so not reported as such
    assert!(h.supervisor.active_journeys().is_empty());
}

#[tokio::test]
async fn repeat_journey_loops_back_to_booking() {
    let h = Harness::new();
    h.create("j-1");
    for kind in [
        "SHOW_INTEREST",
        "MAKE_BOOKING",
        "BOOKING_CONFIRMED",
        "CHECK_IN",
        "CHECK_OUT",
        "SUBMIT_REVIEW",
        "START_NEW_JOURNEY",
    ] {
        h.send("j-1", kind).await;
    }

    let j = h.supervisor.snapshot("j-1").unwrap();
    assert_eq!(j.state, JourneyState::Booking);
    assert_eq!(j.current_stage, Stage::Booking);
    assert!(j.is_active);
    assert_eq!(j.milestones.last().unwrap().kind, MilestoneKind::RepeatJourney);
    assert!((j.stages[&Stage::Booking].quality_score - 80.0).abs() < f64::EPSILON);
}

// ============================================================================
// Rejections
// ============================================================================

#[tokio::test]
async fn invalid_event_rejected_identically_twice() {
    let h = Harness::new();
    h.create("j-1");

    let mut messages = Vec::new();
    for _ in 0..2 {
        let err = h
            .supervisor
            .dispatch("j-1", Command::new("PAGE_VIEW").with_impact(101))
            .await
            .unwrap_err();
        assert!(matches!(err, JourneyError::InvalidEvent(_)));
        messages.push(err.to_string());
    }
    assert_eq!(messages[0], messages[1]);
    assert!(h.supervisor.snapshot("j-1").unwrap().events.is_empty());
}

#[tokio::test]
async fn terminal_journey_is_immutable() {
    let h = Harness::new();
    h.create("j-1");
    h.send("j-1", "SHOW_INTEREST").await;
    h.send("j-1", "ABANDON").await;

    let before = h.supervisor.snapshot("j-1").unwrap();
    assert_eq!(before.state, JourneyState::Lost);
    assert!(!before.is_active);

    for kind in ["PAGE_VIEW", "SHOW_INTEREST", "START_NEW_JOURNEY"] {
        let err = h
            .supervisor
            .dispatch("j-1", Command::new(kind))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JourneyError::JourneyInactive {
                state: JourneyState::Lost,
                ..
            }
        ));
    }

    let after = h.supervisor.snapshot("j-1").unwrap();
    assert_eq!(after.events, before.events);
    assert_eq!(after.stages, before.stages);
    assert!((after.overall_score - before.overall_score).abs() < f64::EPSILON);
}

#[tokio::test]
async fn reviewed_journey_rejects_everything_but_a_new_stay() {
    let h = Harness::new();
    h.create("j-1");
    for kind in [
        "SHOW_INTEREST",
        "MAKE_BOOKING",
        "BOOKING_CONFIRMED",
        "CHECK_IN",
        "CHECK_OUT",
        "SUBMIT_REVIEW",
    ] {
        h.send("j-1", kind).await;
    }

    let before = h.supervisor.snapshot("j-1").unwrap();
    assert_eq!(before.state, JourneyState::Reviewed);
    assert!(!before.is_active);

    let err = h
        .supervisor
        .dispatch("j-1", Command::new("COMPLAINT"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        JourneyError::JourneyInactive {
            state: JourneyState::Reviewed,
            ..
        }
    ));

    let after = h.supervisor.snapshot("j-1").unwrap();
    assert_eq!(after.events, before.events);
    assert_eq!(after.version, before.version);
    assert!((after.overall_score - before.overall_score).abs() < f64::EPSILON);

    h.send("j-1", "START_NEW_JOURNEY").await;
    assert!(h.supervisor.snapshot("j-1").unwrap().is_active);
}

#[tokio::test]
async fn cancel_and_no_show_are_terminal() {
    let h = Harness::new();
    h.create("cancel");
    h.create("noshow");
    for id in ["cancel", "noshow"] {
        h.send(id, "SHOW_INTEREST").await;
        h.send(id, "MAKE_BOOKING").await;
    }
    h.send("cancel", "CANCEL_BOOKING").await;
    h.send("noshow", "BOOKING_CONFIRMED").await;
    h.send("noshow", "NO_SHOW").await;

    assert_eq!(
        h.supervisor.snapshot("cancel").unwrap().state,
        JourneyState::Cancelled
    );
    assert_eq!(
        h.supervisor.snapshot("noshow").unwrap().state,
        JourneyState::NoShow
    );
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn latest_version_is_persisted_in_order() {
    let h = Harness::new();
    h.create("j-1");

    for kind in ["PAGE_VIEW", "SHOW_INTEREST", "COMPARE_OPTIONS"] {
        h.send("j-1", kind).await;
        h.supervisor.flush().await;

        let current = h.supervisor.snapshot("j-1").unwrap().version;
        let versions = h.sink.versions("j-1");
        assert_eq!(versions.last().copied(), Some(current));
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
    }
}
