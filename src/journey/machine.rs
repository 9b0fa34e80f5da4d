//! Journey state machine
//!
//! [`JourneyMachine`] is the synchronous core of one journey actor. It owns
//! the [`Journey`] aggregate, validates and records events, evaluates
//! guards, and applies transition side effects. It never sleeps: the
//! pending deadline is stored on the journey and the owning actor arms a
//! timer for it, calling [`JourneyMachine::expire`] when it fires.
//!
//! Apply order for one command:
//! 1. build and validate the event (`InvalidEvent` first)
//! 2. reject if the journey is terminal, or reviewed and not starting over
//!    (`JourneyInactive`)
//! 3. append to the log and update scores
//! 4. feed the experience regions (only while `experiencing`)
//! 5. route and evaluate the guard

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::JourneyError;

use super::event::{Command, Event, EventData, EventSource, EventType, NewEvent};
use super::model::{Deadline, Journey, JourneyState, Milestone, MilestoneKind, StageProgress};
use super::region::{ExperienceRegions, RegionChange};
use super::scoring;
use super::stage::Stage;

// ============================================================================
// Results
// ============================================================================

/// Record of a state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// State before
    pub from: JourneyState,
    /// State after
    pub to: JourneyState,
    /// What caused it (event type or timeout)
    pub reason: String,
}

/// What an accepted command did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The event moved the journey to another state
    Transitioned {
        /// State before
        from: JourneyState,
        /// State after
        to: JourneyState,
    },
    /// The event was recorded; no transition applies to it
    Recorded,
    /// The event was recorded but its advance was held back by a guard
    GuardRejected {
        /// State the journey stays in
        state: JourneyState,
        /// Why the guard failed
        reason: String,
    },
}

/// Result of applying one command.
#[derive(Debug, Clone)]
pub struct Applied {
    /// The event appended to the log
    pub event: Event,
    /// Outcome of routing the event
    pub outcome: DispatchOutcome,
    /// The transition, when one happened
    pub transition: Option<Transition>,
    /// Sub-state changes in the experience regions
    pub region_changes: Vec<RegionChange>,
}

/// Result of a deadline firing.
#[derive(Debug, Clone)]
pub struct TimedOut {
    /// The timeout transition
    pub transition: Transition,
    /// Event synthesized by the timeout (the neutral review)
    pub synthesized: Option<Event>,
}

enum Route {
    Stay,
    Move(JourneyState),
    Blocked(String),
}

// ============================================================================
// Machine
// ============================================================================

/// Synchronous state machine owning one journey.
#[derive(Debug)]
pub struct JourneyMachine {
    journey: Journey,
    config: Arc<EngineConfig>,
}

impl JourneyMachine {
    /// Starts a new journey in `awareness` and schedules its deadline.
    #[must_use]
    pub fn start(
        journey_id: impl Into<String>,
        entity_id: impl Into<String>,
        metadata: BTreeMap<String, serde_json::Value>,
        now: DateTime<Utc>,
        config: Arc<EngineConfig>,
    ) -> Self {
        let journey = Journey::new(journey_id, entity_id, metadata, now);
        let mut machine = Self { journey, config };

        machine.journey.deadline = machine.deadline_for(JourneyState::Awareness, now);
        machine.milestone(
            MilestoneKind::JourneyStarted,
            now,
            "journey started".to_string(),
            BTreeMap::new(),
        );
        machine.journey.version += 1;
        machine
    }

    /// Wraps an existing journey (e.g. a rehydrated snapshot).
    #[must_use]
    pub const fn resume(journey: Journey, config: Arc<EngineConfig>) -> Self {
        Self { journey, config }
    }

    /// Returns the owned journey.
    #[must_use]
    pub const fn journey(&self) -> &Journey {
        &self.journey
    }

    /// Consumes the machine, returning the journey.
    #[must_use]
    pub fn into_journey(self) -> Journey {
        self.journey
    }

    /// Returns the pending deadline.
    #[must_use]
    pub const fn deadline(&self) -> Option<Deadline> {
        self.journey.deadline
    }

    /// Applies one inbound command.
    ///
    /// A failed guard is not an error: the event is recorded and the
    /// outcome is [`DispatchOutcome::GuardRejected`].
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError::InvalidEvent`] for a malformed command and
    /// [`JourneyError::JourneyInactive`] when the journey is terminal, or
    /// reviewed and the command is not `START_NEW_JOURNEY`. The journey is
    /// untouched in both cases.
    pub fn apply(&mut self, command: &Command, now: DateTime<Utc>) -> Result<Applied, JourneyError> {
        let event = command.to_event(
            &self.journey.id,
            &self.journey.entity_id,
            self.journey.current_stage,
            now,
        )?;

        if !self.accepts(event.event_type) {
            return Err(JourneyError::JourneyInactive {
                journey_id: self.journey.id.clone(),
                state: self.journey.state,
            });
        }

        self.record(&event);

        let region_changes = self.observe_regions(event.event_type);

        let state = self.journey.state;
        let (outcome, transition) = match self.route(&event) {
            Route::Stay => (DispatchOutcome::Recorded, None),
            Route::Blocked(reason) => {
                info!(
                    journey_id = %self.journey.id,
                    state = %state,
                    event_type = %event.event_type,
                    reason = %reason,
                    "advance held back by guard"
                );
                (DispatchOutcome::GuardRejected { state, reason }, None)
            }
            Route::Move(to) => {
                let transition = self.transition(to, event.event_type.to_string(), now);
                (
                    DispatchOutcome::Transitioned {
                        from: transition.from,
                        to: transition.to,
                    },
                    Some(transition),
                )
            }
        };

        Ok(Applied {
            event,
            outcome,
            transition,
            region_changes,
        })
    }

    /// Returns whether the journey takes `event_type` in its current state.
    /// Terminal states take nothing; `reviewed` only takes the repeat
    /// back-edge.
    fn accepts(&self, event_type: EventType) -> bool {
        match self.journey.state {
            JourneyState::Reviewed => event_type == EventType::StartNewJourney,
            state => !state.is_terminal(),
        }
    }

    /// Fires `deadline` if it is still the journey's pending deadline.
    ///
    /// Returns `None` for a stale deadline (the journey moved on since it
    /// was armed).
    pub fn expire(&mut self, deadline: Deadline, now: DateTime<Utc>) -> Option<TimedOut> {
        if self.journey.deadline != Some(deadline) || self.journey.state != deadline.state {
            debug!(journey_id = %self.journey.id, state = %deadline.state, "stale deadline ignored");
            return None;
        }

        let (to, synthesized) = match deadline.state {
            JourneyState::Awareness | JourneyState::Evaluation => (JourneyState::Stalled, None),
            JourneyState::Booking => (JourneyState::Expired, None),
            JourneyState::Stalled => (JourneyState::Lost, None),
            JourneyState::Completed => (JourneyState::Reviewed, self.synthesize_review(now)),
            _ => return None,
        };

        let transition = self.transition(to, format!("{} timeout", deadline.state), now);
        Some(TimedOut {
            transition,
            synthesized,
        })
    }

    /// Records that the actor is being suspended to a snapshot.
    pub fn mark_paused(&mut self, now: DateTime<Utc>) {
        self.milestone(MilestoneKind::Paused, now, "journey paused".to_string(), BTreeMap::new());
        self.journey.version += 1;
    }

    /// Records that the actor was rehydrated from a snapshot.
    pub fn mark_resumed(&mut self, now: DateTime<Utc>) {
        self.milestone(MilestoneKind::Resumed, now, "journey resumed".to_string(), BTreeMap::new());
        self.journey.version += 1;
    }

    /// Empties the event log. Returns the number of events removed.
    pub fn clear_history(&mut self, now: DateTime<Utc>) -> usize {
        let cleared = self.journey.events.len();
        self.journey.events.clear();

        let mut metadata = BTreeMap::new();
        metadata.insert("cleared".to_string(), serde_json::json!(cleared));
        self.milestone(
            MilestoneKind::HistoryCleared,
            now,
            format!("cleared {cleared} events"),
            metadata,
        );
        self.journey.version += 1;
        cleared
    }

    // ========================================================================
    // Recording
    // ========================================================================

    fn record(&mut self, event: &Event) {
        let stage = self.journey.current_stage;
        if let Some(progress) = self
            .journey
            .stages
            .get_mut(&stage)
            .filter(|p| !p.is_frozen())
        {
            progress.quality_score = scoring::apply_stage_impact(progress.quality_score, event.impact);
            progress.events.push(event.summary());
        }

        self.journey.overall_score =
            scoring::apply_overall_impact(self.journey.overall_score, event.impact);
        self.journey.events.push(event.clone());
        self.journey.version += 1;

        debug!(
            journey_id = %self.journey.id,
            event_type = %event.event_type,
            impact = event.impact,
            "event recorded"
        );
    }

    fn observe_regions(&mut self, event_type: EventType) -> Vec<RegionChange> {
        if self.journey.state != JourneyState::Experiencing {
            return Vec::new();
        }
        let Some(regions) = self.journey.regions.as_mut() else {
            return Vec::new();
        };

        let changes = regions.observe(event_type);
        for change in &changes {
            debug!(
                journey_id = %self.journey.id,
                region = %change.region,
                from = %change.from,
                to = %change.to,
                "region transition"
            );
        }
        changes
    }

    fn synthesize_review(&mut self, now: DateTime<Utc>) -> Option<Event> {
        let mut data = EventData::new();
        data.insert("synthesized".to_string(), serde_json::json!(true));

        let event = Event::create(
            NewEvent {
                journey_id: &self.journey.id,
                entity_id: &self.journey.entity_id,
                event_type: EventType::SubmitReview,
                stage: self.journey.current_stage,
                data,
                impact: 0,
                source: Some(EventSource::System),
            },
            now,
        )
        .ok()?;

        self.record(&event);
        Some(event)
    }

    // ========================================================================
    // Routing
    // ========================================================================

    fn route(&self, event: &Event) -> Route {
        use EventType as E;
        use JourneyState as S;

        let guards = &self.config.guards;
        let score = self.journey.stage_quality_score();

        match (self.journey.state, event.event_type) {
            (S::Awareness, E::ShowInterest | E::AdvanceStage) => {
                score_guard(score, guards.awareness_min_score, S::Evaluation)
            }
            (S::Awareness | S::Evaluation | S::Stalled, E::Abandon) => Route::Move(S::Lost),
            (S::Evaluation, E::MakeBooking | E::AdvanceStage) => {
                score_guard(score, guards.evaluation_min_score, S::Booking)
            }
            (S::Booking, E::AdvanceStage | E::BookingConfirmed) => {
                let paid = self
                    .journey
                    .current_progress()
                    .is_some_and(|p| p.has_event(&[E::PaymentSuccess, E::BookingConfirmed]));
                if paid {
                    Route::Move(S::Confirmed)
                } else {
                    Route::Blocked("no payment or confirmation recorded in booking".to_string())
                }
            }
            (S::Booking | S::Confirmed, E::CancelBooking) => Route::Move(S::Cancelled),
            (S::Confirmed, E::CheckIn | E::AdvanceStage) => Route::Move(S::Experiencing),
            (S::Confirmed, E::NoShow) => Route::Move(S::NoShow),
            (S::Experiencing, E::CheckOut | E::AdvanceStage) => Route::Move(S::Completed),
            (S::Completed, E::SubmitReview | E::AdvanceStage) => Route::Move(S::Reviewed),
            (S::Reviewed, E::StartNewJourney) => Route::Move(S::Booking),
            (S::Stalled, _) if event.source == EventSource::User => {
                self.journey.stalled_from.map_or(Route::Stay, Route::Move)
            }
            _ => Route::Stay,
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn transition(&mut self, to: JourneyState, reason: String, now: DateTime<Utc>) -> Transition {
        let from = self.journey.state;
        let from_stage = self.journey.current_stage;
        let to_stage = to.stage().unwrap_or(from_stage);
        let deadline = self.deadline_for(to, now);
        let j = &mut self.journey;

        if to.is_terminal() {
            if let Some(progress) = j.stages.get_mut(&from_stage) {
                progress.freeze(now, false);
            }
            j.is_active = false;
            j.end_time = Some(now);
        } else if to_stage != from_stage {
            if let Some(progress) = j.stages.get_mut(&from_stage) {
                progress.freeze(now, true);
            }
            if let Some(previous) = j.stages.insert(to_stage, StageProgress::enter(to_stage, now)) {
                j.stage_history.push(previous);
            }
            j.current_stage = to_stage;
        }

        j.stalled_from = (to == JourneyState::Stalled).then_some(from);

        if to == JourneyState::Reviewed {
            if let Some(progress) = j.stages.get_mut(&Stage::Feedback) {
                progress.freeze(now, true);
            }
            j.final_score = Some(scoring::final_score(j.all_progress()));
            j.is_active = false;
            j.end_time = Some(now);
        } else if from == JourneyState::Reviewed {
            j.is_active = true;
            j.end_time = None;
        }

        j.regions = (to == JourneyState::Experiencing).then(ExperienceRegions::default);
        j.state = to;
        j.state_entered_at = now;
        j.deadline = deadline;

        let mut metadata = BTreeMap::new();
        metadata.insert("from".to_string(), serde_json::json!(from));
        metadata.insert("to".to_string(), serde_json::json!(to));
        metadata.insert("reason".to_string(), serde_json::json!(reason));
        self.milestone(
            milestone_kind(from, to),
            now,
            format!("{from} -> {to}"),
            metadata,
        );
        self.journey.version += 1;

        info!(
            journey_id = %self.journey.id,
            from = %from,
            to = %to,
            reason = %reason,
            "journey transition"
        );

        Transition { from, to, reason }
    }

    fn deadline_for(&self, state: JourneyState, now: DateTime<Utc>) -> Option<Deadline> {
        let timeout = self.config.timeouts.for_state(state)?;
        let at = now.checked_add_signed(chrono::Duration::from_std(timeout).ok()?)?;
        Some(Deadline { state, at })
    }

    fn milestone(
        &mut self,
        kind: MilestoneKind,
        now: DateTime<Utc>,
        description: String,
        metadata: BTreeMap<String, serde_json::Value>,
    ) {
        self.journey.milestones.push(Milestone {
            kind,
            stage: self.journey.current_stage,
            timestamp: now,
            description,
            metadata,
        });
    }
}

fn score_guard(score: f64, min: f64, to: JourneyState) -> Route {
    if score >= min {
        Route::Move(to)
    } else {
        Route::Blocked(format!(
            "stage quality score {score:.1} below minimum {min:.1}"
        ))
    }
}

const fn milestone_kind(from: JourneyState, to: JourneyState) -> MilestoneKind {
    match (from, to) {
        (_, JourneyState::Stalled) => MilestoneKind::Stalled,
        (_, to) if to.is_terminal() => MilestoneKind::Failed,
        (JourneyState::Stalled, _) => MilestoneKind::Recovered,
        (_, JourneyState::Reviewed) => MilestoneKind::Completed,
        (JourneyState::Reviewed, _) => MilestoneKind::RepeatJourney,
        _ => MilestoneKind::StateChanged,
    }
}
