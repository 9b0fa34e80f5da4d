//! Journey aggregate and its parts.
//!
//! A [`Journey`] is owned by exactly one running machine; everything else
//! sees clones of it. Every mutating operation bumps `version` so a
//! persistence collaborator can upsert idempotently.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::{Event, EventSummary, EventType};
use super::region::ExperienceRegions;
use super::scoring::{INITIAL_OVERALL_SCORE, STAGE_ENTRY_SCORE};
use super::stage::Stage;

// ============================================================================
// Machine states
// ============================================================================

/// State of the journey machine.
///
/// The live path is `awareness -> evaluation -> booking -> confirmed ->
/// experiencing -> completed -> reviewed`, with `reviewed -> booking` as the
/// only back-edge. `stalled` is recoverable; `lost`, `expired`, `no_show`
/// and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyState {
    /// Discovering the property
    Awareness,
    /// Comparing offers
    Evaluation,
    /// Reservation in progress
    Booking,
    /// Reservation paid and confirmed
    Confirmed,
    /// Guest on site
    Experiencing,
    /// Checked out, awaiting review
    Completed,
    /// Review received
    Reviewed,
    /// Went quiet; recoverable
    Stalled,
    /// Abandoned before booking
    Lost,
    /// Booking timed out
    Expired,
    /// Guest never arrived
    NoShow,
    /// Booking cancelled
    Cancelled,
}

impl JourneyState {
    /// Returns the stage this state belongs to, or `None` for states that
    /// keep whatever stage the journey was in (`stalled` and the terminals).
    #[must_use]
    pub const fn stage(self) -> Option<Stage> {
        match self {
            Self::Awareness => Some(Stage::Awareness),
            Self::Evaluation => Some(Stage::Evaluation),
            Self::Booking | Self::Confirmed => Some(Stage::Booking),
            Self::Experiencing => Some(Stage::Experiencing),
            Self::Completed | Self::Reviewed => Some(Stage::Feedback),
            Self::Stalled | Self::Lost | Self::Expired | Self::NoShow | Self::Cancelled => None,
        }
    }

    /// Returns whether no further events are accepted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Lost | Self::Expired | Self::NoShow | Self::Cancelled
        )
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Awareness => "awareness",
            Self::Evaluation => "evaluation",
            Self::Booking => "booking",
            Self::Confirmed => "confirmed",
            Self::Experiencing => "experiencing",
            Self::Completed => "completed",
            Self::Reviewed => "reviewed",
            Self::Stalled => "stalled",
            Self::Lost => "lost",
            Self::Expired => "expired",
            Self::NoShow => "no_show",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JourneyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Stage progress
// ============================================================================

/// Progress through one stage entry. Re-entering a stage creates a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageProgress {
    /// Stage this progress belongs to
    pub stage: Stage,
    /// When the stage was entered
    pub start_time: DateTime<Utc>,
    /// When the stage was left (set on freeze)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Stage quality score in [0, 100]
    pub quality_score: f64,
    /// Whether the stage was left along the live path
    pub is_completed: bool,
    /// Events recorded while this stage was current
    pub events: Vec<EventSummary>,
}

impl StageProgress {
    /// Opens a fresh stage entry at the entry score.
    #[must_use]
    pub const fn enter(stage: Stage, now: DateTime<Utc>) -> Self {
        Self {
            stage,
            start_time: now,
            end_time: None,
            quality_score: STAGE_ENTRY_SCORE,
            is_completed: false,
            events: Vec::new(),
        }
    }

    /// Returns whether the stage has been frozen.
    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.end_time.is_some()
    }

    /// Freezes the entry. Idempotent.
    pub fn freeze(&mut self, now: DateTime<Utc>, completed: bool) {
        if self.end_time.is_none() {
            self.end_time = Some(now);
            self.is_completed = completed;
        }
    }

    /// Returns whether an event of any of `types` was recorded in this entry.
    #[must_use]
    pub fn has_event(&self, types: &[EventType]) -> bool {
        self.events.iter().any(|e| types.contains(&e.event_type))
    }
}

// ============================================================================
// Milestones
// ============================================================================

/// Kind of audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneKind {
    /// Journey created
    JourneyStarted,
    /// Moved between live states
    StateChanged,
    /// Went quiet past the stage deadline
    Stalled,
    /// Came back from `stalled`
    Recovered,
    /// Review received (timed or explicit)
    Completed,
    /// Entered a terminal state
    Failed,
    /// Started again from `reviewed`
    RepeatJourney,
    /// Actor suspended to a snapshot
    Paused,
    /// Actor rehydrated from a snapshot
    Resumed,
    /// Event log cleared
    HistoryCleared,
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    /// Kind of record
    #[serde(rename = "type")]
    pub kind: MilestoneKind,
    /// Stage current when recorded
    pub stage: Stage,
    /// When recorded
    pub timestamp: DateTime<Utc>,
    /// Human-readable description
    pub description: String,
    /// Extra context (from/to states, reasons)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

// ============================================================================
// Deadlines
// ============================================================================

/// A pending timeout for the current state.
///
/// `at` is wall-clock so it survives serialization; the actor converts it
/// to a remaining duration when arming its timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadline {
    /// State the deadline was scheduled for
    pub state: JourneyState,
    /// When it fires
    pub at: DateTime<Utc>,
}

impl Deadline {
    /// Returns the time left before `at`, zero if already due.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.at - now).to_std().unwrap_or_default()
    }
}

// ============================================================================
// Journey aggregate
// ============================================================================

/// One guest's traversal of the lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journey {
    /// Journey id
    pub id: String,
    /// Guest id
    pub entity_id: String,
    /// Machine state
    pub state: JourneyState,
    /// State `stalled` returns to on recovery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stalled_from: Option<JourneyState>,
    /// Current stage
    pub current_stage: Stage,
    /// Latest entry for each stage visited
    pub stages: BTreeMap<Stage, StageProgress>,
    /// Earlier entries replaced by a repeat visit
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stage_history: Vec<StageProgress>,
    /// Rolling journey-wide score
    pub overall_score: f64,
    /// Mean of completed stage scores, set when reviewed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f64>,
    /// Ordered event log
    pub events: Vec<Event>,
    /// Audit log
    pub milestones: Vec<Milestone>,
    /// Parallel regions; present only while `experiencing`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<ExperienceRegions>,
    /// Pending timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Deadline>,
    /// Whether the journey is still in progress
    pub is_active: bool,
    /// When the journey started
    pub start_time: DateTime<Utc>,
    /// When the journey ended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// When the current state was entered
    pub state_entered_at: DateTime<Utc>,
    /// Caller-supplied metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Incremented on every mutation
    pub version: u64,
}

impl Journey {
    /// Creates a journey in `awareness` with a fresh awareness entry.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        entity_id: impl Into<String>,
        metadata: BTreeMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut stages = BTreeMap::new();
        stages.insert(Stage::Awareness, StageProgress::enter(Stage::Awareness, now));

        Self {
            id: id.into(),
            entity_id: entity_id.into(),
            state: JourneyState::Awareness,
            stalled_from: None,
            current_stage: Stage::Awareness,
            stages,
            stage_history: Vec::new(),
            overall_score: INITIAL_OVERALL_SCORE,
            final_score: None,
            events: Vec::new(),
            milestones: Vec::new(),
            regions: None,
            deadline: None,
            is_active: true,
            start_time: now,
            end_time: None,
            state_entered_at: now,
            metadata,
            version: 0,
        }
    }

    /// Returns the entry for the current stage.
    #[must_use]
    pub fn current_progress(&self) -> Option<&StageProgress> {
        self.stages.get(&self.current_stage)
    }

    /// Returns the current stage's quality score.
    #[must_use]
    pub fn stage_quality_score(&self) -> f64 {
        self.current_progress().map_or(0.0, |p| p.quality_score)
    }

    /// Iterates over every stage entry, earlier repeat visits first.
    pub fn all_progress(&self) -> impl Iterator<Item = &StageProgress> {
        self.stage_history.iter().chain(self.stages.values())
    }

    /// Returns how long the journey has been in its current stage.
    #[must_use]
    pub fn time_in_current_stage(&self, now: DateTime<Utc>) -> chrono::Duration {
        let since = self
            .current_progress()
            .map_or(self.state_entered_at, |p| p.start_time);
        now - since
    }

    /// Returns whether the journey has reached a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_journey_defaults() {
        let now = Utc::now();
        let journey = Journey::new("j-1", "guest-1", BTreeMap::new(), now);
        assert_eq!(journey.state, JourneyState::Awareness);
        assert_eq!(journey.current_stage, Stage::Awareness);
        assert!((journey.stage_quality_score() - STAGE_ENTRY_SCORE).abs() < f64::EPSILON);
        assert!(journey.is_active);
        assert_eq!(journey.version, 0);
    }

    #[test]
    fn test_state_stage_mapping() {
        assert_eq!(JourneyState::Confirmed.stage(), Some(Stage::Booking));
        assert_eq!(JourneyState::Reviewed.stage(), Some(Stage::Feedback));
        assert_eq!(JourneyState::Stalled.stage(), None);
    }

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = [
            JourneyState::Awareness,
            JourneyState::Reviewed,
            JourneyState::Stalled,
            JourneyState::Lost,
            JourneyState::Expired,
            JourneyState::NoShow,
            JourneyState::Cancelled,
        ]
        .into_iter()
        .filter(|s| s.is_terminal())
        .collect();
        assert_eq!(
            terminal,
            vec![
                JourneyState::Lost,
                JourneyState::Expired,
                JourneyState::NoShow,
                JourneyState::Cancelled
            ]
        );
    }

    #[test]
    fn test_freeze_is_idempotent() {
        let t0 = Utc::now();
        let mut p = StageProgress::enter(Stage::Booking, t0);
        let t1 = t0 + chrono::Duration::minutes(5);
        p.freeze(t1, true);
        p.freeze(t1 + chrono::Duration::minutes(5), false);
        assert_eq!(p.end_time, Some(t1));
        assert!(p.is_completed);
    }

    #[test]
    fn test_deadline_remaining() {
        let now = Utc::now();
        let deadline = Deadline {
            state: JourneyState::Booking,
            at: now + chrono::Duration::minutes(30),
        };
        assert_eq!(
            deadline.remaining(now + chrono::Duration::minutes(20)),
            std::time::Duration::from_secs(600)
        );
        assert_eq!(
            deadline.remaining(now + chrono::Duration::hours(1)),
            std::time::Duration::ZERO
        );
    }

    #[test]
    fn test_journey_serializes_stage_keys() {
        let journey = Journey::new("j-1", "guest-1", BTreeMap::new(), Utc::now());
        let value = serde_json::to_value(&journey).unwrap();
        assert!(value["stages"].get("awareness").is_some());
        assert_eq!(value["state"], "awareness");
    }

    #[test]
    fn test_time_in_current_stage() {
        let t0 = Utc::now();
        let journey = Journey::new("j-1", "guest-1", BTreeMap::new(), t0);
        assert_eq!(
            journey.time_in_current_stage(t0 + chrono::Duration::minutes(90)),
            chrono::Duration::minutes(90)
        );
    }
}
