//! Event model
//!
//! Immutable, impact-scored occurrences attributed to a journey. Event
//! types form a closed set; each carries a default impact and a default
//! source, and an unknown type identifier is rejected as
//! [`JourneyError::InvalidEvent`] rather than scored as zero.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JourneyError;

use super::stage::Stage;

/// Largest absolute impact an event may carry.
pub const MAX_IMPACT: i32 = 100;

/// Free-form payload attached to an event or command.
pub type EventData = BTreeMap<String, serde_json::Value>;

/// Who initiated an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// The guest
    User,
    /// An automated subsystem (payments, timers)
    System,
    /// Hotel staff
    Staff,
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::System => "system",
            Self::Staff => "staff",
        })
    }
}

macro_rules! event_types {
    ($( $variant:ident => $wire:literal, $impact:expr, $source:ident; )*) => {
        /// Closed set of event types understood by the engine.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum EventType {
            $(
                #[doc = concat!("`", $wire, "`")]
                $variant,
            )*
        }

        impl EventType {
            /// Every event type, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),*];

            /// Returns the wire identifier.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)*
                }
            }

            /// Returns the impact applied when the command does not override it.
            #[must_use]
            pub const fn default_impact(self) -> i32 {
                match self {
                    $(Self::$variant => $impact,)*
                }
            }

            /// Returns the source assumed when the command does not name one.
            #[must_use]
            pub const fn default_source(self) -> EventSource {
                match self {
                    $(Self::$variant => EventSource::$source,)*
                }
            }
        }
    };
}

event_types! {
    PageView => "PAGE_VIEW", 1, User;
    ViewDetails => "VIEW_DETAILS", 5, User;
    SearchAvailability => "SEARCH_AVAILABILITY", 5, User;
    CompareOptions => "COMPARE_OPTIONS", 3, User;
    ShowInterest => "SHOW_INTEREST", 10, User;
    AdvanceStage => "ADVANCE_STAGE", 0, System;
    MakeBooking => "MAKE_BOOKING", 15, User;
    PaymentSuccess => "PAYMENT_SUCCESS", 20, System;
    PaymentFailed => "PAYMENT_FAILED", -15, System;
    BookingConfirmed => "BOOKING_CONFIRMED", 20, System;
    CancelBooking => "CANCEL_BOOKING", -30, User;
    NoShow => "NO_SHOW", -50, Staff;
    CheckIn => "CHECK_IN", 10, Staff;
    CheckOut => "CHECK_OUT", 5, Staff;
    ServiceRequest => "SERVICE_REQUEST", 2, User;
    ServiceCompleted => "SERVICE_COMPLETED", 8, Staff;
    Complaint => "COMPLAINT", -20, User;
    ComplaintResolved => "COMPLAINT_RESOLVED", 15, Staff;
    ReportIssue => "REPORT_ISSUE", -15, User;
    IssueResolved => "ISSUE_RESOLVED", 10, Staff;
    NegativeFeedback => "NEGATIVE_FEEDBACK", -10, User;
    PositiveFeedback => "POSITIVE_FEEDBACK", 10, User;
    SubmitReview => "SUBMIT_REVIEW", 10, User;
    StartNewJourney => "START_NEW_JOURNEY", 10, User;
    Abandon => "ABANDON", -20, User;
}

impl EventType {
    /// Parses a wire identifier.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError::InvalidEvent`] for empty or unknown identifiers.
    pub fn parse(s: &str) -> Result<Self, JourneyError> {
        if s.trim().is_empty() {
            return Err(JourneyError::InvalidEvent("event type is empty".to_string()));
        }
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| JourneyError::InvalidEvent(format!("unknown event type '{s}'")))
    }

    /// Returns whether this type counts as a guest complaint.
    #[must_use]
    pub const fn is_complaint(self) -> bool {
        matches!(self, Self::Complaint | Self::ReportIssue)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single immutable occurrence in a journey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event id
    pub id: String,
    /// Journey the event belongs to
    pub journey_id: String,
    /// Guest the journey belongs to
    pub entity_id: String,
    /// Event type
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Stage the journey was in when the event occurred
    pub stage: Stage,
    /// When the event was recorded
    pub timestamp: DateTime<Utc>,
    /// Score impact in [-100, 100]
    pub impact: i32,
    /// Free-form payload
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: EventData,
    /// Initiator
    pub source: EventSource,
}

/// Fields needed to build an [`Event`].
#[derive(Debug, Clone)]
pub struct NewEvent<'a> {
    /// Journey id (must be non-empty)
    pub journey_id: &'a str,
    /// Entity id (must be non-empty)
    pub entity_id: &'a str,
    /// Event type
    pub event_type: EventType,
    /// Stage the event is attributed to
    pub stage: Stage,
    /// Payload
    pub data: EventData,
    /// Score impact
    pub impact: i32,
    /// Initiator; falls back to the type's default
    pub source: Option<EventSource>,
}

impl Event {
    /// Validates and builds an event.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError::InvalidEvent`] when an id is empty or
    /// `|impact| > 100`. Nothing is created on failure.
    pub fn create(new: NewEvent<'_>, timestamp: DateTime<Utc>) -> Result<Self, JourneyError> {
        if new.journey_id.trim().is_empty() {
            return Err(JourneyError::InvalidEvent("journey id is empty".to_string()));
        }
        if new.entity_id.trim().is_empty() {
            return Err(JourneyError::InvalidEvent("entity id is empty".to_string()));
        }
        if new.impact.unsigned_abs() > MAX_IMPACT.unsigned_abs() {
            return Err(JourneyError::InvalidEvent(format!(
                "impact {} outside [-{MAX_IMPACT}, {MAX_IMPACT}]",
                new.impact
            )));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            journey_id: new.journey_id.to_string(),
            entity_id: new.entity_id.to_string(),
            event_type: new.event_type,
            stage: new.stage,
            timestamp,
            impact: new.impact,
            data: new.data,
            source: new.source.unwrap_or_else(|| new.event_type.default_source()),
        })
    }

    /// Returns the compact form kept in stage progress.
    #[must_use]
    pub fn summary(&self) -> EventSummary {
        EventSummary {
            id: self.id.clone(),
            event_type: self.event_type,
            impact: self.impact,
            timestamp: self.timestamp,
        }
    }
}

/// Compact event record kept inside a stage's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    /// Event id
    pub id: String,
    /// Event type
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Score impact
    pub impact: i32,
    /// When the event was recorded
    pub timestamp: DateTime<Utc>,
}

/// Inbound domain command as received from the API layer.
///
/// `type` is kept as a raw string so an unknown identifier surfaces as
/// [`JourneyError::InvalidEvent`] from the engine rather than as a
/// deserialization failure upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Event type identifier, e.g. `"CHECK_IN"`
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EventData>,
    /// Optional impact override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<i32>,
    /// Optional source override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<EventSource>,
}

impl Command {
    /// Creates a command with no payload or overrides.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Sets the impact override.
    #[must_use]
    pub fn with_impact(mut self, impact: i32) -> Self {
        self.impact = Some(impact);
        self
    }

    /// Sets the source override.
    #[must_use]
    pub fn with_source(mut self, source: EventSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Adds one payload entry.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data
            .get_or_insert_with(EventData::new)
            .insert(key.into(), value);
        self
    }

    /// Resolves the event type.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError::InvalidEvent`] for an unknown identifier.
    pub fn event_type(&self) -> Result<EventType, JourneyError> {
        EventType::parse(&self.kind)
    }

    /// Builds the validated event this command produces at `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError::InvalidEvent`] if the type is unknown or the
    /// resulting event fails validation.
    pub fn to_event(
        &self,
        journey_id: &str,
        entity_id: &str,
        stage: Stage,
        timestamp: DateTime<Utc>,
    ) -> Result<Event, JourneyError> {
        let event_type = self.event_type()?;
        Event::create(
            NewEvent {
                journey_id,
                entity_id,
                event_type,
                stage,
                data: self.data.clone().unwrap_or_default(),
                impact: self.impact.unwrap_or_else(|| event_type.default_impact()),
                source: self.source,
            },
            timestamp,
        )
    }
}
