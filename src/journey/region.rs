//! Orthogonal sub-state regions of the `experiencing` state.
//!
//! Two regions observe the same event stream while the guest is on site.
//! Each keeps its own sub-state; neither blocks the other. Transitions are
//! a flat `(region, sub-state, event) -> sub-state` table.

use serde::{Deserialize, Serialize};

use super::event::EventType;

/// Service handling region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Nothing open
    #[default]
    Monitoring,
    /// A service request is being fulfilled
    Servicing,
    /// A complaint is being handled
    HandlingComplaint,
}

/// Satisfaction tracking region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SatisfactionState {
    /// Passive tracking
    #[default]
    Tracking,
    /// Negative feedback or an issue is being addressed
    Addressing,
}

impl ServiceState {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monitoring => "monitoring",
            Self::Servicing => "servicing",
            Self::HandlingComplaint => "handling_complaint",
        }
    }
}

impl SatisfactionState {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tracking => "tracking",
            Self::Addressing => "addressing",
        }
    }
}

/// Identifies one region in transition records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    /// `service_monitoring`
    ServiceMonitoring,
    /// `satisfaction_tracking`
    SatisfactionTracking,
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ServiceMonitoring => "service_monitoring",
            Self::SatisfactionTracking => "satisfaction_tracking",
        })
    }
}

/// A sub-state change in one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionChange {
    /// Region that moved
    pub region: Region,
    /// Sub-state before
    pub from: String,
    /// Sub-state after
    pub to: String,
}

/// Both regions, live only while the journey is `experiencing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExperienceRegions {
    /// `service_monitoring` sub-state
    pub service: ServiceState,
    /// `satisfaction_tracking` sub-state
    pub satisfaction: SatisfactionState,
}

const fn service_next(state: ServiceState, event: EventType) -> Option<ServiceState> {
    use ServiceState::{HandlingComplaint, Monitoring, Servicing};
    match (state, event) {
        (Monitoring, EventType::ServiceRequest) => Some(Servicing),
        (Servicing, EventType::ServiceCompleted) => Some(Monitoring),
        (Monitoring, EventType::Complaint) => Some(HandlingComplaint),
        (HandlingComplaint, EventType::ComplaintResolved) => Some(Monitoring),
        _ => None,
    }
}

const fn satisfaction_next(state: SatisfactionState, event: EventType) -> Option<SatisfactionState> {
    use SatisfactionState::{Addressing, Tracking};
    match (state, event) {
        (Tracking, EventType::NegativeFeedback | EventType::ReportIssue) => Some(Addressing),
        (Addressing, EventType::IssueResolved | EventType::PositiveFeedback) => Some(Tracking),
        _ => None,
    }
}

impl ExperienceRegions {
    /// Feeds one event to both regions and returns the sub-state changes.
    pub fn observe(&mut self, event: EventType) -> Vec<RegionChange> {
        let mut changes = Vec::new();

        if let Some(next) = service_next(self.service, event) {
            changes.push(RegionChange {
                region: Region::ServiceMonitoring,
                from: self.service.as_str().to_string(),
                to: next.as_str().to_string(),
            });
            self.service = next;
        }

        if let Some(next) = satisfaction_next(self.satisfaction, event) {
            changes.push(RegionChange {
                region: Region::SatisfactionTracking,
                from: self.satisfaction.as_str().to_string(),
                to: next.as_str().to_string(),
            });
            self.satisfaction = next;
        }

        changes
    }

    /// Returns whether both regions are at rest.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.service == ServiceState::Monitoring && self.satisfaction == SatisfactionState::Tracking
    }
}
