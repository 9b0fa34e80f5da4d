//! Guest fulfillment journey engine.
//!
//! A journey moves a guest through five fixed stages (awareness,
//! evaluation, booking, experience, feedback) under a state machine with
//! score guards, timeouts and a stalled/recovery path. Each journey runs
//! in its own actor; the [`Supervisor`] owns the registry and serves
//! cross-journey queries.

pub mod actor;
pub mod analysis;
pub mod clock;
pub mod event;
pub mod machine;
pub mod model;
pub mod notify;
pub mod region;
pub mod scoring;
pub mod snapshot;
pub mod stage;
pub mod supervisor;

pub use actor::JourneyHandle;
pub use analysis::{
    Anomaly, AnomalyKind, AnomalySeverity, PatternAnalysis, RiskIndicator, RiskLevel,
    analyze_patterns, identify_anomalies,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{Command, Event, EventSource, EventType};
pub use machine::{DispatchOutcome, JourneyMachine, Transition};
pub use model::{Deadline, Journey, JourneyState, Milestone, MilestoneKind, StageProgress};
pub use notify::{EventNotice, JourneyListener, ListenerId, SnapshotSink, SnapshotUpdate};
pub use region::{ExperienceRegions, SatisfactionState, ServiceState};
pub use snapshot::{JourneySnapshot, SNAPSHOT_FORMAT_VERSION};
pub use stage::Stage;
pub use supervisor::Supervisor;
