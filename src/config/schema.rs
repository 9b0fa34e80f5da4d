//! Engine configuration schema
//!
//! Every field has a default, so an empty document (or no document at all)
//! yields the stock policy. Durations are written in humantime form
//! (`30m`, `24h`, `7d`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::journey::JourneyState;

// ============================================================================
// Top-Level Configuration
// ============================================================================

/// Root configuration for the journey engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Per-state deadlines
    pub timeouts: TimeoutConfig,

    /// Score thresholds for guarded transitions
    pub guards: GuardConfig,

    /// Pattern and anomaly thresholds
    pub analysis: AnalysisConfig,

    /// Supervisor scan settings
    pub supervisor: SupervisorConfig,
}

// ============================================================================
// Timeouts
// ============================================================================

/// Deadline armed on entry to each timed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    /// `awareness` -> `stalled`
    #[serde(with = "humantime_serde")]
    pub awareness: Duration,

    /// `evaluation` -> `stalled`
    #[serde(with = "humantime_serde")]
    pub evaluation: Duration,

    /// `booking` -> `expired`
    #[serde(with = "humantime_serde")]
    pub booking: Duration,

    /// `completed` -> `reviewed` with a synthesized review
    #[serde(with = "humantime_serde")]
    pub feedback: Duration,

    /// `stalled` -> `lost`
    #[serde(with = "humantime_serde")]
    pub stalled: Duration,
}

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            awareness: Duration::from_secs(24 * HOUR),
            evaluation: Duration::from_secs(72 * HOUR),
            booking: Duration::from_secs(30 * 60),
            feedback: Duration::from_secs(7 * DAY),
            stalled: Duration::from_secs(7 * DAY),
        }
    }
}

impl TimeoutConfig {
    /// Returns the deadline armed on entry to `state`, if it has one.
    #[must_use]
    pub const fn for_state(&self, state: JourneyState) -> Option<Duration> {
        match state {
            JourneyState::Awareness => Some(self.awareness),
            JourneyState::Evaluation => Some(self.evaluation),
            JourneyState::Booking => Some(self.booking),
            JourneyState::Completed => Some(self.feedback),
            JourneyState::Stalled => Some(self.stalled),
            JourneyState::Confirmed
            | JourneyState::Experiencing
            | JourneyState::Reviewed
            | JourneyState::Lost
            | JourneyState::Expired
            | JourneyState::NoShow
            | JourneyState::Cancelled => None,
        }
    }
}

// ============================================================================
// Guards
// ============================================================================

/// Minimum stage quality scores for the score-guarded advances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardConfig {
    /// `awareness` -> `evaluation`
    pub awareness_min_score: f64,

    /// `evaluation` -> `booking`
    pub evaluation_min_score: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            awareness_min_score: 30.0,
            evaluation_min_score: 80.0,
        }
    }
}

// ============================================================================
// Analysis
// ============================================================================

/// Thresholds for pattern analysis and anomaly rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// A type seen more often than this is a medium high-frequency anomaly
    pub high_frequency_medium: usize,

    /// A type seen more often than this is a high high-frequency anomaly
    pub high_frequency_high: usize,

    /// Impacts strictly below this count toward the negative cluster
    pub negative_impact_below: i32,

    /// Cluster sizes above this are high severity
    pub negative_cluster_high: usize,

    /// Adjacent events further apart than this are a silence gap
    #[serde(with = "humantime_serde")]
    pub silence_gap: Duration,

    /// More complaints than this raise a risk indicator
    pub complaint_limit: usize,

    /// Negative-event share above this raises a risk indicator
    pub negative_ratio_limit: f64,

    /// No event within this window raises a risk indicator
    #[serde(with = "humantime_serde")]
    pub recent_activity_window: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            high_frequency_medium: 10,
            high_frequency_high: 20,
            negative_impact_below: -10,
            negative_cluster_high: 3,
            silence_gap: Duration::from_secs(24 * HOUR),
            complaint_limit: 2,
            negative_ratio_limit: 0.3,
            recent_activity_window: Duration::from_secs(24 * HOUR),
        }
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Supervisor scan settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Default threshold for stalled-journey scans
    pub stall_threshold_minutes: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            stall_threshold_minutes: 60,
        }
    }
}

// ============================================================================
// Duration Serialization
// ============================================================================

/// Serde adapter for humantime durations (`"30m"`, `"7d"`).
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.timeouts.booking, Duration::from_secs(1800));
        assert_eq!(config.timeouts.feedback, Duration::from_secs(7 * DAY));
        assert!((config.guards.awareness_min_score - 30.0).abs() < f64::EPSILON);
        assert_eq!(config.analysis.high_frequency_high, 20);
        assert_eq!(config.supervisor.stall_threshold_minutes, 60);
    }

    #[test]
    fn test_empty_document_is_default() {
        let config: EngineConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let yaml = "timeouts:\n  booking: 45m\nguards:\n  evaluation_min_score: 70\n";
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.timeouts.booking, Duration::from_secs(45 * 60));
        assert_eq!(config.timeouts.awareness, Duration::from_secs(24 * HOUR));
        assert!((config.guards.evaluation_min_score - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bad_duration_rejected() {
        let yaml = "timeouts:\n  booking: soon\n";
        assert!(serde_yaml::from_str::<EngineConfig>(yaml).is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(serde_yaml::from_str::<EngineConfig>("retries: 3\n").is_err());
    }

    #[test]
    fn test_for_state() {
        let timeouts = TimeoutConfig::default();
        assert_eq!(
            timeouts.for_state(JourneyState::Booking),
            Some(Duration::from_secs(1800))
        );
        assert_eq!(timeouts.for_state(JourneyState::Experiencing), None);
        assert_eq!(timeouts.for_state(JourneyState::Lost), None);
    }

    #[test]
    fn test_duration_serializes_humantime() {
        let yaml = serde_yaml::to_string(&TimeoutConfig::default()).unwrap();
        assert!(yaml.contains("booking: 30m"));
    }
}
