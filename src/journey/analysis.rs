//! Pattern and anomaly analysis
//!
//! Read-only passes over one journey's event log. Nothing here mutates
//! the journey; callers hand in a slice (usually from a snapshot) and get
//! plain values back.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;

use super::event::{Event, EventSource, EventType};
use super::stage::Stage;

/// Upper bound of the engagement score.
const MAX_ENGAGEMENT: f64 = 100.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

// ============================================================================
// Pattern Analysis
// ============================================================================

/// Impact distribution over the log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    /// Events with impact > 0
    pub positive: usize,
    /// Events with impact < 0
    pub negative: usize,
    /// Events with impact == 0
    pub neutral: usize,
    /// Sum of all impacts
    pub total: i64,
}

/// Gaps between chronologically adjacent events, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineAnalysis {
    /// Mean gap
    pub avg_gap: f64,
    /// Smallest gap
    pub min_gap: f64,
    /// Largest gap
    pub max_gap: f64,
}

/// A condition that raises the journey's risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskIndicator {
    /// More complaint-type events than the configured limit
    MultipleComplaints,
    /// Negative events make up too large a share of the log
    HighNegativeImpactRatio,
    /// Nothing happened within the recent-activity window
    NoRecentActivity,
}

impl RiskIndicator {
    /// Returns the human-readable label.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::MultipleComplaints => "multiple complaints",
            Self::HighNegativeImpactRatio => "high negative impact ratio",
            Self::NoRecentActivity => "no recent activity",
        }
    }
}

/// Journey-level risk derived from the number of indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// No indicators
    Low,
    /// One indicator
    Medium,
    /// Two or more indicators
    High,
}

impl RiskLevel {
    /// Classifies a set of indicators.
    #[must_use]
    pub const fn from_indicators(indicators: &[RiskIndicator]) -> Self {
        match indicators.len() {
            0 => Self::Low,
            1 => Self::Medium,
            _ => Self::High,
        }
    }
}

/// Summary statistics over one journey's events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysis {
    /// Number of events
    pub total_events: usize,
    /// Count per event type
    pub event_type_counts: BTreeMap<EventType, usize>,
    /// Count per stage
    pub stage_distribution: BTreeMap<Stage, usize>,
    /// Impact distribution
    pub impact_analysis: ImpactAnalysis,
    /// Inter-event gaps
    pub timeline_analysis: TimelineAnalysis,
    /// Engagement in [0, 100]
    pub engagement_score: f64,
    /// Risk indicators that fired
    pub risk_indicators: Vec<RiskIndicator>,
}

impl PatternAnalysis {
    /// Returns the risk level implied by the indicators.
    #[must_use]
    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_indicators(&self.risk_indicators)
    }
}

/// Computes distribution statistics, engagement and risk indicators.
///
/// `now` anchors the recent-activity check.
#[must_use]
pub fn analyze_patterns(
    events: &[Event],
    now: DateTime<Utc>,
    config: &AnalysisConfig,
) -> PatternAnalysis {
    let mut event_type_counts = BTreeMap::new();
    let mut stage_distribution = BTreeMap::new();
    let mut impact = ImpactAnalysis::default();

    for event in events {
        *event_type_counts.entry(event.event_type).or_insert(0) += 1;
        *stage_distribution.entry(event.stage).or_insert(0) += 1;
        match event.impact {
            i if i > 0 => impact.positive += 1,
            i if i < 0 => impact.negative += 1,
            _ => impact.neutral += 1,
        }
        impact.total += i64::from(event.impact);
    }

    let times = sorted_timestamps(events);
    let risk_indicators = risk_indicators(events, &times, &impact, now, config);

    PatternAnalysis {
        total_events: events.len(),
        event_type_counts,
        stage_distribution,
        impact_analysis: impact,
        timeline_analysis: timeline(&times),
        engagement_score: engagement_score(events, &times),
        risk_indicators,
    }
}

fn sorted_timestamps(events: &[Event]) -> Vec<DateTime<Utc>> {
    let mut times: Vec<_> = events.iter().map(|e| e.timestamp).collect();
    times.sort_unstable();
    times
}

fn gaps(times: &[DateTime<Utc>]) -> impl Iterator<Item = chrono::Duration> + '_ {
    times.windows(2).map(|w| w[1] - w[0])
}

#[allow(clippy::cast_precision_loss)]
fn timeline(times: &[DateTime<Utc>]) -> TimelineAnalysis {
    let secs: Vec<f64> = gaps(times)
        .map(|g| g.num_milliseconds() as f64 / 1000.0)
        .collect();
    if secs.is_empty() {
        return TimelineAnalysis::default();
    }

    TimelineAnalysis {
        avg_gap: secs.iter().sum::<f64>() / secs.len() as f64,
        min_gap: secs.iter().copied().fold(f64::INFINITY, f64::min),
        max_gap: secs.iter().copied().fold(0.0, f64::max),
    }
}

/// `min(100, user_ratio * 50 + events_per_day * 10)`, where the observation
/// window is the span of the log, at least one day.
#[allow(clippy::cast_precision_loss)]
fn engagement_score(events: &[Event], times: &[DateTime<Utc>]) -> f64 {
    if events.is_empty() {
        return 0.0;
    }

    let total = events.len() as f64;
    let user = events
        .iter()
        .filter(|e| e.source == EventSource::User)
        .count() as f64;

    let span_days = match (times.first(), times.last()) {
        (Some(first), Some(last)) => (*last - *first).num_seconds() as f64 / SECONDS_PER_DAY,
        _ => 0.0,
    };
    let events_per_day = total / span_days.max(1.0);

    (user / total).mul_add(50.0, events_per_day * 10.0).min(MAX_ENGAGEMENT)
}

#[allow(clippy::cast_precision_loss)]
fn risk_indicators(
    events: &[Event],
    times: &[DateTime<Utc>],
    impact: &ImpactAnalysis,
    now: DateTime<Utc>,
    config: &AnalysisConfig,
) -> Vec<RiskIndicator> {
    let mut indicators = Vec::new();

    let complaints = events.iter().filter(|e| e.event_type.is_complaint()).count();
    if complaints > config.complaint_limit {
        indicators.push(RiskIndicator::MultipleComplaints);
    }

    if !events.is_empty() {
        let ratio = impact.negative as f64 / events.len() as f64;
        if ratio > config.negative_ratio_limit {
            indicators.push(RiskIndicator::HighNegativeImpactRatio);
        }
    }

    let window = chrono::Duration::from_std(config.recent_activity_window)
        .unwrap_or(chrono::Duration::MAX);
    let recent = times.last().is_some_and(|last| now - *last <= window);
    if !recent {
        indicators.push(RiskIndicator::NoRecentActivity);
    }

    indicators
}

// ============================================================================
// Anomaly Detection
// ============================================================================

/// Kind of anomaly rule that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// One event type repeated too often
    HighFrequency,
    /// Strongly negative events present
    NegativeImpactCluster,
    /// Long gaps between adjacent events
    LongSilence,
}

/// Anomaly severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    /// Worth a look
    Medium,
    /// Needs attention
    High,
}

/// A derived flag over the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Rule that fired
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    /// Severity
    pub severity: AnomalySeverity,
    /// Occurrences behind the flag
    pub count: usize,
    /// Event type for frequency anomalies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,
    /// Human-readable description
    pub description: String,
}

/// Evaluates every anomaly rule independently; several may fire.
#[must_use]
pub fn identify_anomalies(events: &[Event], config: &AnalysisConfig) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();

    let mut counts: BTreeMap<EventType, usize> = BTreeMap::new();
    for event in events {
        *counts.entry(event.event_type).or_insert(0) += 1;
    }
    for (event_type, count) in counts {
        if count <= config.high_frequency_medium {
            continue;
        }
        let severity = if count > config.high_frequency_high {
            AnomalySeverity::High
        } else {
            AnomalySeverity::Medium
        };
        anomalies.push(Anomaly {
            kind: AnomalyKind::HighFrequency,
            severity,
            count,
            event_type: Some(event_type),
            description: format!("{event_type} occurred {count} times"),
        });
    }

    let negative = events
        .iter()
        .filter(|e| e.impact < config.negative_impact_below)
        .count();
    if negative > 0 {
        let severity = if negative > config.negative_cluster_high {
            AnomalySeverity::High
        } else {
            AnomalySeverity::Medium
        };
        anomalies.push(Anomaly {
            kind: AnomalyKind::NegativeImpactCluster,
            severity,
            count: negative,
            event_type: None,
            description: format!(
                "{negative} events with impact below {}",
                config.negative_impact_below
            ),
        });
    }

    let threshold =
        chrono::Duration::from_std(config.silence_gap).unwrap_or(chrono::Duration::MAX);
    let times = sorted_timestamps(events);
    let silences = gaps(&times).filter(|g| *g > threshold).count();
    if silences > 0 {
        anomalies.push(Anomaly {
            kind: AnomalyKind::LongSilence,
            severity: AnomalySeverity::Medium,
            count: silences,
            event_type: None,
            description: format!(
                "{silences} gaps longer than {}",
                humantime::format_duration(config.silence_gap)
            ),
        });
    }

    anomalies
}
