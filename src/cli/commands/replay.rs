//! `replay` command handler
//!
//! Feeds a JSONL command stream through a supervisor, one line at a time
//! in file order, and prints a JSON report of where every journey ended
//! up. Journeys are created on first sight of their id. On shutdown the
//! remaining lines are skipped and the report covers what was replayed.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::cli::args::ReplayArgs;
use crate::config::{ConfigLoader, EngineConfig};
use crate::error::JourneyflowError;
use crate::journey::{
    Anomaly, Command, Journey, JourneyListener, JourneyState, RiskLevel, SnapshotSink, Stage,
    Supervisor, SystemClock,
};
use crate::observability::{JournalEmitter, JournalEntry, RunSummary};

/// One line of a command stream.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayLine {
    /// Addressed journey
    pub journey_id: String,
    /// Guest the journey belongs to, used when the journey is created
    pub entity_id: String,
    /// The inbound command
    #[serde(flatten)]
    pub command: Command,
}

/// Final state of one journey in the report.
#[derive(Debug, Clone, Serialize)]
pub struct JourneyReport {
    /// Journey id
    pub journey_id: String,
    /// Guest id
    pub entity_id: String,
    /// Final machine state
    pub state: JourneyState,
    /// Final stage
    pub stage: Stage,
    /// Whether the journey is still active
    pub is_active: bool,
    /// Rolling overall score
    pub overall_score: f64,
    /// Final score, once reviewed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f64>,
    /// Number of logged events
    pub events: usize,
    /// Number of milestones
    pub milestones: usize,
    /// Engagement score from pattern analysis
    pub engagement_score: f64,
    /// Risk classification from pattern analysis
    pub risk_level: RiskLevel,
    /// Detected anomalies
    pub anomalies: Vec<Anomaly>,
}

/// Report printed at the end of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    /// Journeys per current stage
    pub statistics: BTreeMap<Stage, usize>,
    /// Commands accepted by a journey
    pub accepted: u64,
    /// Commands rejected, malformed, or addressed to nothing
    pub rejected: u64,
    /// Whether the run stopped early on a shutdown signal
    pub interrupted: bool,
    /// Per-journey results, ordered by id
    pub journeys: Vec<JourneyReport>,
}

/// Replay a command file and print the report to stdout.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, the command
/// file or journal cannot be opened, or metrics cannot be started.
/// Individual bad lines are logged and counted, not fatal.
pub async fn run(args: &ReplayArgs, shutdown: &CancellationToken) -> Result<(), JourneyflowError> {
    if let Some(port) = args.metrics_port {
        crate::observability::init_metrics(Some(port))?;
        tracing::info!(port, "Prometheus metrics endpoint started");
    }

    let config = load_config(args.config.as_deref())?;
    let raw = tokio::fs::read_to_string(&args.commands).await?;

    let journal = match &args.journal {
        Some(path) => Some(Arc::new(JournalEmitter::from_file(path)?)),
        None => None,
    };
    let sink = journal
        .as_ref()
        .map(|j| Arc::clone(j) as Arc<dyn SnapshotSink>);

    let supervisor = Supervisor::with_options(config, Arc::new(SystemClock), sink);
    if let Some(journal) = &journal {
        supervisor.add_listener(Arc::clone(journal) as Arc<dyn JourneyListener>);
        journal.emit(&JournalEntry::RunStarted {
            timestamp: Utc::now(),
            source: args.commands.display().to_string(),
        });
    }

    let report = replay(&supervisor, &raw, &args.commands, shutdown).await;
    supervisor.shutdown().await;

    if let Some(journal) = &journal {
        journal.emit(&JournalEntry::RunFinished {
            timestamp: Utc::now(),
            summary: RunSummary {
                journeys: report.journeys.len(),
                accepted: report.accepted,
                rejected: report.rejected,
            },
        });
        journal.flush();
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Arc<EngineConfig>, JourneyflowError> {
    let Some(path) = path else {
        return Ok(Arc::new(EngineConfig::default()));
    };

    tracing::info!(config = %path.display(), "loading configuration");
    let load_result = ConfigLoader::default().load(path)?;
    for warning in &load_result.warnings {
        tracing::warn!(
            location = warning.location.as_deref().unwrap_or("<unknown>"),
            "{}",
            warning.message
        );
    }
    Ok(load_result.config)
}

/// Dispatches every line of `raw` in order and builds the report.
///
/// Stops before the next line once `shutdown` is cancelled.
pub async fn replay(
    supervisor: &Supervisor,
    raw: &str,
    source: &Path,
    shutdown: &CancellationToken,
) -> ReplayReport {
    let mut accepted = 0_u64;
    let mut rejected = 0_u64;
    let mut interrupted = false;

    for (index, line) in raw.lines().enumerate() {
        let line_no = index + 1;
        if shutdown.is_cancelled() {
            tracing::warn!(file = %source.display(), line = line_no, "replay interrupted; skipping remaining lines");
            interrupted = true;
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let entry: ReplayLine = match serde_json::from_str(trimmed) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(file = %source.display(), line = line_no, error = %e, "malformed command line");
                rejected += 1;
                continue;
            }
        };

        if supervisor.snapshot(&entry.journey_id).is_none()
            && let Err(e) = supervisor.create(&entry.entity_id, &entry.journey_id, BTreeMap::new())
        {
            tracing::warn!(line = line_no, journey_id = %entry.journey_id, error = %e, "journey not created");
            rejected += 1;
            continue;
        }

        match supervisor
            .dispatch_with_outcome(&entry.journey_id, entry.command)
            .await
        {
            Ok(outcome) => {
                tracing::debug!(line = line_no, journey_id = %entry.journey_id, ?outcome, "command applied");
                accepted += 1;
            }
            Err(e) => {
                tracing::warn!(line = line_no, journey_id = %entry.journey_id, error = %e, "command rejected");
                rejected += 1;
            }
        }
    }

    supervisor.flush().await;

    let journeys = supervisor
        .journey_ids()
        .iter()
        .filter_map(|id| supervisor.snapshot(id).map(|j| journey_report(supervisor, &j)))
        .collect();

    ReplayReport {
        statistics: supervisor.statistics(),
        accepted,
        rejected,
        interrupted,
        journeys,
    }
}

fn journey_report(supervisor: &Supervisor, journey: &Journey) -> JourneyReport {
    let analysis = supervisor.analyze_patterns(&journey.id);
    let anomalies = supervisor
        .identify_anomalies(&journey.id)
        .unwrap_or_default();

    JourneyReport {
        journey_id: journey.id.clone(),
        entity_id: journey.entity_id.clone(),
        state: journey.state,
        stage: journey.current_stage,
        is_active: journey.is_active,
        overall_score: journey.overall_score,
        final_score: journey.final_score,
        events: journey.events.len(),
        milestones: journey.milestones.len(),
        engagement_score: analysis.as_ref().map_or(0.0, |a| a.engagement_score),
        risk_level: analysis.as_ref().map_or(RiskLevel::Low, |a| a.risk_level()),
        anomalies,
    }
}
