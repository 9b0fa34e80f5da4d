//! Shared integration-test harness: supervisors on a manual clock, a
//! recording snapshot sink, and helpers for running the `journeyflow`
//! binary.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Output;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};

use journeyflow::config::EngineConfig;
use journeyflow::error::SinkError;
use journeyflow::journey::{
    Clock, Command, EventNotice, JourneyHandle, JourneyListener, JourneyState, ManualClock,
    SnapshotSink, SnapshotUpdate, Supervisor,
};

/// Fixed start instant for clock-driven tests.
pub fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
}

/// A supervisor on a manual clock starting at [`t0`].
pub struct Harness {
    pub supervisor: Supervisor,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let clock = Arc::new(ManualClock::new(t0()));
        let sink = Arc::new(RecordingSink::default());
        let supervisor = Supervisor::with_options(
            Arc::new(config),
            Arc::clone(&clock) as Arc<dyn Clock>,
            Some(Arc::clone(&sink) as Arc<dyn SnapshotSink>),
        );
        Self {
            supervisor,
            clock,
            sink,
        }
    }

    pub fn create(&self, journey_id: &str) -> JourneyHandle {
        self.supervisor
            .create(&format!("guest-{journey_id}"), journey_id, BTreeMap::new())
            .expect("create journey")
    }

    pub async fn send(&self, journey_id: &str, kind: &str) {
        assert!(
            self.supervisor
                .dispatch(journey_id, Command::new(kind))
                .await
                .expect("dispatch"),
            "journey {journey_id} not live"
        );
    }

    /// Advances both the wall clock and tokio's paused timer.
    pub async fn advance(&self, by: Duration) {
        self.clock.advance(by);
        tokio::time::advance(by).await;
    }

    /// Waits until the journey's published state matches `state`.
    pub async fn wait_for_state(&self, handle: &JourneyHandle, state: JourneyState) {
        let mut view = handle.subscribe();
        view.wait_for(|j| j.state == state)
            .await
            .expect("journey actor stopped");
    }
}

/// Sink that records every update it receives.
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<SnapshotUpdate>>,
}

impl RecordingSink {
    /// Versions persisted for `journey_id`, in arrival order.
    pub fn versions(&self, journey_id: &str) -> Vec<u64> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.journey_id == journey_id)
            .map(|u| u.version)
            .collect()
    }
}

#[async_trait::async_trait]
impl SnapshotSink for RecordingSink {
    async fn persist(&self, update: &SnapshotUpdate) -> Result<(), SinkError> {
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }
}

/// Listener that records every notice.
pub fn recording_listener() -> (Arc<Mutex<Vec<EventNotice>>>, Arc<dyn JourneyListener>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener: Arc<dyn JourneyListener> = Arc::new(move |notice: &EventNotice| {
        sink.lock().unwrap().push(notice.clone());
    });
    (seen, listener)
}

/// Path to a file under `tests/fixtures`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Runs the `journeyflow` binary to completion.
pub fn run_cli(args: &[&str]) -> Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_journeyflow"))
        .args(args)
        .env_remove("JOURNEYFLOW_LOG_LEVEL")
        .output()
        .expect("failed to spawn journeyflow")
}
