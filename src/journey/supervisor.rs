//! Journey supervisor.
//!
//! The supervisor owns the registry of running journey actors and the
//! map of paused snapshots. These two maps are the only shared mutable
//! structures in the engine; every other piece of state lives inside an
//! actor. Bulk queries (statistics, stalled scans, active journeys) read
//! the actors' published views and never reach into a running machine.
//!
//! Registry guards are never held across an `.await`: handles are cloned
//! out of the map before any message is sent to an actor.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::JourneyError;
use crate::observability::metrics;

use super::actor::{self, JourneyHandle};
use super::analysis::{self, Anomaly, PatternAnalysis};
use super::clock::{Clock, SystemClock};
use super::event::Command;
use super::machine::{DispatchOutcome, JourneyMachine};
use super::model::Journey;
use super::notify::{
    JourneyListener, ListenerId, ListenerRegistry, Notification, NotifierMessage, SnapshotSink,
    SnapshotUpdate, spawn_notifier,
};
use super::snapshot::JourneySnapshot;
use super::stage::Stage;

struct LiveJourney {
    handle: JourneyHandle,
    task: JoinHandle<()>,
}

/// Registry and lifecycle manager for journey actors.
pub struct Supervisor {
    live: DashMap<String, LiveJourney>,
    paused: DashMap<String, JourneySnapshot>,
    listeners: Arc<ListenerRegistry>,
    notify_tx: mpsc::UnboundedSender<NotifierMessage>,
    notifier: Mutex<Option<JoinHandle<()>>>,
    config: Arc<EngineConfig>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl Supervisor {
    /// Creates a supervisor on the system clock with no snapshot sink.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self::with_options(config, Arc::new(SystemClock), None)
    }

    /// Creates a supervisor with an explicit clock and optional sink.
    ///
    /// Must be called from within a tokio runtime: the notifier task is
    /// spawned here.
    #[must_use]
    pub fn with_options(
        config: Arc<EngineConfig>,
        clock: Arc<dyn Clock>,
        sink: Option<Arc<dyn SnapshotSink>>,
    ) -> Self {
        let listeners = Arc::new(ListenerRegistry::new());
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let notifier = spawn_notifier(notify_rx, Arc::clone(&listeners), sink);

        Self {
            live: DashMap::new(),
            paused: DashMap::new(),
            listeners,
            notify_tx,
            notifier: Mutex::new(Some(notifier)),
            config,
            clock,
            cancel: CancellationToken::new(),
        }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> &Arc<EngineConfig> {
        &self.config
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Starts a new journey and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError::InvalidEvent`] for empty identifiers and
    /// [`JourneyError::AlreadyExists`] if the id is live or paused.
    pub fn create(
        &self,
        entity_id: &str,
        journey_id: &str,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Result<JourneyHandle, JourneyError> {
        if entity_id.trim().is_empty() {
            return Err(JourneyError::InvalidEvent("entity id is empty".to_string()));
        }
        if journey_id.trim().is_empty() {
            return Err(JourneyError::InvalidEvent("journey id is empty".to_string()));
        }
        if self.paused.contains_key(journey_id) {
            return Err(JourneyError::AlreadyExists(journey_id.to_string()));
        }

        let machine = JourneyMachine::start(
            journey_id,
            entity_id,
            metadata,
            self.clock.now(),
            Arc::clone(&self.config),
        );
        let handle = self.register(machine)?;
        info!(journey_id, entity_id, "journey created");
        Ok(handle)
    }

    /// Suspends a live journey to a snapshot.
    ///
    /// The actor records a paused milestone, publishes it, and exits; its
    /// pending deadline is kept in the snapshot as an absolute instant.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError::NotFound`] if the journey is not live.
    pub async fn pause(&self, journey_id: &str) -> Result<JourneySnapshot, JourneyError> {
        let handle = self
            .handle(journey_id)
            .ok_or_else(|| JourneyError::NotFound(journey_id.to_string()))?;

        let snapshot = handle.pause().await?;
        self.paused.insert(journey_id.to_string(), snapshot.clone());
        self.retire(journey_id).await;

        info!(journey_id, state = %snapshot.journey.state, "journey paused");
        Ok(snapshot)
    }

    /// Resumes a paused journey held by this supervisor.
    ///
    /// The timer is re-armed for whatever is left of the original
    /// deadline; an overdue deadline fires immediately.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError::NotFound`] if no such journey is paused,
    /// or a snapshot version error.
    pub fn resume(&self, journey_id: &str) -> Result<JourneyHandle, JourneyError> {
        let snapshot = self
            .paused
            .get(journey_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| JourneyError::NotFound(journey_id.to_string()))?;

        let handle = self.rehydrate(snapshot)?;
        self.paused.remove(journey_id);
        Ok(handle)
    }

    /// Rehydrates a journey from a snapshot obtained elsewhere (for
    /// example one read back from storage).
    ///
    /// # Errors
    ///
    /// Returns a snapshot version error, or
    /// [`JourneyError::AlreadyExists`] if the id is already registered.
    pub fn resume_from(&self, snapshot: JourneySnapshot) -> Result<JourneyHandle, JourneyError> {
        if self.paused.contains_key(snapshot.journey_id()) {
            return Err(JourneyError::AlreadyExists(snapshot.journey_id().to_string()));
        }
        self.rehydrate(snapshot)
    }

    /// Stops a journey and hands back its final state.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError::NotFound`] if the journey is neither live
    /// nor paused.
    pub async fn remove(&self, journey_id: &str) -> Result<Journey, JourneyError> {
        if let Some(handle) = self.handle(journey_id) {
            let journey = match handle.stop().await {
                Ok(journey) => journey,
                // Actor already gone; its last published view is final.
                Err(JourneyError::ActorUnavailable(_)) => handle.snapshot(),
                Err(e) => return Err(e),
            };
            self.retire(journey_id).await;
            info!(journey_id, "journey removed");
            return Ok(journey);
        }

        self.paused
            .remove(journey_id)
            .map(|(_, snapshot)| snapshot.journey)
            .ok_or_else(|| JourneyError::NotFound(journey_id.to_string()))
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Routes one command to a live journey.
    ///
    /// Returns `Ok(false)` when no live actor is registered for the id,
    /// since late and duplicate deliveries are expected.
    ///
    /// # Errors
    ///
    /// Returns the machine's rejection ([`JourneyError::InvalidEvent`] or
    /// [`JourneyError::JourneyInactive`]).
    pub async fn dispatch(&self, journey_id: &str, command: Command) -> Result<bool, JourneyError> {
        let Some(handle) = self.handle(journey_id) else {
            debug!(journey_id, command = %command.kind, "no live journey; command dropped");
            return Ok(false);
        };

        match handle.dispatch(command).await {
            Ok(_) => Ok(true),
            Err(JourneyError::ActorUnavailable(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Routes one command and returns what it did.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError::NotFound`] if the journey is not live, or
    /// the machine's rejection.
    pub async fn dispatch_with_outcome(
        &self,
        journey_id: &str,
        command: Command,
    ) -> Result<DispatchOutcome, JourneyError> {
        let handle = self
            .handle(journey_id)
            .ok_or_else(|| JourneyError::NotFound(journey_id.to_string()))?;
        handle.dispatch(command).await
    }

    /// Empties a journey's event log. Returns the number of events removed.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError::NotFound`] if the journey is neither live
    /// nor paused.
    pub async fn clear_history(&self, journey_id: &str) -> Result<usize, JourneyError> {
        if let Some(handle) = self.handle(journey_id) {
            return handle.clear_history().await;
        }

        let (cleared, update) = {
            let mut entry = self
                .paused
                .get_mut(journey_id)
                .ok_or_else(|| JourneyError::NotFound(journey_id.to_string()))?;
            let snapshot = entry.value_mut();
            let mut machine =
                JourneyMachine::resume(snapshot.journey.clone(), Arc::clone(&self.config));
            let cleared = machine.clear_history(self.clock.now());
            snapshot.journey = machine.into_journey();
            (cleared, SnapshotUpdate::of(&snapshot.journey))
        };

        self.notify(Notification {
            notice: None,
            update,
        });
        Ok(cleared)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Returns a live journey's handle.
    #[must_use]
    pub fn handle(&self, journey_id: &str) -> Option<JourneyHandle> {
        self.live.get(journey_id).map(|entry| entry.handle.clone())
    }

    /// Returns the current state of a live or paused journey.
    #[must_use]
    pub fn snapshot(&self, journey_id: &str) -> Option<Journey> {
        if let Some(handle) = self.handle(journey_id) {
            return Some(handle.snapshot());
        }
        self.paused
            .get(journey_id)
            .map(|entry| entry.journey.clone())
    }

    /// Returns every live journey that has not reached a final state,
    /// ordered by id.
    #[must_use]
    pub fn active_journeys(&self) -> Vec<Journey> {
        let mut journeys: Vec<Journey> = self
            .live_handles()
            .iter()
            .map(JourneyHandle::snapshot)
            .filter(|j| j.is_active)
            .collect();
        journeys.sort_by(|a, b| a.id.cmp(&b.id));
        journeys
    }

    /// Returns active live journeys that have been in their current stage
    /// longer than `threshold_minutes`, ordered by id.
    #[must_use]
    pub fn stalled(&self, threshold_minutes: u64) -> Vec<JourneyHandle> {
        let Some(threshold) = i64::try_from(threshold_minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
        else {
            return Vec::new();
        };
        let now = self.clock.now();

        let mut stalled: Vec<JourneyHandle> = self
            .live_handles()
            .into_iter()
            .filter(|handle| {
                let journey = handle.snapshot();
                journey.is_active && journey.time_in_current_stage(now) > threshold
            })
            .collect();
        stalled.sort_by(|a, b| a.journey_id().cmp(b.journey_id()));
        stalled
    }

    /// Stalled scan using the configured threshold.
    #[must_use]
    pub fn stalled_journeys(&self) -> Vec<JourneyHandle> {
        self.stalled(self.config.supervisor.stall_threshold_minutes)
    }

    /// Counts journeys per current stage across live and paused journeys.
    ///
    /// Every stage is present in the result, zero when empty.
    #[must_use]
    pub fn statistics(&self) -> BTreeMap<Stage, usize> {
        let mut counts: BTreeMap<Stage, usize> = Stage::ALL.iter().map(|s| (*s, 0)).collect();

        for handle in self.live_handles() {
            *counts.entry(handle.stage()).or_default() += 1;
        }
        for entry in &self.paused {
            *counts.entry(entry.journey.current_stage).or_default() += 1;
        }
        counts
    }

    /// Analyzes a journey's event log.
    #[must_use]
    pub fn analyze_patterns(&self, journey_id: &str) -> Option<PatternAnalysis> {
        self.snapshot(journey_id).map(|journey| {
            analysis::analyze_patterns(&journey.events, self.clock.now(), &self.config.analysis)
        })
    }

    /// Scans a journey's event log for anomalies.
    #[must_use]
    pub fn identify_anomalies(&self, journey_id: &str) -> Option<Vec<Anomaly>> {
        self.snapshot(journey_id)
            .map(|journey| analysis::identify_anomalies(&journey.events, &self.config.analysis))
    }

    /// Returns the number of live journeys.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Returns the number of paused journeys.
    #[must_use]
    pub fn paused_count(&self) -> usize {
        self.paused.len()
    }

    /// Returns the ids of every live and paused journey, sorted.
    #[must_use]
    pub fn journey_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .live
            .iter()
            .map(|entry| entry.key().clone())
            .chain(self.paused.iter().map(|entry| entry.key().clone()))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    /// Registers a listener for every processed event.
    pub fn add_listener(&self, listener: Arc<dyn JourneyListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Unregisters a listener. Returns whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Waits until every notification sent so far has been delivered and
    /// every in-flight sink write has finished.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.notify_tx.send(NotifierMessage::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }

    /// Cancels every actor, waits for them, then drains and stops the
    /// notifier.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let ids: Vec<String> = self.live.iter().map(|entry| entry.key().clone()).collect();
        for id in &ids {
            self.retire(id).await;
        }

        let (ack, done) = oneshot::channel();
        if self.notify_tx.send(NotifierMessage::Stop(ack)).is_ok() {
            let _ = done.await;
        }
        let notifier = self
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = notifier
            && let Err(e) = task.await
        {
            warn!(error = %e, "notifier task failed");
        }

        info!(actors = ids.len(), paused = self.paused.len(), "supervisor shut down");
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn rehydrate(&self, snapshot: JourneySnapshot) -> Result<JourneyHandle, JourneyError> {
        snapshot.check_version()?;

        let journey_id = snapshot.journey.id.clone();
        let mut machine = JourneyMachine::resume(snapshot.journey, Arc::clone(&self.config));
        machine.mark_resumed(self.clock.now());

        let handle = self.register(machine)?;
        info!(
            journey_id = %journey_id,
            paused_at = %snapshot.paused_at,
            state = %handle.state(),
            "journey resumed"
        );
        Ok(handle)
    }

    fn register(&self, machine: JourneyMachine) -> Result<JourneyHandle, JourneyError> {
        let journey_id = machine.journey().id.clone();
        let handle = match self.live.entry(journey_id) {
            Entry::Occupied(entry) => {
                return Err(JourneyError::AlreadyExists(entry.key().clone()));
            }
            Entry::Vacant(entry) => {
                let (handle, task) = actor::spawn(
                    machine,
                    Arc::clone(&self.clock),
                    self.notify_tx.clone(),
                    self.cancel.child_token(),
                );
                entry.insert(LiveJourney {
                    handle: handle.clone(),
                    task,
                });
                handle
            }
        };
        metrics::set_journeys_live(self.live.len());
        Ok(handle)
    }

    /// Removes a journey from the live registry and waits for its task.
    async fn retire(&self, journey_id: &str) {
        let Some((_, live)) = self.live.remove(journey_id) else {
            return;
        };
        metrics::set_journeys_live(self.live.len());
        if let Err(e) = live.task.await {
            warn!(journey_id, error = %e, "journey actor task failed");
        }
    }

    fn live_handles(&self) -> Vec<JourneyHandle> {
        self.live.iter().map(|entry| entry.handle.clone()).collect()
    }

    fn notify(&self, notification: Notification) {
        if self
            .notify_tx
            .send(NotifierMessage::Notify(Box::new(notification)))
            .is_err()
        {
            debug!("notifier gone; notification dropped");
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("live", &self.live.len())
            .field("paused", &self.paused.len())
            .field("listeners", &self.listeners)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journey::clock::ManualClock;
    use crate::journey::model::JourneyState;
    use chrono::Utc;
    use std::time::Duration;

    fn supervisor() -> (Supervisor, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let supervisor = Supervisor::with_options(
            Arc::new(EngineConfig::default()),
            Arc::clone(&clock) as Arc<dyn Clock>,
            None,
        );
        (supervisor, clock)
    }

    #[tokio::test]
    async fn test_create_and_dispatch() {
        let (sup, _clock) = supervisor();
        sup.create("guest-1", "j-1", BTreeMap::new()).unwrap();

        assert!(sup.dispatch("j-1", Command::new("VIEW_DETAILS")).await.unwrap());
        let journey = sup.snapshot("j-1").unwrap();
        assert_eq!(journey.events.len(), 1);
        assert_eq!(sup.live_count(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_returns_false() {
        let (sup, _clock) = supervisor();
        assert!(!sup.dispatch("nope", Command::new("PAGE_VIEW")).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let (sup, _clock) = supervisor();
        sup.create("guest-1", "j-1", BTreeMap::new()).unwrap();
        let err = sup.create("guest-2", "j-1", BTreeMap::new()).unwrap_err();
        assert!(matches!(err, JourneyError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_empty_ids_rejected() {
        let (sup, _clock) = supervisor();
        assert!(matches!(
            sup.create("", "j-1", BTreeMap::new()),
            Err(JourneyError::InvalidEvent(_))
        ));
        assert!(matches!(
            sup.create("guest-1", " ", BTreeMap::new()),
            Err(JourneyError::InvalidEvent(_))
        ));
    }

    #[tokio::test]
    async fn test_statistics_counts_all_stages() {
        let (sup, _clock) = supervisor();
        sup.create("g1", "j-1", BTreeMap::new()).unwrap();
        sup.create("g2", "j-2", BTreeMap::new()).unwrap();
        sup.dispatch("j-2", Command::new("SHOW_INTEREST")).await.unwrap();

        let stats = sup.statistics();
        assert_eq!(stats.len(), Stage::ALL.len());
        assert_eq!(stats[&Stage::Awareness], 1);
        assert_eq!(stats[&Stage::Evaluation], 1);
        assert_eq!(stats[&Stage::Booking], 0);
    }

    #[tokio::test]
    async fn test_pause_resume_round_trip() {
        let (sup, clock) = supervisor();
        sup.create("guest-1", "j-1", BTreeMap::new()).unwrap();
        sup.dispatch("j-1", Command::new("PAGE_VIEW")).await.unwrap();
        sup.dispatch("j-1", Command::new("SHOW_INTEREST")).await.unwrap();
        let before = sup.snapshot("j-1").unwrap();

        let snapshot = sup.pause("j-1").await.unwrap();
        assert_eq!(sup.live_count(), 0);
        assert_eq!(sup.paused_count(), 1);
        assert!(!sup.dispatch("j-1", Command::new("PAGE_VIEW")).await.unwrap());
        assert_eq!(snapshot.journey.events, before.events);

        clock.advance(Duration::from_secs(60));
        let handle = sup.resume("j-1").unwrap();
        let after = handle.snapshot();
        assert_eq!(after.current_stage, before.current_stage);
        assert_eq!(after.events, before.events);
        assert!((after.overall_score - before.overall_score).abs() < f64::EPSILON);
        assert_eq!(after.deadline, before.deadline);
        assert_eq!(sup.paused_count(), 0);
    }

    #[tokio::test]
    async fn test_stalled_scan() {
        let (sup, clock) = supervisor();
        sup.create("g1", "j-1", BTreeMap::new()).unwrap();
        clock.advance(Duration::from_secs(30 * 60));
        sup.create("g2", "j-2", BTreeMap::new()).unwrap();
        clock.advance(Duration::from_secs(45 * 60));

        let stalled = sup.stalled(60);
        assert_eq!(stalled.len(), 1);
        assert_eq!(stalled[0].journey_id(), "j-1");
        assert_eq!(sup.stalled(10).len(), 2);
    }

    #[tokio::test]
    async fn test_listener_receives_notices() {
        let (sup, _clock) = supervisor();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = sup.add_listener(Arc::new(move |notice: &crate::journey::EventNotice| {
            sink.lock().unwrap().push(notice.state);
        }));

        sup.create("g1", "j-1", BTreeMap::new()).unwrap();
        sup.dispatch("j-1", Command::new("SHOW_INTEREST")).await.unwrap();
        sup.flush().await;
        assert_eq!(*seen.lock().unwrap(), vec![JourneyState::Evaluation]);

        assert!(sup.remove_listener(id));
        sup.dispatch("j-1", Command::new("PAGE_VIEW")).await.unwrap();
        sup.flush().await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_history_paused() {
        let (sup, _clock) = supervisor();
        sup.create("g1", "j-1", BTreeMap::new()).unwrap();
        sup.dispatch("j-1", Command::new("PAGE_VIEW")).await.unwrap();
        sup.dispatch("j-1", Command::new("PAGE_VIEW")).await.unwrap();
        sup.pause("j-1").await.unwrap();

        assert_eq!(sup.clear_history("j-1").await.unwrap(), 2);
        assert!(sup.snapshot("j-1").unwrap().events.is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_shutdown() {
        let (sup, _clock) = supervisor();
        sup.create("g1", "j-1", BTreeMap::new()).unwrap();
        sup.create("g2", "j-2", BTreeMap::new()).unwrap();

        let removed = sup.remove("j-1").await.unwrap();
        assert_eq!(removed.id, "j-1");
        assert!(matches!(
            sup.remove("j-1").await,
            Err(JourneyError::NotFound(_))
        ));

        sup.shutdown().await;
        assert_eq!(sup.live_count(), 0);
    }
}
