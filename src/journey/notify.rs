//! Notification boundary to external collaborators.
//!
//! Two contracts leave the engine:
//! - [`JourneyListener`]: push notification of every processed event,
//!   called synchronously in arrival order.
//! - [`SnapshotSink`]: persistence of the journey after every mutation,
//!   invoked fire-and-forget. Failures are logged and counted, never
//!   retried and never rolled back.
//!
//! Actors hand notifications to a single notifier task over an unbounded
//! channel so a slow listener or sink never stalls an actor. Each journey
//! has at most one sink write in flight. Updates that arrive meanwhile are
//! coalesced into the newest one, so a slow sink sees fewer versions of a
//! journey, always in increasing order, and never the same version twice.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{self, JoinError, JoinHandle, JoinSet};
use tracing::{debug, warn};

use crate::error::SinkError;
use crate::observability::metrics;

use super::event::Event;
use super::machine::DispatchOutcome;
use super::model::{Journey, JourneyState};
use super::stage::Stage;

// ============================================================================
// Payloads
// ============================================================================

/// Push notification for one processed event or timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventNotice {
    /// Journey the notice is about
    pub journey_id: String,
    /// The event, absent for a timeout that synthesized none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
    /// What the event (or timeout) did
    pub outcome: DispatchOutcome,
    /// State after processing
    pub state: JourneyState,
    /// Stage after processing
    pub stage: Stage,
    /// Rolling overall score after processing
    pub overall_score: f64,
    /// Journey version after processing
    pub version: u64,
    /// When it was processed
    pub timestamp: DateTime<Utc>,
}

impl EventNotice {
    /// Builds a notice from the journey as it stands after processing.
    #[must_use]
    pub fn new(
        journey: &Journey,
        event: Option<Event>,
        outcome: DispatchOutcome,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            journey_id: journey.id.clone(),
            event,
            outcome,
            state: journey.state,
            stage: journey.current_stage,
            overall_score: journey.overall_score,
            version: journey.version,
            timestamp,
        }
    }
}

/// Outbound persistence payload.
///
/// Sinks are expected to upsert keyed by `journey_id`. Intermediate
/// versions may be skipped when the sink falls behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotUpdate {
    /// Journey id (upsert key)
    pub journey_id: String,
    /// Monotonically increasing version
    pub version: u64,
    /// Full journey state
    pub journey: Journey,
}

impl SnapshotUpdate {
    /// Captures the journey's current state.
    #[must_use]
    pub fn of(journey: &Journey) -> Self {
        Self {
            journey_id: journey.id.clone(),
            version: journey.version,
            journey: journey.clone(),
        }
    }
}

// ============================================================================
// Collaborator Contracts
// ============================================================================

/// Observer of every processed event.
///
/// Called from the notifier task; implementations must not block.
pub trait JourneyListener: Send + Sync {
    /// Receives one notice.
    fn on_event(&self, notice: &EventNotice);
}

impl<F> JourneyListener for F
where
    F: Fn(&EventNotice) + Send + Sync,
{
    fn on_event(&self, notice: &EventNotice) {
        self(notice);
    }
}

/// Persistence collaborator.
#[async_trait::async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Persists one journey state.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] when the write fails; the engine logs it and
    /// carries on.
    async fn persist(&self, update: &SnapshotUpdate) -> Result<(), SinkError>;
}

// ============================================================================
// Listener Registry
// ============================================================================

/// Identifies a registered listener for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Concurrent listener list.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: DashMap<ListenerId, Arc<dyn JourneyListener>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    pub fn add(&self, listener: Arc<dyn JourneyListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.insert(id, listener);
        id
    }

    /// Unregisters a listener. Returns whether it was registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Calls every listener with `notice`, in registration order.
    pub fn notify(&self, notice: &EventNotice) {
        // Snapshot the list so a listener may add or remove listeners.
        let mut listeners: Vec<_> = self
            .listeners
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        listeners.sort_unstable_by_key(|(id, _)| *id);

        for (_, listener) in listeners {
            listener.on_event(notice);
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Notifier Task
// ============================================================================

/// One unit of outbound work produced by an actor.
#[derive(Debug)]
pub struct Notification {
    /// Listener notice, absent for mutations that are not events
    /// (start, pause, resume, history clear)
    pub notice: Option<EventNotice>,
    /// Persistence payload
    pub update: SnapshotUpdate,
}

/// Messages consumed by the notifier task.
#[derive(Debug)]
pub enum NotifierMessage {
    /// Deliver a notification
    Notify(Box<Notification>),
    /// Wait for all in-flight sink writes, then acknowledge
    Flush(oneshot::Sender<()>),
    /// Flush, acknowledge, and exit
    Stop(oneshot::Sender<()>),
}

/// Sink writes owned by the notifier task.
struct SinkWriter {
    sink: Arc<dyn SnapshotSink>,
    writes: JoinSet<String>,
    /// Journey id -> task writing it
    in_flight: HashMap<String, task::Id>,
    /// Newest update waiting behind an in-flight write
    pending: HashMap<String, SnapshotUpdate>,
}

impl SinkWriter {
    fn new(sink: Arc<dyn SnapshotSink>) -> Self {
        Self {
            sink,
            writes: JoinSet::new(),
            in_flight: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    fn submit(&mut self, update: SnapshotUpdate) {
        if self.in_flight.contains_key(&update.journey_id) {
            if let Some(superseded) = self.pending.insert(update.journey_id.clone(), update) {
                debug!(
                    journey_id = %superseded.journey_id,
                    version = superseded.version,
                    "superseded snapshot dropped"
                );
            }
            return;
        }
        self.start(update);
    }

    fn start(&mut self, update: SnapshotUpdate) {
        let journey_id = update.journey_id.clone();
        let sink = Arc::clone(&self.sink);
        let handle = self.writes.spawn(async move {
            persist(sink.as_ref(), &update).await;
            update.journey_id
        });
        self.in_flight.insert(journey_id, handle.id());
    }

    fn finished(&mut self, result: Result<String, JoinError>) {
        let journey_id = match result {
            Ok(journey_id) => journey_id,
            Err(e) => {
                metrics::record_persist_failure();
                warn!(error = %e, "snapshot write task failed");
                let id = e.id();
                let Some(journey_id) = self
                    .in_flight
                    .iter()
                    .find_map(|(journey_id, task)| (*task == id).then(|| journey_id.clone()))
                else {
                    return;
                };
                journey_id
            }
        };

        self.in_flight.remove(&journey_id);
        if let Some(next) = self.pending.remove(&journey_id) {
            self.start(next);
        }
    }

    /// Collects finished writes without waiting.
    fn reap(&mut self) {
        while let Some(result) = self.writes.try_join_next() {
            self.finished(result);
        }
    }

    /// Waits until every in-flight and pending write is done.
    async fn drain(&mut self) {
        while let Some(result) = self.writes.join_next().await {
            self.finished(result);
        }
    }
}

/// Spawns the notifier task.
///
/// The task exits on [`NotifierMessage::Stop`] or when every sender is
/// dropped, waiting for in-flight sink writes either way.
pub fn spawn_notifier(
    mut rx: mpsc::UnboundedReceiver<NotifierMessage>,
    listeners: Arc<ListenerRegistry>,
    sink: Option<Arc<dyn SnapshotSink>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut writer = sink.map(SinkWriter::new);

        while let Some(message) = rx.recv().await {
            match message {
                NotifierMessage::Notify(notification) => {
                    let Notification { notice, update } = *notification;
                    if let Some(notice) = &notice {
                        listeners.notify(notice);
                    }
                    if let Some(writer) = writer.as_mut() {
                        writer.reap();
                        writer.submit(update);
                    }
                }
                NotifierMessage::Flush(ack) => {
                    if let Some(writer) = writer.as_mut() {
                        writer.drain().await;
                    }
                    let _ = ack.send(());
                }
                NotifierMessage::Stop(ack) => {
                    if let Some(writer) = writer.as_mut() {
                        writer.drain().await;
                    }
                    let _ = ack.send(());
                    debug!("notifier stopped");
                    return;
                }
            }
        }

        if let Some(writer) = writer.as_mut() {
            writer.drain().await;
        }
        debug!("notifier channel closed");
    })
}

async fn persist(sink: &dyn SnapshotSink, update: &SnapshotUpdate) {
    if let Err(e) = sink.persist(update).await {
        metrics::record_persist_failure();
        warn!(
            journey_id = %update.journey_id,
            version = update.version,
            error = %e,
            "snapshot persist failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn journey() -> Journey {
        Journey::new("j-1", "guest-1", BTreeMap::new(), Utc::now())
    }

    fn notice() -> EventNotice {
        EventNotice::new(&journey(), None, DispatchOutcome::Recorded, Utc::now())
    }

    #[derive(Default)]
    struct RecordingSink {
        versions: Mutex<Vec<u64>>,
        ids: Mutex<Vec<(String, u64)>>,
    }

    #[async_trait::async_trait]
    impl SnapshotSink for RecordingSink {
        async fn persist(&self, update: &SnapshotUpdate) -> Result<(), SinkError> {
            self.versions.lock().unwrap().push(update.version);
            self.ids
                .lock()
                .unwrap()
                .push((update.journey_id.clone(), update.version));
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait::async_trait]
    impl SnapshotSink for FailingSink {
        async fn persist(&self, _update: &SnapshotUpdate) -> Result<(), SinkError> {
            Err(SinkError::Rejected("stale version".to_string()))
        }
    }

    #[test]
    fn test_registry_add_remove() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = registry.add(Arc::new(move |_: &EventNotice| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        registry.notify(&notice());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        registry.notify(&notice());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_order() {
        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            registry.add(Arc::new(move |_: &EventNotice| {
                seen.lock().unwrap().push(tag);
            }));
        }
        registry.notify(&notice());
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
    }

    fn update(journey_id: &str, version: u64) -> NotifierMessage {
        let mut j = Journey::new(journey_id, "guest-1", BTreeMap::new(), Utc::now());
        j.version = version;
        NotifierMessage::Notify(Box::new(Notification {
            notice: Some(EventNotice::new(&j, None, DispatchOutcome::Recorded, Utc::now())),
            update: SnapshotUpdate::of(&j),
        }))
    }

    #[tokio::test]
    async fn test_notifier_delivers_and_flushes() {
        let (tx, rx) = mpsc::unbounded_channel();
        let listeners = Arc::new(ListenerRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        listeners.add(Arc::new(move |_: &EventNotice| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let sink = Arc::new(RecordingSink::default());
        let task = spawn_notifier(rx, listeners, Some(sink.clone() as Arc<dyn SnapshotSink>));

        tx.send(update("j-1", 1)).unwrap();
        let (ack, done) = oneshot::channel();
        tx.send(NotifierMessage::Flush(ack)).unwrap();
        done.await.unwrap();
        assert_eq!(*sink.versions.lock().unwrap(), vec![1]);

        tx.send(update("j-1", 2)).unwrap();
        let (ack, done) = oneshot::channel();
        tx.send(NotifierMessage::Stop(ack)).unwrap();
        done.await.unwrap();
        task.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*sink.versions.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_backlog_coalesces_per_journey() {
        let (tx, rx) = mpsc::unbounded_channel();
        let listeners = Arc::new(ListenerRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        listeners.add(Arc::new(move |_: &EventNotice| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        // queued before the notifier runs, so version 1 is still in flight
        // when the rest arrive
        for version in 1..=4 {
            tx.send(update("j-1", version)).unwrap();
        }
        tx.send(update("j-2", 1)).unwrap();
        let (ack, done) = oneshot::channel();
        tx.send(NotifierMessage::Stop(ack)).unwrap();

        let sink = Arc::new(RecordingSink::default());
        let task = spawn_notifier(rx, listeners, Some(sink.clone() as Arc<dyn SnapshotSink>));
        done.await.unwrap();
        task.await.unwrap();

        // listeners see every notice, the sink only the newest backlog entry
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        let ids = sink.ids.lock().unwrap().clone();
        let j1: Vec<u64> = ids
            .iter()
            .filter(|(id, _)| id == "j-1")
            .map(|(_, v)| *v)
            .collect();
        assert_eq!(j1, vec![1, 4]);
        assert!(ids.contains(&("j-2".to_string(), 1)));
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_stop_notifier() {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = spawn_notifier(rx, Arc::new(ListenerRegistry::new()), Some(Arc::new(FailingSink)));

        tx.send(NotifierMessage::Notify(Box::new(Notification {
            notice: None,
            update: SnapshotUpdate::of(&journey()),
        })))
        .unwrap();

        let (ack, done) = oneshot::channel();
        tx.send(NotifierMessage::Flush(ack)).unwrap();
        done.await.unwrap();

        drop(tx);
        task.await.unwrap();
    }
}
