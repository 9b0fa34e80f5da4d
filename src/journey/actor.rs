//! Per-journey actor.
//!
//! Each journey runs as one tokio task that owns its [`JourneyMachine`].
//! Commands arrive over an mpsc queue and are processed strictly in
//! arrival order; the only other wake-up is the deadline timer, re-armed
//! whenever the journey's deadline changes. Readers never touch the
//! machine: they get clones from a `watch` channel updated after every
//! mutation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::JourneyError;
use crate::observability::metrics;

use super::clock::Clock;
use super::event::Command;
use super::machine::{DispatchOutcome, JourneyMachine};
use super::model::{Deadline, Journey, JourneyState};
use super::notify::{EventNotice, Notification, NotifierMessage, SnapshotUpdate};
use super::snapshot::JourneySnapshot;
use super::stage::Stage;

/// Capacity of each actor's inbound queue.
pub const ACTOR_QUEUE_CAPACITY: usize = 256;

/// Messages accepted by a journey actor.
#[derive(Debug)]
pub enum ActorMessage {
    /// Apply one command and reply with its outcome.
    Dispatch {
        /// Inbound command
        command: Command,
        /// Reply channel
        reply: oneshot::Sender<Result<DispatchOutcome, JourneyError>>,
    },
    /// Empty the event log and reply with the number of events removed.
    ClearHistory {
        /// Reply channel
        reply: oneshot::Sender<usize>,
    },
    /// Freeze to a snapshot and stop.
    Pause {
        /// Reply channel
        reply: oneshot::Sender<JourneySnapshot>,
    },
    /// Stop and hand back the final journey.
    Stop {
        /// Reply channel
        reply: oneshot::Sender<Journey>,
    },
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable reference to a running journey actor.
#[derive(Debug, Clone)]
pub struct JourneyHandle {
    journey_id: Arc<str>,
    entity_id: Arc<str>,
    tx: mpsc::Sender<ActorMessage>,
    view: watch::Receiver<Journey>,
}

impl JourneyHandle {
    /// Returns the journey id.
    #[must_use]
    pub fn journey_id(&self) -> &str {
        &self.journey_id
    }

    /// Returns the guest id.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Returns a clone of the latest published journey state.
    #[must_use]
    pub fn snapshot(&self) -> Journey {
        self.view.borrow().clone()
    }

    /// Returns the current machine state.
    #[must_use]
    pub fn state(&self) -> JourneyState {
        self.view.borrow().state
    }

    /// Returns the current stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.view.borrow().current_stage
    }

    /// Returns whether the actor task is still accepting messages.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Returns a receiver that observes every published state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Journey> {
        self.view.clone()
    }

    /// Sends one command and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Returns the machine's [`JourneyError`] for rejected commands, or
    /// [`JourneyError::ActorUnavailable`] if the actor has stopped.
    pub async fn dispatch(&self, command: Command) -> Result<DispatchOutcome, JourneyError> {
        self.request(|reply| ActorMessage::Dispatch { command, reply })
            .await?
    }

    pub(crate) async fn clear_history(&self) -> Result<usize, JourneyError> {
        self.request(|reply| ActorMessage::ClearHistory { reply }).await
    }

    pub(crate) async fn pause(&self) -> Result<JourneySnapshot, JourneyError> {
        self.request(|reply| ActorMessage::Pause { reply }).await
    }

    pub(crate) async fn stop(&self) -> Result<Journey, JourneyError> {
        self.request(|reply| ActorMessage::Stop { reply }).await
    }

    async fn request<T, F>(&self, build: F) -> Result<T, JourneyError>
    where
        F: FnOnce(oneshot::Sender<T>) -> ActorMessage,
    {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| self.unavailable())?;
        response.await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> JourneyError {
        JourneyError::ActorUnavailable(self.journey_id.to_string())
    }
}

// ============================================================================
// Actor
// ============================================================================

/// Spawns an actor for `machine` and returns its handle and task.
///
/// The current journey state is published (and persisted) once on start.
pub fn spawn(
    machine: JourneyMachine,
    clock: Arc<dyn Clock>,
    notify_tx: mpsc::UnboundedSender<NotifierMessage>,
    cancel: CancellationToken,
) -> (JourneyHandle, JoinHandle<()>) {
    let journey = machine.journey();
    let (tx, rx) = mpsc::channel(ACTOR_QUEUE_CAPACITY);
    let (view_tx, view) = watch::channel(journey.clone());

    let handle = JourneyHandle {
        journey_id: Arc::from(journey.id.as_str()),
        entity_id: Arc::from(journey.entity_id.as_str()),
        tx,
        view,
    };

    let actor = JourneyActor {
        machine,
        clock,
        rx,
        view_tx,
        notify_tx,
        cancel,
    };
    let task = tokio::spawn(actor.run());

    (handle, task)
}

struct JourneyActor {
    machine: JourneyMachine,
    clock: Arc<dyn Clock>,
    rx: mpsc::Receiver<ActorMessage>,
    view_tx: watch::Sender<Journey>,
    notify_tx: mpsc::UnboundedSender<NotifierMessage>,
    cancel: CancellationToken,
}

impl JourneyActor {
    async fn run(mut self) {
        self.publish(None);

        let mut armed = self.machine.deadline();
        let mut timer = Box::pin(tokio::time::sleep(self.remaining(armed)));

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    debug!(journey_id = %self.machine.journey().id, "journey actor cancelled");
                    break;
                }

                () = &mut timer, if armed.is_some() => {
                    if let Some(deadline) = armed.take() {
                        self.on_deadline(deadline);
                    }
                }

                message = self.rx.recv() => {
                    let Some(message) = message else {
                        debug!(journey_id = %self.machine.journey().id, "journey queue closed");
                        break;
                    };
                    if self.on_message(message) {
                        break;
                    }
                }
            }

            let current = self.machine.deadline();
            if current != armed {
                armed = current;
                if armed.is_some() {
                    timer
                        .as_mut()
                        .reset(Instant::now() + self.remaining(armed));
                }
            }
        }
    }

    /// Handles one message. Returns `true` when the actor should stop.
    fn on_message(&mut self, message: ActorMessage) -> bool {
        match message {
            ActorMessage::Dispatch { command, reply } => {
                let result = self.on_dispatch(&command);
                if reply.send(result).is_err() {
                    debug!("dispatch reply channel closed");
                }
                false
            }
            ActorMessage::ClearHistory { reply } => {
                let cleared = self.machine.clear_history(self.clock.now());
                self.publish(None);
                let _ = reply.send(cleared);
                false
            }
            ActorMessage::Pause { reply } => {
                let now = self.clock.now();
                self.machine.mark_paused(now);
                self.publish(None);
                let snapshot = JourneySnapshot::new(self.machine.journey().clone(), now);
                if reply.send(snapshot).is_err() {
                    warn!(
                        journey_id = %self.machine.journey().id,
                        "pause reply dropped; snapshot lost"
                    );
                }
                true
            }
            ActorMessage::Stop { reply } => {
                let _ = reply.send(self.machine.journey().clone());
                true
            }
        }
    }

    fn on_dispatch(&mut self, command: &Command) -> Result<DispatchOutcome, JourneyError> {
        let now = self.clock.now();
        match self.machine.apply(command, now) {
            Ok(applied) => {
                metrics::record_event(applied.event.event_type);
                match &applied.outcome {
                    DispatchOutcome::Transitioned { from, to } => {
                        metrics::record_transition(*from, *to);
                    }
                    DispatchOutcome::GuardRejected { state, .. } => {
                        metrics::record_guard_rejection(*state);
                    }
                    DispatchOutcome::Recorded => {}
                }

                let notice = EventNotice::new(
                    self.machine.journey(),
                    Some(applied.event),
                    applied.outcome.clone(),
                    now,
                );
                self.publish(Some(notice));
                Ok(applied.outcome)
            }
            Err(e) => {
                metrics::record_rejection(e.kind());
                debug!(
                    journey_id = %self.machine.journey().id,
                    command = %command.kind,
                    error = %e,
                    "command rejected"
                );
                Err(e)
            }
        }
    }

    fn on_deadline(&mut self, deadline: Deadline) {
        let now = self.clock.now();
        let Some(timed_out) = self.machine.expire(deadline, now) else {
            return;
        };

        metrics::record_timeout(deadline.state);
        metrics::record_transition(timed_out.transition.from, timed_out.transition.to);

        let outcome = DispatchOutcome::Transitioned {
            from: timed_out.transition.from,
            to: timed_out.transition.to,
        };
        let notice = EventNotice::new(self.machine.journey(), timed_out.synthesized, outcome, now);
        self.publish(Some(notice));
    }

    fn remaining(&self, deadline: Option<Deadline>) -> Duration {
        deadline.map_or(Duration::ZERO, |d| d.remaining(self.clock.now()))
    }

    /// Publishes the current journey to readers, listeners and the sink.
    fn publish(&self, notice: Option<EventNotice>) {
        let journey = self.machine.journey();
        self.view_tx.send_replace(journey.clone());

        let notification = Notification {
            notice,
            update: SnapshotUpdate::of(journey),
        };
        if self
            .notify_tx
            .send(NotifierMessage::Notify(Box::new(notification)))
            .is_err()
        {
            debug!(journey_id = %journey.id, "notifier gone; notification dropped");
        }
    }
}
