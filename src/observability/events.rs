//! Structured journal for `journeyflow`.
//!
//! Discrete, typed entries describing what the engine did. Entries are
//! serialized as newline-delimited JSON (JSONL) and carry a monotonically
//! increasing sequence number. [`JournalEmitter`] plugs into the engine as
//! both a listener and a snapshot sink, so a single file captures every
//! processed event and every persisted journey version.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SinkError;
use crate::journey::{
    DispatchOutcome, EventNotice, EventType, JourneyListener, JourneyState, SnapshotSink,
    SnapshotUpdate, Stage,
};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Summary statistics written when a run finishes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Journeys created during the run.
    pub journeys: usize,
    /// Commands accepted by a journey.
    pub accepted: u64,
    /// Commands rejected or dropped.
    pub rejected: u64,
}

/// A journal entry.
///
/// Serialized with an internal `"type"` tag.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JournalEntry {
    /// A run has started reading commands.
    RunStarted {
        /// When the run started.
        timestamp: DateTime<Utc>,
        /// Where commands come from (usually a file path).
        source: String,
    },

    /// A journey processed an event or timed out.
    EventProcessed {
        /// When it was processed.
        timestamp: DateTime<Utc>,
        /// Journey id.
        journey_id: String,
        /// Event type, absent for a timeout without a synthesized event.
        #[serde(skip_serializing_if = "Option::is_none")]
        event_type: Option<EventType>,
        /// What the event did.
        outcome: DispatchOutcome,
        /// State after processing.
        state: JourneyState,
        /// Stage after processing.
        stage: Stage,
        /// Rolling overall score after processing.
        overall_score: f64,
        /// Journey version after processing.
        version: u64,
    },

    /// A journey version was handed to persistence.
    SnapshotPersisted {
        /// When the snapshot was written.
        timestamp: DateTime<Utc>,
        /// Journey id.
        journey_id: String,
        /// Persisted version.
        version: u64,
        /// State at that version.
        state: JourneyState,
        /// Whether the journey is still active.
        is_active: bool,
    },

    /// A run has finished.
    RunFinished {
        /// When the run finished.
        timestamp: DateTime<Utc>,
        /// Run summary statistics.
        summary: RunSummary,
    },
}

// ---------------------------------------------------------------------------
// Envelope (adds sequence number via serde flatten)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct JournalEnvelope<'a> {
    sequence: u64,
    #[serde(flatten)]
    entry: &'a JournalEntry,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL journal writer.
///
/// Each entry atomically takes the next sequence number and is written
/// and flushed as one line. Through [`emit`](Self::emit) failures are
/// dropped; through the [`SnapshotSink`] contract they are reported to
/// the engine, which logs and counts them.
pub struct JournalEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for JournalEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl JournalEmitter {
    /// Creates an emitter that writes to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates an emitter that discards everything.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter that appends to the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created or opened.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Writes an entry as a single JSONL line, dropping failures.
    pub fn emit(&self, entry: &JournalEntry) {
        let _ = self.write_entry(entry);
    }

    /// Returns the number of entries written so far.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Flushes the underlying writer.
    pub fn flush(&self) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writer.flush();
    }

    fn write_entry(&self, entry: &JournalEntry) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let line = serde_json::to_string(&JournalEnvelope { sequence, entry })?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

impl JourneyListener for JournalEmitter {
    fn on_event(&self, notice: &EventNotice) {
        self.emit(&JournalEntry::EventProcessed {
            timestamp: notice.timestamp,
            journey_id: notice.journey_id.clone(),
            event_type: notice.event.as_ref().map(|e| e.event_type),
            outcome: notice.outcome.clone(),
            state: notice.state,
            stage: notice.stage,
            overall_score: notice.overall_score,
            version: notice.version,
        });
    }
}

#[async_trait::async_trait]
impl SnapshotSink for JournalEmitter {
    async fn persist(&self, update: &SnapshotUpdate) -> Result<(), SinkError> {
        self.write_entry(&JournalEntry::SnapshotPersisted {
            timestamp: Utc::now(),
            journey_id: update.journey_id.clone(),
            version: update.version,
            state: update.journey.state,
            is_active: update.journey.is_active,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
