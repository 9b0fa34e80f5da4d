//! Observability module
//!
//! Logging, metrics, and the structured JSONL journal for monitoring
//! `journeyflow` runs.

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{JournalEmitter, JournalEntry, RunSummary};
pub use logging::{LogFormat, init_logging};
pub use metrics::init_metrics;
