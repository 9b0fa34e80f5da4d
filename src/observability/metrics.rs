//! Metrics collection for `journeyflow`.
//!
//! Provides Prometheus-compatible metrics and typed convenience functions
//! for recording measurements. Every label value comes from a closed enum,
//! so cardinality is bounded by construction.

use std::sync::atomic::{AtomicBool, Ordering};

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::JourneyflowError;
use crate::journey::{EventType, JourneyState};

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initializes the global metrics recorder.
///
/// When `port` is `Some`, a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`. When `None`, the recorder is installed without
/// an HTTP endpoint.
///
/// # Errors
///
/// Returns `JourneyflowError::Io` if the recorder or HTTP listener
/// cannot be installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), JourneyflowError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| JourneyflowError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

/// Registers metric descriptions with the global recorder.
fn describe_metrics() {
    describe_counter!(
        "journeyflow_events_total",
        "Events accepted into a journey log"
    );
    describe_counter!(
        "journeyflow_transitions_total",
        "State machine transitions"
    );
    describe_counter!(
        "journeyflow_rejections_total",
        "Commands rejected before reaching the event log"
    );
    describe_counter!(
        "journeyflow_guard_rejections_total",
        "Advance commands whose guard failed"
    );
    describe_counter!(
        "journeyflow_timeouts_total",
        "State deadlines that fired"
    );
    describe_gauge!("journeyflow_journeys_live", "Journeys with a running actor");
    describe_counter!(
        "journeyflow_persist_failures_total",
        "Snapshot sink writes that failed"
    );
}

/// Records an accepted event.
pub fn record_event(event_type: EventType) {
    counter!("journeyflow_events_total", "event_type" => event_type.as_str()).increment(1);
}

/// Records a state transition.
pub fn record_transition(from: JourneyState, to: JourneyState) {
    counter!(
        "journeyflow_transitions_total",
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
}

/// Records a rejected command by error kind.
pub fn record_rejection(kind: &'static str) {
    counter!("journeyflow_rejections_total", "kind" => kind).increment(1);
}

/// Records a guard that held an advance back.
pub fn record_guard_rejection(state: JourneyState) {
    counter!("journeyflow_guard_rejections_total", "state" => state.as_str()).increment(1);
}

/// Records a fired deadline.
pub fn record_timeout(state: JourneyState) {
    counter!("journeyflow_timeouts_total", "state" => state.as_str()).increment(1);
}

/// Sets the number of journeys with a running actor.
#[allow(clippy::cast_precision_loss)]
pub fn set_journeys_live(count: usize) {
    gauge!("journeyflow_journeys_live").set(count as f64);
}

/// Records a failed snapshot sink write.
pub fn record_persist_failure() {
    counter!("journeyflow_persist_failures_total").increment(1);
}
