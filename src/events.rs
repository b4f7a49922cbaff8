//! Progress streaming — push-style event sink for deployment and dry-run
//! snapshots.
//!
//! No engine entry point blocks its caller: deployments and dry runs are
//! launched detached and communicate exclusively through an injected
//! [`ProgressSink`]. Every emitted payload is a full authoritative state, never
//! a delta, so consumers may join mid-run and render the latest snapshot alone.

use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::debug;

use crate::types::PreflightReport;

/// Push-style sink for named progress events.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &str, payload: Value);
}

/// One emitted event: name plus structured payload.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub event: String,
    pub payload: Value,
}

/// Sink backed by a `tokio::sync::broadcast` channel.
///
/// Emission never blocks and never fails: a send with no live subscribers is
/// silently dropped, matching the fire-and-forget socket emit of the
/// original console.
pub struct BroadcastSink {
    tx: broadcast::Sender<ProgressEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

impl ProgressSink for BroadcastSink {
    fn emit(&self, event: &str, payload: Value) {
        debug!(event = event, "progress event");
        let _ = self.tx.send(ProgressEvent {
            event: event.to_string(),
            payload,
        });
    }
}

/// Sink that renders every event through `tracing` — used by the one-shot CLI
/// commands where no subscriber is attached.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&self, event: &str, payload: Value) {
        tracing::info!(event = event, payload = %payload, "progress");
    }
}

/// Build a `task_progress` payload.
///
/// `result` entries follow the `'host': 'status'` wire format; `error` is the
/// cumulative concatenation of every failure message seen so far in the run,
/// or `null` while the batch is clean.
pub fn task_progress(result: Vec<String>, percent: f64, error: Option<String>) -> Value {
    json!({
        "result": result,
        "percent": percent,
        "error": error,
    })
}

/// Build a `dry_run` payload from the current check states.
pub fn dry_run(report: &PreflightReport) -> Value {
    json!({
        "firewall_rules": report.firewall_rules.as_wire(),
        "check_ssh_login": report.check_ssh_login.as_wire(),
        "check_dataset_access": report.check_dataset_access.as_wire(),
        "check_tmp_space": report.check_tmp_space.as_wire(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PreflightStatus;

    #[test]
    fn task_progress_payload_shape() {
        let payload = task_progress(
            vec!["'sysa': 'done'".to_string(), "'sysb': 'wait'".to_string()],
            50.0,
            None,
        );
        assert_eq!(payload["percent"], 50.0);
        assert_eq!(payload["error"], Value::Null);
        assert_eq!(payload["result"][0], "'sysa': 'done'");
    }

    #[test]
    fn dry_run_payload_uses_wire_statuses() {
        let mut report = PreflightReport::default();
        report.firewall_rules = PreflightStatus::Done;
        report.check_tmp_space = PreflightStatus::Error;
        let payload = dry_run(&report);
        assert_eq!(payload["firewall_rules"], "done");
        assert_eq!(payload["check_ssh_login"], "wait");
        assert_eq!(payload["check_tmp_space"], "error");
    }

    #[tokio::test]
    async fn broadcast_sink_delivers_to_subscriber() {
        let sink = BroadcastSink::new(16);
        let mut rx = sink.subscribe();
        sink.emit("task_progress", json!({"percent": 10.0}));
        let event = rx.recv().await.expect("event");
        assert_eq!(event.event, "task_progress");
        assert_eq!(event.payload["percent"], 10.0);
    }

    #[test]
    fn broadcast_sink_without_subscribers_does_not_fail() {
        let sink = BroadcastSink::new(4);
        sink.emit("dry_run", json!({}));
    }
}
