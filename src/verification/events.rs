//! Progress events emitted by the verification loop.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Serialises as `{"status": "...", "data": {...}}` for an SSE channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "kebab-case")]
pub enum StatusEvent {
    Analyzing,
    Searching { query: String, round: u32 },
    SearchFailed { query: String, round: u32, error: String },
    DeepAnalysis { round: u32 },
}

/// Receives status events. Side channel only; emitting never fails the loop.
pub trait StatusSink: Send + Sync {
    fn emit(&self, event: StatusEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl StatusSink for NoopSink {
    fn emit(&self, _event: StatusEvent) {}
}

/// Adapts a closure into a [`StatusSink`].
pub struct FnSink<F>(pub F);

impl<F> StatusSink for FnSink<F>
where
    F: Fn(StatusEvent) + Send + Sync,
{
    fn emit(&self, event: StatusEvent) {
        (self.0)(event);
    }
}

impl StatusSink for UnboundedSender<StatusEvent> {
    fn emit(&self, event: StatusEvent) {
        // A dropped receiver only means nobody is watching
        let _ = self.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shape() {
        assert_eq!(
            serde_json::to_value(StatusEvent::Searching {
                query: "q".to_string(),
                round: 2
            })
            .expect("serialize"),
            json!({"status": "searching", "data": {"query": "q", "round": 2}})
        );
        assert_eq!(
            serde_json::to_value(StatusEvent::Analyzing).expect("serialize"),
            json!({"status": "analyzing"})
        );
        assert_eq!(
            serde_json::to_value(StatusEvent::DeepAnalysis { round: 3 }).expect("serialize"),
            json!({"status": "deep-analysis", "data": {"round": 3}})
        );
    }

    #[tokio::test]
    async fn channel_sink_delivers() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.emit(StatusEvent::Analyzing);
        assert_eq!(rx.recv().await, Some(StatusEvent::Analyzing));
    }
}
