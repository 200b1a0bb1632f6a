use async_trait::async_trait;

use crate::domain::ports::Notifier;
use crate::error::Result;

/// Default notifier: logs every event instead of dispatching it.
///
/// Deployments plug a real queue-backed dispatcher in behind the
/// [`Notifier`] port; the engine treats delivery as at-least-once and
/// never depends on the result.
#[derive(Default, Clone)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn enqueue(&self, event: &str, payload: serde_json::Value) -> Result<()> {
        tracing::info!(event, %payload, "notification enqueued");
        Ok(())
    }
}

/// Test notifier that records every enqueued event.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotifier {
    events: std::sync::Mutex<Vec<(String, serde_json::Value)>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, serde_json::Value)> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn enqueue(&self, event: &str, payload: serde_json::Value) -> Result<()> {
        self.events.lock().unwrap().push((event.to_string(), payload));
        Ok(())
    }
}
