//! Snapshot observation sinks.

use crate::mirror::Snapshot;

/// Receives a full rendering of the mirror after the initial load and
/// after every applied event.
pub trait SnapshotObserver: Send {
    /// Observes the current mirror contents.
    fn observe(&mut self, snapshot: &Snapshot);
}

impl<F> SnapshotObserver for F
where
    F: FnMut(&Snapshot) + Send,
{
    fn observe(&mut self, snapshot: &Snapshot) {
        self(snapshot)
    }
}

/// Logs every snapshot through `tracing` at info level.
#[derive(Debug, Clone)]
pub struct TracingObserver {
    server: String,
}

impl TracingObserver {
    /// Creates an observer labelled with `server`.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
        }
    }
}

impl SnapshotObserver for TracingObserver {
    fn observe(&mut self, snapshot: &Snapshot) {
        tracing::info!(
            server = %self.server,
            settings = snapshot.len(),
            "{}",
            snapshot
        );
    }
}
