//! Sync engine state machine.

use crate::cancel::{cancel_pair, CancelHandle, CancelToken};
use crate::config::SyncConfig;
use crate::error::{classify, FaultClass, SyncError, SyncResult};
use crate::mirror::{MirrorChange, SettingsMirror, Snapshot};
use crate::observer::{SnapshotObserver, TracingObserver};
use cfgwatch_store::{ChangeEvent, RemoteStore, StoreError, Watcher};
use std::fmt;
use std::future::Future;
use tokio::sync::watch;
use tokio::time::Instant;

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Constructed, not yet run.
    Idle,
    /// Reading the initial subtree.
    Initializing,
    /// Applying watch events.
    Streaming,
    /// Stopped by a fatal error.
    Faulted,
    /// Stopped by cancellation or deadline.
    Terminated,
}

impl SyncState {
    /// Returns true while the session is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Initializing | SyncState::Streaming)
    }

    /// Returns true once the session has ended.
    pub fn is_final(&self) -> bool {
        matches!(self, SyncState::Faulted | SyncState::Terminated)
    }

    /// Returns true if the engine can start a session.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Idle => "idle",
            SyncState::Initializing => "initializing",
            SyncState::Streaming => "streaming",
            SyncState::Faulted => "faulted",
            SyncState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Statistics about a sync session.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Number of entries in the initial load.
    pub entries_loaded: u64,
    /// Events that were applied (including no-op removals).
    pub events_applied: u64,
    /// Events with an action the mirror does not track.
    pub events_ignored: u64,
    /// Cluster-transient faults that were retried.
    pub transient_retries: u64,
    /// Snapshots handed to observers.
    pub snapshots_published: u64,
    /// Store index of the last delivered event.
    pub last_event_index: Option<u64>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// How a session that did not fault ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A [`CancelHandle`] requested shutdown.
    Cancelled,
    /// The configured session timeout elapsed.
    DeadlineElapsed,
}

enum Interrupt {
    Cancelled,
    Deadline,
}

impl From<Interrupt> for SyncOutcome {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Cancelled => SyncOutcome::Cancelled,
            Interrupt::Deadline => SyncOutcome::DeadlineElapsed,
        }
    }
}

/// Runs `future` unless cancellation or the deadline comes first.
async fn interruptible<F: Future>(
    future: F,
    cancel: &mut CancelToken,
    deadline: Option<Instant>,
) -> Result<F::Output, Interrupt> {
    let expiry = async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        _ = expiry => Err(Interrupt::Deadline),
        output = future => Ok(output),
    }
}

/// The sync engine mirrors one server's configuration subtree.
///
/// A session loads the full subtree once, then applies watch events one at
/// a time until a fatal fault, cancellation, or the session deadline.
///
/// # Example
///
/// ```rust
/// use cfgwatch_store::MemoryStore;
/// use cfgwatch_sync::{SyncConfig, SyncEngine, SyncOutcome};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MemoryStore::with_entries([("/config/web1/timeout", "30")]);
/// let mut engine = SyncEngine::new(SyncConfig::new("web1"), store);
///
/// engine.cancel_handle().cancel();
/// let outcome = engine.run().await.unwrap();
/// assert_eq!(outcome, SyncOutcome::Cancelled);
/// # }
/// ```
pub struct SyncEngine<S: RemoteStore, O: SnapshotObserver = TracingObserver> {
    config: SyncConfig,
    store: S,
    observer: O,
    mirror: SettingsMirror,
    state: SyncState,
    stats: SyncStats,
    cancel_handle: CancelHandle,
    cancel_token: CancelToken,
    snapshots: watch::Sender<Snapshot>,
}

impl<S: RemoteStore> SyncEngine<S, TracingObserver> {
    /// Creates an engine that logs every snapshot.
    pub fn new(config: SyncConfig, store: S) -> Self {
        let observer = TracingObserver::new(config.server.clone());
        Self::with_observer(config, store, observer)
    }
}

impl<S: RemoteStore, O: SnapshotObserver> SyncEngine<S, O> {
    /// Creates an engine with a custom snapshot observer.
    pub fn with_observer(config: SyncConfig, store: S, observer: O) -> Self {
        let (cancel_handle, cancel_token) = cancel_pair();
        let (snapshots, _) = watch::channel(Snapshot::default());
        let mirror = SettingsMirror::new(config.root());
        Self {
            config,
            store,
            observer,
            mirror,
            state: SyncState::Idle,
            stats: SyncStats::default(),
            cancel_handle,
            cancel_token,
            snapshots,
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.clone()
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Read access to the mirror.
    pub fn mirror(&self) -> &SettingsMirror {
        &self.mirror
    }

    /// Returns the latest published snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Subscribes to published snapshots.
    ///
    /// Receivers can be moved to other tasks and read while the session
    /// keeps streaming.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    /// Returns a handle that cancels the session.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel_handle.clone()
    }

    fn transition(&mut self, to: SyncState) {
        tracing::info!(
            server = %self.config.server,
            from = %self.state,
            to = %to,
            "sync state transition"
        );
        self.state = to;
    }

    fn publish(&mut self) {
        let snapshot = self.mirror.snapshot();
        self.observer.observe(&snapshot);
        self.snapshots.send_replace(snapshot);
        self.stats.snapshots_published += 1;
    }

    fn terminate(&mut self, interrupt: Interrupt) -> SyncOutcome {
        self.transition(SyncState::Terminated);
        let outcome = SyncOutcome::from(interrupt);
        tracing::info!(server = %self.config.server, outcome = ?outcome, "sync session ended");
        outcome
    }

    fn fault(&mut self, error: &StoreError, operation: &str) {
        tracing::error!(
            server = %self.config.server,
            operation,
            error = %error,
            "sync session faulted"
        );
        self.stats.last_error = Some(error.to_string());
        self.transition(SyncState::Faulted);
    }

    fn apply_event(&mut self, event: &ChangeEvent) {
        let change = self.mirror.apply(event);
        self.stats.last_event_index = Some(event.modified_index);

        if change == MirrorChange::Ignored {
            self.stats.events_ignored += 1;
            tracing::debug!(
                server = %self.config.server,
                key = %event.key,
                action = %event.action,
                "ignoring untracked action"
            );
        } else {
            self.stats.events_applied += 1;
            tracing::debug!(
                server = %self.config.server,
                key = %event.key,
                action = %event.action,
                change = ?change,
                index = event.modified_index,
                "applied change"
            );
        }

        self.publish();
    }

    /// Runs the session: initial load, then streaming.
    ///
    /// Returns `Ok` only when the session is cancelled or its deadline
    /// elapses. Cluster-transient faults are retried internally and never
    /// returned.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidStateTransition`] if the engine already ran
    /// - [`SyncError::InitialLoad`] if the subtree read fails
    /// - [`SyncError::Stream`] on a non-transient watch failure
    pub async fn run(&mut self) -> SyncResult<SyncOutcome> {
        if !self.state.can_start_sync() {
            return Err(SyncError::InvalidStateTransition {
                from: self.state.to_string(),
                to: SyncState::Initializing.to_string(),
            });
        }

        let deadline = self.config.timeout.map(|timeout| Instant::now() + timeout);
        let mut cancel = self.cancel_token.clone();
        let prefix = self.config.prefix();

        // Initializing
        self.transition(SyncState::Initializing);
        let read = self.store.read_subtree(&prefix);
        let subtree = match interruptible(read, &mut cancel, deadline).await {
            Err(interrupt) => return Ok(self.terminate(interrupt)),
            Ok(Err(error)) => {
                self.fault(&error, "initial load");
                return Err(SyncError::InitialLoad {
                    server: self.config.server.clone(),
                    source: error,
                });
            }
            Ok(Ok(subtree)) => subtree,
        };

        self.mirror
            .load(subtree.entries.iter().map(|entry| (&entry.key, entry.value.as_str())));
        self.stats.entries_loaded = subtree.entries.len() as u64;
        tracing::info!(
            server = %self.config.server,
            entries = subtree.entries.len(),
            settings = self.mirror.len(),
            index = subtree.index,
            "initial load complete"
        );
        self.publish();

        // Streaming
        self.transition(SyncState::Streaming);
        let mut watcher = self.store.watch(&prefix, subtree.index);
        let mut consecutive_faults = 0u32;

        loop {
            let delay = self.config.retry.delay_for_attempt(consecutive_faults);
            if !delay.is_zero() {
                if let Err(interrupt) =
                    interruptible(tokio::time::sleep(delay), &mut cancel, deadline).await
                {
                    return Ok(self.terminate(interrupt));
                }
            }

            let next = match interruptible(watcher.next(), &mut cancel, deadline).await {
                Err(interrupt) => return Ok(self.terminate(interrupt)),
                Ok(next) => next,
            };

            match next {
                Ok(event) => {
                    consecutive_faults = 0;
                    self.apply_event(&event);
                }
                Err(error) => match classify(&error) {
                    FaultClass::ClusterTransient => {
                        consecutive_faults = consecutive_faults.saturating_add(1);
                        self.stats.transient_retries += 1;
                        tracing::warn!(
                            server = %self.config.server,
                            error = %error,
                            attempt = consecutive_faults,
                            "transient cluster error, retrying watch"
                        );
                    }
                    FaultClass::Fatal => {
                        self.fault(&error, "watch");
                        return Err(SyncError::Stream {
                            server: self.config.server.clone(),
                            source: error,
                        });
                    }
                },
            }
        }
    }
}
