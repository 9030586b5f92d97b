//! Error types for the sync engine.

use cfgwatch_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that end a sync session.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The initial subtree read failed; the mirror has no trustworthy
    /// baseline.
    #[error("initial load of server {server:?} failed: {source}")]
    InitialLoad {
        /// Server whose subtree was being read.
        server: String,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// The watch failed with a non-transient error.
    #[error("watch on server {server:?} failed: {source}")]
    Stream {
        /// Server whose subtree was being watched.
        server: String,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
    /// Returns the underlying store error, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            SyncError::InitialLoad { source, .. } | SyncError::Stream { source, .. } => {
                Some(source)
            }
            SyncError::InvalidStateTransition { .. } => None,
        }
    }
}

/// How the engine reacts to a failed watch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Temporary cluster condition: ask for the next event again.
    ClusterTransient,
    /// Anything else: end the session.
    Fatal,
}

/// Classifies a watch failure.
pub fn classify(error: &StoreError) -> FaultClass {
    match error {
        StoreError::Cluster { .. } => FaultClass::ClusterTransient,
        StoreError::NotFound { .. }
        | StoreError::Unauthorized(_)
        | StoreError::Rejected { .. }
        | StoreError::Unavailable { .. }
        | StoreError::Http { .. }
        | StoreError::Decode(_) => FaultClass::Fatal,
    }
}
