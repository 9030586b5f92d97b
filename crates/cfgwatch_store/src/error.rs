//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// etcd error code: key not found.
pub const CODE_KEY_NOT_FOUND: u32 = 100;
/// etcd error code: unauthorized request.
pub const CODE_UNAUTHORIZED: u32 = 110;
/// etcd error code: internal raft error.
pub const CODE_RAFT_INTERNAL: u32 = 300;
/// etcd error code: leader election in progress.
pub const CODE_LEADER_ELECT: u32 = 301;
/// etcd error code: the requested watch index has been compacted away.
pub const CODE_EVENT_INDEX_CLEARED: u32 = 401;
/// etcd error code: standby internal error.
pub const CODE_STANDBY_INTERNAL: u32 = 402;

/// Errors that can occur while talking to the remote store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The cluster reported a temporary condition (leader election,
    /// raft hiccup, stale watch position).
    #[error("cluster error {code}: {message} (index {index})")]
    Cluster {
        /// Store-specific error code.
        code: u32,
        /// Message reported by the store.
        message: String,
        /// Store index at the time of the error.
        index: u64,
    },

    /// The key or directory does not exist.
    #[error("key not found: {key}")]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// The store rejected the credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The store rejected the request for another reason.
    #[error("request rejected with code {code}: {message}")]
    Rejected {
        /// Store-specific error code.
        code: u32,
        /// Message reported by the store.
        message: String,
    },

    /// No endpoint could be reached.
    #[error("store unavailable after trying {endpoints} endpoint(s): {last_error}")]
    Unavailable {
        /// Number of endpoints tried.
        endpoints: usize,
        /// The last transport failure.
        last_error: String,
    },

    /// Unexpected HTTP status without a store error body.
    #[error("unexpected HTTP status {status}")]
    Http {
        /// HTTP status code.
        status: u16,
    },

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl StoreError {
    /// Builds the error for a store error code.
    pub fn from_code(code: u32, message: impl Into<String>, key: &str, index: u64) -> Self {
        let message = message.into();
        match code {
            CODE_KEY_NOT_FOUND => StoreError::NotFound {
                key: key.to_string(),
            },
            CODE_UNAUTHORIZED => StoreError::Unauthorized(message),
            CODE_RAFT_INTERNAL
            | CODE_LEADER_ELECT
            | CODE_EVENT_INDEX_CLEARED
            | CODE_STANDBY_INTERNAL => StoreError::Cluster {
                code,
                message,
                index,
            },
            _ => StoreError::Rejected { code, message },
        }
    }

    /// Creates a leader-election cluster error.
    pub fn leader_election(index: u64) -> Self {
        StoreError::Cluster {
            code: CODE_LEADER_ELECT,
            message: "During Leader Election".into(),
            index,
        }
    }

    /// Creates a stale-watch-position cluster error.
    pub fn event_index_cleared(index: u64) -> Self {
        StoreError::Cluster {
            code: CODE_EVENT_INDEX_CLEARED,
            message: "The event in requested index is outdated and cleared".into(),
            index,
        }
    }

    /// Returns true if the cluster reported a temporary condition.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Cluster { .. })
    }

    /// Returns true if the key was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
