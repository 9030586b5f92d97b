//! Remote store trait definitions.

use crate::error::StoreResult;
use crate::types::{ChangeEvent, Subtree, WriteResponse};
use std::future::Future;

/// A remote hierarchical key-value store.
///
/// Stores are **consistent, network-accessible services**. The sync core
/// depends only on this contract, never on a concrete client.
///
/// # Invariants
///
/// - `read_subtree` returns every leaf key under the prefix, with the store
///   index the read was served at
/// - A watcher created with `after_index` yields every change committed
///   after that index, in commit order
/// - Stores must be `Send + Sync` so a session can run on any runtime thread
///
/// # Implementors
///
/// - [`crate::MemoryStore`] - For tests and demos
/// - [`crate::EtcdStore`] - For etcd v2 clusters
pub trait RemoteStore: Send + Sync {
    /// Watcher type produced by [`RemoteStore::watch`].
    type Watcher: Watcher;

    /// Writes `value` at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write or cannot be reached.
    fn write(
        &self,
        key: &str,
        value: &str,
    ) -> impl Future<Output = StoreResult<WriteResponse>> + Send;

    /// Reads every leaf under `prefix`, recursively.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::NotFound`] if the prefix does not exist,
    /// or a transport/cluster error otherwise.
    fn read_subtree(&self, prefix: &str) -> impl Future<Output = StoreResult<Subtree>> + Send;

    /// Starts a recursive watch on `prefix` covering changes committed
    /// after `after_index`.
    fn watch(&self, prefix: &str, after_index: u64) -> Self::Watcher;
}

/// A long-lived change subscription.
pub trait Watcher: Send {
    /// Waits for the next change event.
    ///
    /// The returned future suspends until the store delivers an event or
    /// reports an error. Dropping the future abandons the request without
    /// losing the watcher's position.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Cluster`] for temporary cluster
    /// conditions and other variants for everything else.
    fn next(&mut self) -> impl Future<Output = StoreResult<ChangeEvent>> + Send;
}
