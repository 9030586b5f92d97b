//! # cfgwatch Store
//!
//! Remote key-value store contract and implementations for cfgwatch.
//!
//! This crate provides the store-facing side of the configuration watcher.
//! The sync core only depends on the [`RemoteStore`] and [`Watcher`] traits;
//! everything network-specific lives behind them.
//!
//! ## Capabilities
//!
//! - Point write of a key to a value
//! - Recursive read of every leaf under a prefix
//! - Long-lived watch yielding [`ChangeEvent`]s for a prefix
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - In-process store with a commit log and fault injection
//! - [`EtcdStore`] - etcd v2 keys API over a pluggable [`HttpClient`]
//!
//! ## Example
//!
//! ```rust
//! use cfgwatch_store::{MemoryStore, RemoteStore, Watcher, ChangeAction};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = MemoryStore::new();
//! store.write("/config/web1/timeout", "30").await.unwrap();
//!
//! let subtree = store.read_subtree("/config/web1").await.unwrap();
//! assert_eq!(subtree.entries.len(), 1);
//!
//! let mut watcher = store.watch("/config/web1", subtree.index);
//! store.write("/config/web1/timeout", "60").await.unwrap();
//! let event = watcher.next().await.unwrap();
//! assert_eq!(event.action, ChangeAction::Set);
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod backend;
mod error;
mod etcd;
mod http;
mod memory;
mod types;

pub use backend::{RemoteStore, Watcher};
pub use error::{StoreError, StoreResult};
pub use etcd::{EtcdConfig, EtcdStore, EtcdWatcher, DEFAULT_HEADER_TIMEOUT};
pub use http::{Credentials, HttpClient, HttpRequest, HttpResponse, Method, TransportError};
pub use memory::{MemoryStore, MemoryWatcher};
pub use types::{ChangeAction, ChangeEvent, Entry, Subtree, WriteResponse};
