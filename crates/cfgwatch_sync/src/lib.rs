//! # cfgwatch Sync
//!
//! Configuration mirror and watch state machine.
//!
//! This crate provides:
//! - Key path codec (remote key ↔ setting name)
//! - Settings mirror with immutable snapshots
//! - Sync state machine (idle → initializing → streaming → faulted | terminated)
//! - Retry-vs-fatal fault classification
//! - Snapshot observers and subscriptions
//!
//! ## Architecture
//!
//! A session mirrors the subtree `/config/<server>/` of a remote store:
//! 1. Read the whole subtree once and load it into the mirror
//! 2. Watch the subtree from the index the read was served at
//! 3. Apply each event, in delivery order, and publish a snapshot
//!
//! ## Key Invariants
//!
//! - The engine is the only writer of its mirror
//! - Events are applied one at a time, in commit order
//! - A failed initial read ends the session; nothing is retried
//! - Cluster-transient watch errors are retried and never surfaced
//! - Any other watch error ends the session with the mirror untouched
//!
//! A transient fault does not trigger a fresh subtree read, so events the
//! store dropped during the fault are not recovered.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod cancel;
mod config;
mod error;
pub mod keypath;
mod mirror;
mod observer;
mod state;

pub use cancel::CancelHandle;
pub use config::{RetryConfig, SyncConfig};
pub use error::{classify, FaultClass, SyncError, SyncResult};
pub use keypath::{build_key, to_setting_name, CONFIG_ROOT};
pub use mirror::{MirrorChange, SettingsMirror, Snapshot};
pub use observer::{SnapshotObserver, TracingObserver};
pub use state::{SyncEngine, SyncOutcome, SyncState, SyncStats};
