//! In-memory store for testing.

use crate::backend::{RemoteStore, Watcher};
use crate::error::{StoreError, StoreResult};
use crate::types::{ChangeAction, ChangeEvent, Entry, Subtree, WriteResponse};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;

/// An in-memory remote store.
///
/// This store keeps every commit in an append-only log so watchers can
/// resume from any index. It is suitable for:
/// - Unit tests
/// - Integration tests
/// - Demos that should not need a running cluster
///
/// Faults can be injected into reads and watches to exercise the sync
/// engine's error handling.
///
/// # Thread Safety
///
/// Clones share the same state, so a test can keep a handle and mutate the
/// store while an engine watches it.
///
/// # Example
///
/// ```rust
/// use cfgwatch_store::{MemoryStore, StoreError};
///
/// let store = MemoryStore::with_entries([("/config/web1/timeout", "30")]);
/// assert_eq!(store.get("/config/web1/timeout").as_deref(), Some("30"));
///
/// store.inject_watch_fault(StoreError::leader_election(store.index()));
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    /// Bumped on every commit or injected fault to wake watchers.
    version: watch::Sender<u64>,
}

#[derive(Debug, Default)]
struct State {
    data: BTreeMap<String, String>,
    log: Vec<ChangeEvent>,
    index: u64,
    read_faults: VecDeque<StoreError>,
    watch_faults: VecDeque<StoreError>,
}

impl State {
    fn commit(&mut self, action: ChangeAction, key: &str, value: Option<&str>) -> u64 {
        self.index += 1;
        if action.is_removal() {
            self.data.remove(key);
        } else if let Some(value) = value {
            self.data.insert(key.to_string(), value.to_string());
        }
        self.log.push(ChangeEvent {
            action,
            key: key.to_string(),
            value: value.map(str::to_string),
            modified_index: self.index,
        });
        self.index
    }
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                version,
            }),
        }
    }

    /// Creates a store with pre-existing keys, each committed as a `set`.
    #[must_use]
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let store = Self::new();
        {
            let mut state = store.shared.state.lock();
            for (key, value) in entries {
                state.commit(ChangeAction::Set, key.as_ref(), Some(value.as_ref()));
            }
        }
        store
    }

    /// Commits an arbitrary action and returns its index.
    ///
    /// Removal actions drop the key; any other action with a value stores it.
    pub fn commit(&self, action: ChangeAction, key: &str, value: Option<&str>) -> u64 {
        let index = self.shared.state.lock().commit(action, key, value);
        self.notify();
        index
    }

    /// Deletes `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the key does not exist.
    pub fn delete(&self, key: &str) -> StoreResult<u64> {
        self.remove(ChangeAction::Delete, key)
    }

    /// Expires `key` as if its TTL elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the key does not exist.
    pub fn expire(&self, key: &str) -> StoreResult<u64> {
        self.remove(ChangeAction::Expire, key)
    }

    fn remove(&self, action: ChangeAction, key: &str) -> StoreResult<u64> {
        let index = {
            let mut state = self.shared.state.lock();
            if !state.data.contains_key(key) {
                return Err(StoreError::NotFound {
                    key: key.to_string(),
                });
            }
            state.commit(action, key, None)
        };
        self.notify();
        Ok(index)
    }

    /// Makes the next `read_subtree` call fail with `error`.
    pub fn fail_next_read(&self, error: StoreError) {
        self.shared.state.lock().read_faults.push_back(error);
    }

    /// Makes the next pending or future watch request fail with `error`.
    ///
    /// Faults are consumed in injection order, one per `next` call.
    pub fn inject_watch_fault(&self, error: StoreError) {
        self.shared.state.lock().watch_faults.push_back(error);
        self.notify();
    }

    /// Returns the current store index.
    pub fn index(&self) -> u64 {
        self.shared.state.lock().index
    }

    /// Returns the value stored at `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.shared.state.lock().data.get(key).cloned()
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.shared.state.lock().data.len()
    }

    /// Returns true if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().data.is_empty()
    }

    fn notify(&self) {
        self.shared.version.send_modify(|version| *version += 1);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_under(key: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    key == prefix
        || key
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

impl RemoteStore for MemoryStore {
    type Watcher = MemoryWatcher;

    async fn write(&self, key: &str, value: &str) -> StoreResult<WriteResponse> {
        let modified_index = self.commit(ChangeAction::Set, key, Some(value));
        Ok(WriteResponse {
            action: ChangeAction::Set,
            key: key.to_string(),
            value: value.to_string(),
            modified_index,
        })
    }

    async fn read_subtree(&self, prefix: &str) -> StoreResult<Subtree> {
        let mut state = self.shared.state.lock();
        if let Some(fault) = state.read_faults.pop_front() {
            return Err(fault);
        }

        let entries: Vec<Entry> = state
            .data
            .iter()
            .filter(|(key, _)| is_under(key, prefix))
            .map(|(key, value)| Entry::new(key.clone(), value.clone()))
            .collect();

        if entries.is_empty() {
            return Err(StoreError::NotFound {
                key: prefix.to_string(),
            });
        }

        Ok(Subtree {
            entries,
            index: state.index,
        })
    }

    fn watch(&self, prefix: &str, after_index: u64) -> MemoryWatcher {
        MemoryWatcher {
            store: self.clone(),
            prefix: prefix.to_string(),
            next_index: after_index + 1,
            changes: self.shared.version.subscribe(),
        }
    }
}

/// Watcher over a [`MemoryStore`] prefix.
#[derive(Debug)]
pub struct MemoryWatcher {
    store: MemoryStore,
    prefix: String,
    next_index: u64,
    changes: watch::Receiver<u64>,
}

impl MemoryWatcher {
    /// Returns the lowest commit index this watcher will deliver next.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    fn poll_once(&mut self) -> Option<StoreResult<ChangeEvent>> {
        let mut state = self.store.shared.state.lock();
        if let Some(fault) = state.watch_faults.pop_front() {
            return Some(Err(fault));
        }

        // The log is ordered by index.
        let start = state
            .log
            .partition_point(|event| event.modified_index < self.next_index);
        let event = state.log[start..]
            .iter()
            .find(|event| is_under(&event.key, &self.prefix))
            .cloned()?;
        self.next_index = event.modified_index + 1;
        Some(Ok(event))
    }
}

impl Watcher for MemoryWatcher {
    async fn next(&mut self) -> StoreResult<ChangeEvent> {
        loop {
            // Mark the current version as seen before looking, so a commit
            // racing with the scan still wakes us.
            let _ = self.changes.borrow_and_update();
            if let Some(result) = self.poll_once() {
                return result;
            }
            if self.changes.changed().await.is_err() {
                return Err(StoreError::Unavailable {
                    endpoints: 1,
                    last_error: "memory store dropped".into(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn read_subtree_returns_leaves_under_prefix() {
        let store = MemoryStore::with_entries([
            ("/config/web1/timeout", "30"),
            ("/config/web1/retries", "3"),
            ("/config/web10/timeout", "99"),
            ("/config/db1/pool", "8"),
        ]);

        let subtree = store.read_subtree("/config/web1").await.unwrap();
        assert_eq!(subtree.index, 4);
        let keys: Vec<&str> = subtree.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["/config/web1/retries", "/config/web1/timeout"]);
    }

    #[tokio::test]
    async fn read_missing_prefix_is_not_found() {
        let store = MemoryStore::new();
        let err = store.read_subtree("/config/nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn injected_read_fault_is_consumed_once() {
        let store = MemoryStore::with_entries([("/config/web1/timeout", "30")]);
        store.fail_next_read(StoreError::Http { status: 500 });

        assert!(store.read_subtree("/config/web1").await.is_err());
        assert!(store.read_subtree("/config/web1").await.is_ok());
    }

    #[tokio::test]
    async fn watch_delivers_changes_after_index_in_order() {
        let store = MemoryStore::with_entries([("/config/web1/timeout", "30")]);
        let mut watcher = store.watch("/config/web1", store.index());

        store.write("/config/db1/pool", "8").await.unwrap();
        store.write("/config/web1/timeout", "60").await.unwrap();
        store.delete("/config/web1/timeout").unwrap();

        let first = watcher.next().await.unwrap();
        assert_eq!(first, ChangeEvent::set("/config/web1/timeout", "60", 3));
        let second = watcher.next().await.unwrap();
        assert_eq!(second, ChangeEvent::delete("/config/web1/timeout", 4));
        assert_eq!(watcher.next_index(), 5);
    }

    #[tokio::test]
    async fn watch_started_mid_log_skips_earlier_commits() {
        let store = MemoryStore::new();
        for i in 0..50 {
            let value = i.to_string();
            store.commit(ChangeAction::Set, "/config/web1/counter", Some(value.as_str()));
        }
        store.commit(ChangeAction::Set, "/config/db1/pool", Some("8"));
        store.commit(ChangeAction::Set, "/config/web1/timeout", Some("30"));

        let mut watcher = store.watch("/config/web1", 40);
        let event = watcher.next().await.unwrap();
        assert_eq!(event, ChangeEvent::set("/config/web1/counter", "40", 41));

        let mut tail = store.watch("/config/web1", 50);
        let event = tail.next().await.unwrap();
        assert_eq!(event, ChangeEvent::set("/config/web1/timeout", "30", 52));
        assert_eq!(tail.next_index(), 53);
    }

    #[tokio::test]
    async fn watch_wakes_on_later_commit() {
        let store = MemoryStore::new();
        let mut watcher = store.watch("/config/web1", 0);

        let writer = store.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.commit(ChangeAction::Set, "/config/web1/retries", Some("5"));
        });

        let event = watcher.next().await.unwrap();
        assert_eq!(event.key, "/config/web1/retries");
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn watch_fault_does_not_move_position() {
        let store = MemoryStore::with_entries([("/config/web1/timeout", "30")]);
        let mut watcher = store.watch("/config/web1", 0);
        store.inject_watch_fault(StoreError::leader_election(1));

        let err = watcher.next().await.unwrap_err();
        assert!(err.is_transient());

        let event = watcher.next().await.unwrap();
        assert_eq!(event.modified_index, 1);
    }

    #[test]
    fn remove_absent_key_fails() {
        let store = MemoryStore::new();
        assert!(store.delete("/config/web1/x").unwrap_err().is_not_found());
        assert!(store.expire("/config/web1/x").unwrap_err().is_not_found());
        assert!(store.is_empty());
    }

    #[test]
    fn prefix_matching_respects_segments() {
        assert!(is_under("/config/web1/timeout", "/config/web1"));
        assert!(is_under("/config/web1/timeout", "/config/web1/"));
        assert!(is_under("/config/web1", "/config/web1"));
        assert!(!is_under("/config/web10/timeout", "/config/web1"));
    }
}
