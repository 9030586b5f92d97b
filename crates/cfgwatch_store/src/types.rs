//! Data types exchanged with the remote store.

use std::fmt;

/// Kind of change reported by a watch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    /// The key was set to a new value.
    Set,
    /// The key was deleted.
    Delete,
    /// The key's TTL elapsed.
    Expire,
    /// Any other store action (`create`, `compareAndSwap`, ...).
    Other(String),
}

impl ChangeAction {
    /// Parses the action name used on the wire.
    pub fn from_wire(action: &str) -> Self {
        match action {
            "set" => ChangeAction::Set,
            "delete" => ChangeAction::Delete,
            "expire" => ChangeAction::Expire,
            other => ChangeAction::Other(other.to_string()),
        }
    }

    /// Returns the action name used on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            ChangeAction::Set => "set",
            ChangeAction::Delete => "delete",
            ChangeAction::Expire => "expire",
            ChangeAction::Other(name) => name,
        }
    }

    /// Returns true if the action removes the key.
    pub fn is_removal(&self) -> bool {
        matches!(self, ChangeAction::Delete | ChangeAction::Expire)
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single change notification from a watch.
///
/// Events for one key are delivered in the order the store committed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// What happened.
    pub action: ChangeAction,
    /// The affected key.
    pub key: String,
    /// New value (present for `Set`).
    pub value: Option<String>,
    /// Store index of the commit.
    pub modified_index: u64,
}

impl ChangeEvent {
    /// Creates a set event.
    pub fn set(key: impl Into<String>, value: impl Into<String>, modified_index: u64) -> Self {
        Self {
            action: ChangeAction::Set,
            key: key.into(),
            value: Some(value.into()),
            modified_index,
        }
    }

    /// Creates a delete event.
    pub fn delete(key: impl Into<String>, modified_index: u64) -> Self {
        Self {
            action: ChangeAction::Delete,
            key: key.into(),
            value: None,
            modified_index,
        }
    }

    /// Creates an expire event.
    pub fn expire(key: impl Into<String>, modified_index: u64) -> Self {
        Self {
            action: ChangeAction::Expire,
            key: key.into(),
            value: None,
            modified_index,
        }
    }
}

/// A leaf key and its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Full remote key.
    pub key: String,
    /// Stored value.
    pub value: String,
}

impl Entry {
    /// Creates an entry.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Result of a recursive read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subtree {
    /// Every leaf under the prefix, in store order.
    pub entries: Vec<Entry>,
    /// Store index at the time of the read. A watch started after this
    /// index sees every later change.
    pub index: u64,
}

/// Acknowledgement of a committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResponse {
    /// Action the store recorded.
    pub action: ChangeAction,
    /// The written key.
    pub key: String,
    /// The written value.
    pub value: String,
    /// Store index of the commit.
    pub modified_index: u64,
}
