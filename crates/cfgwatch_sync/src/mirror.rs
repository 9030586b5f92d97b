//! In-memory mirror of one server's settings.

use crate::keypath::to_setting_name;
use cfgwatch_store::{ChangeAction, ChangeEvent};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// What applying an event did to the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorChange {
    /// A new setting was added.
    Inserted,
    /// An existing setting got a new value.
    Updated,
    /// A setting was removed.
    Removed,
    /// The event matched the current state (same value, or absent key).
    Unchanged,
    /// The action is not one the mirror tracks.
    Ignored,
}

impl MirrorChange {
    /// Returns true if the mirror contents changed.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            MirrorChange::Inserted | MirrorChange::Updated | MirrorChange::Removed
        )
    }
}

/// Immutable view of the mirror at one point in time.
///
/// Snapshots share their storage, so cloning one is cheap and never
/// observes later mutations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    settings: Arc<BTreeMap<String, String>>,
}

impl Snapshot {
    /// Returns the value of a setting.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.settings.get(name).map(String::as_str)
    }

    /// Returns the number of settings.
    pub fn len(&self) -> usize {
        self.settings.len()
    }

    /// Returns true if there are no settings.
    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    /// Iterates settings in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.settings
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Returns the settings as a map.
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.settings
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {:?}", name, value)?;
        }
        f.write_str("}")
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.settings.as_ref().serialize(serializer)
    }
}

/// The mutable setting-name → value mapping.
///
/// # Invariants
///
/// - At most one value per setting name
/// - Events are applied one at a time, in delivery order
/// - Only `load` and `apply` mutate
#[derive(Debug, Clone)]
pub struct SettingsMirror {
    root: String,
    settings: BTreeMap<String, String>,
}

impl SettingsMirror {
    /// Creates an empty mirror for keys under `root`.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            settings: BTreeMap::new(),
        }
    }

    /// Returns the root keys are resolved against.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Replaces the contents with `entries`.
    ///
    /// Entries whose keys map to the same setting name keep the last value.
    pub fn load<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        self.settings.clear();
        for (key, value) in entries {
            let name = to_setting_name(key.as_ref(), &self.root);
            self.settings.insert(name.to_string(), value.into());
        }
    }

    /// Applies one change event.
    pub fn apply(&mut self, event: &ChangeEvent) -> MirrorChange {
        let name = to_setting_name(&event.key, &self.root);
        match &event.action {
            ChangeAction::Set => {
                let value = event.value.clone().unwrap_or_default();
                match self.settings.insert(name.to_string(), value) {
                    None => MirrorChange::Inserted,
                    Some(previous) if Some(&previous) == event.value.as_ref() => {
                        MirrorChange::Unchanged
                    }
                    Some(_) => MirrorChange::Updated,
                }
            }
            ChangeAction::Delete | ChangeAction::Expire => match self.settings.remove(name) {
                Some(_) => MirrorChange::Removed,
                None => MirrorChange::Unchanged,
            },
            ChangeAction::Other(_) => MirrorChange::Ignored,
        }
    }

    /// Returns an immutable copy of the current contents.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            settings: Arc::new(self.settings.clone()),
        }
    }

    /// Returns the value of a setting.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.settings.get(name).map(String::as_str)
    }

    /// Returns the number of settings.
    pub fn len(&self) -> usize {
        self.settings.len()
    }

    /// Returns true if there are no settings.
    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }
}
