// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-run key/value scratchpad.
//!
//! A [`KeyValueStore`] is shared across a whole `process_context` run and is
//! cloned at every hook and processor boundary; the clone *is* the deep copy
//! that prevents callbacks from aliasing the dispatcher's view.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// String-keyed mapping with last-writer-wins saves.
///
/// Values are arbitrary JSON; `Clone` produces a full deep copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyValueStore {
    store: BTreeMap<String, serde_json::Value>,
}

impl KeyValueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Save a value under a key, replacing any previous value.
    pub fn save(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.store.insert(key.into(), value.into());
    }

    /// Look up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.store.get(key)
    }

    /// Remove a value by key, returning it if it existed.
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.store.remove(key)
    }

    /// Returns `true` when the key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    /// Number of entries in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns `true` when the store has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.store.iter()
    }
}
