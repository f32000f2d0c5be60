// SPDX-License-Identifier: MIT OR Apache-2.0
//! Long-term state persistence.
//!
//! Processors record per-task state in a [`StateStore`]: an in-memory cache
//! loaded from a pluggable [`StateBackend`] once at construction and flushed
//! explicitly via [`StateStore::persist_all_state`].  The engine shares one
//! store across a whole run; reads and writes hand out defensive copies so
//! callers can never alias the cache.

use anyhow::Context as _;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

/// Per-object state: a string-keyed JSON mapping.
pub type ObjectState = BTreeMap<String, serde_json::Value>;

/// The full cache shape: object identifier to object state.
pub type StateCache = BTreeMap<String, ObjectState>;

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// A pluggable long-term store behind a [`StateStore`].
pub trait StateBackend: Send + Sync {
    /// Load the entire cache from the backing store.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing store cannot be read or parsed.
    fn load_all(&self) -> anyhow::Result<StateCache>;

    /// Write the entire cache to the backing store.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing store cannot be written.
    fn persist(&self, cache: &StateCache) -> anyhow::Result<()>;

    /// Human-readable name for this backend (used in logging).
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// NullStateBackend
// ---------------------------------------------------------------------------

/// The default backend: keeps nothing.
///
/// Loads an empty cache and drops every flush, warning each time so an
/// operator notices when long-term state silently is not configured.
#[derive(Debug, Default)]
pub struct NullStateBackend;

impl StateBackend for NullStateBackend {
    fn load_all(&self) -> anyhow::Result<StateCache> {
        warn!(
            target: "taskplane.state",
            "no state backend configured; starting with empty state"
        );
        Ok(StateCache::new())
    }

    fn persist(&self, _cache: &StateCache) -> anyhow::Result<()> {
        warn!(
            target: "taskplane.state",
            "no state backend configured; state was not persisted"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

// ---------------------------------------------------------------------------
// FileStateBackend
// ---------------------------------------------------------------------------

/// A JSON-file backend.
///
/// The whole cache is stored as one pretty-printed JSON document.  A missing
/// file loads as an empty cache; parent directories are created on flush.
#[derive(Debug)]
pub struct FileStateBackend {
    path: PathBuf,
}

impl FileStateBackend {
    /// Create a backend rooted at the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file path this backend reads and writes.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl StateBackend for FileStateBackend {
    fn load_all(&self) -> anyhow::Result<StateCache> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StateCache::new()),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("read state from {}", self.path.display())));
            }
        };
        let cache: StateCache = serde_json::from_str(&json)
            .with_context(|| format!("parse state file {}", self.path.display()))?;
        Ok(cache)
    }

    fn persist(&self, cache: &StateCache) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create state dir {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(cache)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("write state to {}", self.path.display()))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// In-memory state cache over a pluggable backend.
///
/// Read-through on construction; all reads and writes copy.
pub struct StateStore {
    backend: Box<dyn StateBackend>,
    cache: StateCache,
}

impl StateStore {
    /// Create a store over the given backend, loading the cache immediately.
    ///
    /// A backend load failure is logged and treated as an empty cache so an
    /// engine can always be constructed; use [`reload`](Self::reload) when
    /// the failure must be surfaced.
    pub fn new(backend: impl StateBackend + 'static) -> Self {
        let backend = Box::new(backend);
        let cache = match backend.load_all() {
            Ok(cache) => cache,
            Err(error) => {
                warn!(
                    target: "taskplane.state",
                    backend = %backend.name(),
                    %error,
                    "failed to load state; starting with empty cache"
                );
                StateCache::new()
            }
        };
        Self { backend, cache }
    }

    /// Re-load the cache from the backend, replacing the in-memory view.
    ///
    /// # Errors
    ///
    /// Returns the backend's load error; the cache is left unchanged on
    /// failure.
    pub fn reload(&mut self) -> anyhow::Result<()> {
        self.cache = self.backend.load_all()?;
        Ok(())
    }

    /// Return a defensive copy of one object's state (empty when absent).
    #[must_use]
    pub fn get_object_state(&self, object_identifier: &str) -> ObjectState {
        self.cache.get(object_identifier).cloned().unwrap_or_default()
    }

    /// Store a defensive copy of one object's state.
    pub fn save_object_state(&mut self, object_identifier: impl Into<String>, data: ObjectState) {
        self.cache.insert(object_identifier.into(), data);
    }

    /// Number of objects with cached state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns `true` when no object state is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Flush the whole cache to the backend.
    ///
    /// # Errors
    ///
    /// Returns the backend's persist error.
    pub fn persist_all_state(&self) -> anyhow::Result<()> {
        self.backend.persist(&self.cache)
    }

    /// Name of the configured backend.
    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(NullStateBackend)
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("backend", &self.backend.name())
            .field("objects", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_store_is_empty_and_flushes_nowhere() {
        let store = StateStore::default();
        assert!(store.is_empty());
        assert_eq!(store.backend_name(), "null");
        store.persist_all_state().unwrap();
    }

    #[test]
    fn get_object_state_returns_a_defensive_copy() {
        let mut store = StateStore::default();
        let mut state = ObjectState::new();
        state.insert("replicas".to_string(), serde_json::json!(3));
        store.save_object_state("t1", state);

        let mut copy = store.get_object_state("t1");
        copy.insert("replicas".to_string(), serde_json::json!(99));
        assert_eq!(
            store.get_object_state("t1").get("replicas"),
            Some(&serde_json::json!(3))
        );
        assert!(store.get_object_state("missing").is_empty());
    }
}
