// SPDX-License-Identifier: MIT OR Apache-2.0
//! Identifier contexts.
//!
//! A context is a `(type, name)` pair such as `Environment:production` or
//! `Command:apply`.  [`IdentifierContexts`] is the ordered, de-duplicated
//! collection an [`Identifier`](crate::Identifier) is scoped by; an empty
//! collection means "unscoped".

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// IdentifierContext
// ---------------------------------------------------------------------------

/// A single `(context_type, context_name)` pair.
///
/// Equality is structural on both fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentifierContext {
    context_type: String,
    context_name: String,
}

impl IdentifierContext {
    /// Create a new context pair.
    #[must_use]
    pub fn new(context_type: impl Into<String>, context_name: impl Into<String>) -> Self {
        Self {
            context_type: context_type.into(),
            context_name: context_name.into(),
        }
    }

    /// Returns the context type (e.g. `"Environment"` or `"Command"`).
    #[must_use]
    pub fn context_type(&self) -> &str {
        &self.context_type
    }

    /// Returns the context name (e.g. `"production"` or `"apply"`).
    #[must_use]
    pub fn context_name(&self) -> &str {
        &self.context_name
    }
}

impl fmt::Display for IdentifierContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.context_type, self.context_name)
    }
}

// ---------------------------------------------------------------------------
// IdentifierContexts
// ---------------------------------------------------------------------------

/// An ordered sequence of [`IdentifierContext`] with set semantics.
///
/// Duplicates are dropped on insertion.  A content hash over the serialized
/// form is recomputed on every mutation and is used by
/// [`Identifier`](crate::Identifier) de-duplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierContexts {
    contexts: Vec<IdentifierContext>,
    unique_id: String,
}

impl IdentifierContexts {
    /// Create an empty (unscoped) collection.
    #[must_use]
    pub fn new() -> Self {
        let mut contexts = Self {
            contexts: Vec::new(),
            unique_id: String::new(),
        };
        contexts.recompute_unique_id();
        contexts
    }

    /// Append a context, dropping it silently when an equal one is present.
    pub fn add(&mut self, context: IdentifierContext) {
        if self.contexts.contains(&context) {
            return;
        }
        self.contexts.push(context);
        self.recompute_unique_id();
    }

    /// Returns `true` when no contexts are present (unscoped).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Number of contexts in the collection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Returns `true` when an equal context is present.
    #[must_use]
    pub fn contains(&self, target: &IdentifierContext) -> bool {
        self.contexts.contains(target)
    }

    /// Returns `true` when at least one context is present in both collections.
    #[must_use]
    pub fn shares_any_with(&self, other: &Self) -> bool {
        other.iter().any(|context| self.contains(context))
    }

    /// Iterate the contexts in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, IdentifierContext> {
        self.contexts.iter()
    }

    /// Content hash over the serialized collection.
    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Serialized form used for hashing and manifest export.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.contexts
                .iter()
                .map(|context| {
                    serde_json::json!({
                        "type": context.context_type(),
                        "name": context.context_name(),
                    })
                })
                .collect(),
        )
    }

    fn recompute_unique_id(&mut self) {
        self.unique_id = crate::hash_value(&self.to_value());
    }
}

impl Default for IdentifierContexts {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<IdentifierContext> for IdentifierContexts {
    fn from_iter<I: IntoIterator<Item = IdentifierContext>>(iter: I) -> Self {
        let mut contexts = Self::new();
        for context in iter {
            contexts.add(context);
        }
        contexts
    }
}

impl<'a> IntoIterator for &'a IdentifierContexts {
    type Item = &'a IdentifierContext;
    type IntoIter = std::slice::Iter<'a, IdentifierContext>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_type_colon_name() {
        let context = IdentifierContext::new("Environment", "sandbox");
        assert_eq!(context.to_string(), "Environment:sandbox");
    }

    #[test]
    fn duplicates_are_dropped_on_insertion() {
        let mut contexts = IdentifierContexts::new();
        contexts.add(IdentifierContext::new("Command", "apply"));
        contexts.add(IdentifierContext::new("Command", "apply"));
        assert_eq!(contexts.len(), 1);
    }

    #[test]
    fn unique_id_changes_on_mutation() {
        let mut contexts = IdentifierContexts::new();
        let empty_id = contexts.unique_id().to_string();
        contexts.add(IdentifierContext::new("Command", "apply"));
        assert_ne!(contexts.unique_id(), empty_id);
    }

    #[test]
    fn shares_any_with_requires_an_overlap() {
        let a: IdentifierContexts = [
            IdentifierContext::new("Environment", "sandbox"),
            IdentifierContext::new("Command", "apply"),
        ]
        .into_iter()
        .collect();
        let b: IdentifierContexts = [IdentifierContext::new("Command", "apply")]
            .into_iter()
            .collect();
        let c: IdentifierContexts = [IdentifierContext::new("Command", "delete")]
            .into_iter()
            .collect();
        assert!(a.shares_any_with(&b));
        assert!(!a.shares_any_with(&c));
    }

    #[test]
    fn empty_collection_is_unscoped() {
        let contexts = IdentifierContexts::new();
        assert!(contexts.is_empty());
        assert!(!contexts.contains(&IdentifierContext::new("Command", "apply")));
    }
}
