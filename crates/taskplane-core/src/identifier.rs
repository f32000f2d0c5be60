// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed identifiers.
//!
//! An [`Identifier`] is a `(type, key, value?, contexts)` tuple used both to
//! select tasks and to express dependencies.  Three types carry first-class
//! engine semantics ([`IdentifierType::ManifestName`],
//! [`IdentifierType::Label`], [`IdentifierType::ExecutionScope`]); anything
//! else is opaque and forwarded to task processors untouched.

use crate::context::{IdentifierContext, IdentifierContexts};
use std::fmt;

// ---------------------------------------------------------------------------
// IdentifierType
// ---------------------------------------------------------------------------

/// The closed set of identifier types the engine understands, plus a
/// catch-all for processor-defined types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentifierType {
    /// The stable human name of a manifest; no value, no contexts.
    ManifestName,
    /// A `(key, value)` label pair; no contexts.
    Label,
    /// A scope marker whose contexts declare the applicable commands and
    /// environments.
    ExecutionScope,
    /// Any other type; opaque to the engine.
    Custom(String),
}

impl IdentifierType {
    /// Returns the manifest string form of this type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ManifestName => "ManifestName",
            Self::Label => "Label",
            Self::ExecutionScope => "ExecutionScope",
            Self::Custom(other) => other,
        }
    }
}

impl fmt::Display for IdentifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for IdentifierType {
    fn from(value: &str) -> Self {
        match value {
            "ManifestName" => Self::ManifestName,
            "Label" => Self::Label,
            "ExecutionScope" => Self::ExecutionScope,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for IdentifierType {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// The key of a processing-scope identifier produced by
/// [`Identifier::processing_scope`].
pub const PROCESSING_SCOPE_KEY: &str = "processing";

/// A typed, optionally scoped name.
///
/// Immutable after construction; the builder-style constructors recompute
/// the content hash on every change.
#[derive(Debug, Clone)]
pub struct Identifier {
    identifier_type: IdentifierType,
    key: String,
    value: Option<String>,
    contexts: IdentifierContexts,
    unique_id: String,
}

impl Identifier {
    /// Create an unscoped identifier without a value.
    #[must_use]
    pub fn new(identifier_type: IdentifierType, key: impl Into<String>) -> Self {
        let mut identifier = Self {
            identifier_type,
            key: key.into(),
            value: None,
            contexts: IdentifierContexts::new(),
            unique_id: String::new(),
        };
        identifier.recompute_unique_id();
        identifier
    }

    /// Attach a value, returning the updated identifier.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self.recompute_unique_id();
        self
    }

    /// Attach an optional value, returning the updated identifier.
    #[must_use]
    pub fn with_optional_value(mut self, value: Option<String>) -> Self {
        self.value = value;
        self.recompute_unique_id();
        self
    }

    /// Attach contexts, returning the updated identifier.
    #[must_use]
    pub fn with_contexts(mut self, contexts: IdentifierContexts) -> Self {
        self.contexts = contexts;
        self.recompute_unique_id();
        self
    }

    /// Build the processing-scope target identifier for a `(command,
    /// environment)` pair.
    ///
    /// This is the identifier the planner and dispatcher evaluate task
    /// execution scopes against.
    #[must_use]
    pub fn processing_scope(command: &str, environment: &str) -> Self {
        let contexts: IdentifierContexts = [
            IdentifierContext::new("Environment", environment),
            IdentifierContext::new("Command", command),
        ]
        .into_iter()
        .collect();
        Self::new(IdentifierType::ExecutionScope, PROCESSING_SCOPE_KEY).with_contexts(contexts)
    }

    /// Returns the identifier type.
    #[must_use]
    pub fn identifier_type(&self) -> &IdentifierType {
        &self.identifier_type
    }

    /// Returns the key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the optional value.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Returns the contexts this identifier is scoped by.
    #[must_use]
    pub fn contexts(&self) -> &IdentifierContexts {
        &self.contexts
    }

    /// Returns `true` when at least one context is attached.
    #[must_use]
    pub fn is_contextual(&self) -> bool {
        !self.contexts.is_empty()
    }

    /// Returns `true` when this is the `ExecutionScope/processing` target
    /// shape produced by [`Identifier::processing_scope`].
    #[must_use]
    pub fn is_processing_scope(&self) -> bool {
        self.identifier_type == IdentifierType::ExecutionScope && self.key == PROCESSING_SCOPE_KEY
    }

    /// Content hash used for de-duplication on insert.
    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Returns `true` when this identifier has the given `(type, key, value)`
    /// and is either unscoped or shares at least one context with
    /// `target_contexts`.
    #[must_use]
    pub fn matches_any_context(
        &self,
        identifier_type: &IdentifierType,
        key: &str,
        value: Option<&str>,
        target_contexts: &IdentifierContexts,
    ) -> bool {
        if self.identifier_type != *identifier_type || self.key != key || self.value.as_deref() != value {
            return false;
        }
        if self.contexts.is_empty() {
            // Not context bound, so the given contexts do not matter.
            return true;
        }
        self.contexts.shares_any_with(target_contexts)
    }

    fn recompute_unique_id(&mut self) {
        let mut data = serde_json::Map::new();
        data.insert(
            "type".to_string(),
            serde_json::Value::String(self.identifier_type.as_str().to_string()),
        );
        data.insert("key".to_string(), serde_json::Value::String(self.key.clone()));
        if let Some(value) = &self.value {
            data.insert("value".to_string(), serde_json::Value::String(value.clone()));
        }
        data.insert("contexts".to_string(), self.contexts.to_value());
        self.unique_id = crate::hash_value(&serde_json::Value::Object(data));
    }
}

impl PartialEq for Identifier {
    /// Scope-aware equality: same type, key, and value, with contexts
    /// matching when both are empty or when at least one context of the
    /// candidate is contained in this identifier.
    fn eq(&self, other: &Self) -> bool {
        if self.identifier_type != other.identifier_type
            || self.key != other.key
            || self.value != other.value
        {
            return false;
        }
        if self.contexts.is_empty() && other.contexts.is_empty() {
            return true;
        }
        self.contexts.shares_any_with(&other.contexts)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.identifier_type, self.key)?;
        if let Some(value) = &self.value {
            write!(f, "={value}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Ordered, de-duplicated collection of [`Identifier`] keyed by content hash.
#[derive(Debug, Clone, Default)]
pub struct Identifiers {
    identifiers: Vec<Identifier>,
}

impl Identifiers {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an identifier, dropping it when one with the same content hash
    /// is already present.
    pub fn add(&mut self, identifier: Identifier) {
        if self
            .identifiers
            .iter()
            .any(|existing| existing.unique_id() == identifier.unique_id())
        {
            return;
        }
        self.identifiers.push(identifier);
    }

    /// Equality-based membership test (scope-aware, see [`Identifier`] `eq`).
    #[must_use]
    pub fn found(&self, identifier: &Identifier) -> bool {
        self.identifiers.iter().any(|local| local == identifier)
    }

    /// Returns `true` when any member matches the `(type, key, value)` and
    /// is unscoped or shares a context with `target_contexts`.
    #[must_use]
    pub fn matches_any_context(
        &self,
        identifier_type: &IdentifierType,
        key: &str,
        value: Option<&str>,
        target_contexts: &IdentifierContexts,
    ) -> bool {
        self.identifiers
            .iter()
            .any(|local| local.matches_any_context(identifier_type, key, value, target_contexts))
    }

    /// Number of identifiers in the collection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    /// Returns `true` when the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    /// Iterate the identifiers in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Identifier> {
        self.identifiers.iter()
    }

    /// Export the collection back to the manifest `metadata` mapping shape:
    /// unscoped members under `identifiers`, scoped members under
    /// `contextualIdentifiers` with their contexts grouped by type.
    #[must_use]
    pub fn to_metadata(&self) -> serde_json::Value {
        let mut plain = Vec::new();
        let mut contextual = Vec::new();

        for identifier in &self.identifiers {
            let mut item = serde_json::Map::new();
            item.insert(
                "type".to_string(),
                serde_json::Value::String(identifier.identifier_type().as_str().to_string()),
            );
            item.insert(
                "key".to_string(),
                serde_json::Value::String(identifier.key().to_string()),
            );
            if let Some(value) = identifier.value() {
                item.insert("val".to_string(), serde_json::Value::String(value.to_string()));
            }

            if identifier.is_contextual() {
                // Group context names by context type, preserving first-seen
                // type order.
                let mut types: Vec<(String, Vec<String>)> = Vec::new();
                for context in identifier.contexts() {
                    match types.iter_mut().find(|(t, _)| t == context.context_type()) {
                        Some((_, names)) => names.push(context.context_name().to_string()),
                        None => types.push((
                            context.context_type().to_string(),
                            vec![context.context_name().to_string()],
                        )),
                    }
                }
                let contexts: Vec<serde_json::Value> = types
                    .into_iter()
                    .map(|(context_type, names)| {
                        serde_json::json!({"type": context_type, "names": names})
                    })
                    .collect();
                item.insert("contexts".to_string(), serde_json::Value::Array(contexts));
                contextual.push(serde_json::Value::Object(item));
            } else {
                plain.push(serde_json::Value::Object(item));
            }
        }

        let mut metadata = serde_json::Map::new();
        if !plain.is_empty() {
            metadata.insert("identifiers".to_string(), serde_json::Value::Array(plain));
        }
        if !contextual.is_empty() {
            metadata.insert(
                "contextualIdentifiers".to_string(),
                serde_json::Value::Array(contextual),
            );
        }
        serde_json::Value::Object(metadata)
    }
}

impl FromIterator<Identifier> for Identifiers {
    fn from_iter<I: IntoIterator<Item = Identifier>>(iter: I) -> Self {
        let mut identifiers = Self::new();
        for identifier in iter {
            identifiers.add(identifier);
        }
        identifiers
    }
}

impl<'a> IntoIterator for &'a Identifiers {
    type Item = &'a Identifier;
    type IntoIter = std::slice::Iter<'a, Identifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
