// SPDX-License-Identifier: MIT OR Apache-2.0
//! Manifest normalization and ingestion.
//!
//! Manifests arrive as already-parsed JSON-shaped mappings (the file loading
//! itself lives with the host application).  This module lifts a manifest's
//! `metadata` into [`Identifier`] values, extracts dependency references and
//! annotations, and provides the key-lowercasing normalization applied at
//! [`Task`](crate::Task) construction.
//!
//! Ingestion is forgiving by contract: entries that do not have the expected
//! shape are caller data and are skipped with a debug log, never an error.

use crate::context::{IdentifierContext, IdentifierContexts};
use crate::identifier::{Identifier, IdentifierType, Identifiers};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

// ---------------------------------------------------------------------------
// Manifest envelope
// ---------------------------------------------------------------------------

/// The outer shape of a manifest document.
///
/// `kind` and `version` are required; `metadata` and `spec` are optional
/// nested mappings that stay opaque at this level (`metadata` is interpreted
/// by the ingestion functions below, `spec` only by task processors).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Manifest {
    /// Task kind, matched against registered processor kinds.
    pub kind: String,
    /// Kind version, matched against a processor's supported versions.
    pub version: String,
    /// Identifier, dependency, and annotation metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Processor-defined payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<serde_json::Value>,
}

/// JSON Schema for the manifest envelope, for host-side tooling.
#[must_use]
pub fn manifest_schema() -> schemars::Schema {
    schemars::schema_for!(Manifest)
}

// ---------------------------------------------------------------------------
// Key normalization
// ---------------------------------------------------------------------------

/// Lower-case every key of a JSON mapping, recursing into nested mappings.
///
/// Arrays are carried over untouched, so mappings *inside* arrays (identifier
/// entries, dependency references) keep their spelling — the ingestion
/// functions rely on that.  Non-mapping inputs are returned unchanged.
/// The function is idempotent.
#[must_use]
pub fn keys_to_lower(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut lowered = serde_json::Map::new();
            for (key, entry) in map {
                let entry = if entry.is_object() {
                    keys_to_lower(entry)
                } else {
                    entry.clone()
                };
                lowered.insert(key.to_lowercase(), entry);
            }
            serde_json::Value::Object(lowered)
        }
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// Entry shapes
// ---------------------------------------------------------------------------

/// A `metadata.identifiers[]` entry.  Either `value` or `val` is accepted;
/// `value` wins when both are present.
#[derive(Debug, Deserialize)]
struct IdentifierEntry {
    #[serde(rename = "type")]
    identifier_type: String,
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    val: Option<String>,
}

impl IdentifierEntry {
    fn effective_value(self) -> (String, String, Option<String>) {
        let value = self.value.or(self.val);
        (self.identifier_type, self.key, value)
    }
}

/// A `contexts[]` entry inside a contextual identifier.
#[derive(Debug, Deserialize)]
struct ContextEntry {
    #[serde(rename = "type")]
    context_type: String,
    names: Vec<String>,
}

/// A `metadata.contextualIdentifiers[]` entry.
#[derive(Debug, Deserialize)]
struct ContextualIdentifierEntry {
    #[serde(rename = "type")]
    identifier_type: String,
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    val: Option<String>,
    #[serde(default)]
    contexts: Vec<serde_json::Value>,
}

/// A `metadata.dependencies[]` entry.
#[derive(Debug, Deserialize)]
struct DependencyEntry {
    #[serde(rename = "identifierType")]
    identifier_type: String,
    identifiers: Vec<serde_json::Value>,
}

/// A single reference inside a dependency entry.
#[derive(Debug, Deserialize)]
struct DependencyReference {
    key: String,
    #[serde(default)]
    value: Option<String>,
}

fn entries(metadata: &serde_json::Value, field: &str) -> Vec<serde_json::Value> {
    metadata
        .get(field)
        .and_then(serde_json::Value::as_array)
        .cloned()
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Identifier builders
// ---------------------------------------------------------------------------

/// Lift `metadata.identifiers[]` into unscoped identifiers, seeded with
/// `current`.
///
/// Malformed entries are skipped; duplicates are dropped by content hash.
#[must_use]
pub fn build_non_contextual_identifiers(
    metadata: &serde_json::Value,
    current: Identifiers,
) -> Identifiers {
    let mut identifiers = current;
    for entry in entries(metadata, "identifiers") {
        match serde_json::from_value::<IdentifierEntry>(entry) {
            Ok(parsed) => {
                let (identifier_type, key, value) = parsed.effective_value();
                identifiers.add(
                    Identifier::new(IdentifierType::from(identifier_type), key)
                        .with_optional_value(value),
                );
            }
            Err(error) => {
                debug!(target: "taskplane.manifest", %error, "skipping malformed identifier entry");
            }
        }
    }
    identifiers
}

/// Lift `metadata.contextualIdentifiers[]` into scoped identifiers, seeded
/// with `current`.
///
/// Each `contexts[]` entry of `{type, names[]}` expands into one
/// [`IdentifierContext`] per name; malformed context entries are skipped
/// individually.
#[must_use]
pub fn build_contextual_identifiers(
    metadata: &serde_json::Value,
    current: Identifiers,
) -> Identifiers {
    let mut identifiers = current;
    for entry in entries(metadata, "contextualIdentifiers") {
        match serde_json::from_value::<ContextualIdentifierEntry>(entry) {
            Ok(parsed) => {
                let mut contexts = IdentifierContexts::new();
                for context_entry in parsed.contexts {
                    match serde_json::from_value::<ContextEntry>(context_entry) {
                        Ok(context) => {
                            for name in context.names {
                                contexts.add(IdentifierContext::new(&context.context_type, name));
                            }
                        }
                        Err(error) => {
                            debug!(
                                target: "taskplane.manifest",
                                %error,
                                "skipping malformed context entry"
                            );
                        }
                    }
                }
                let value = parsed.value.or(parsed.val);
                identifiers.add(
                    Identifier::new(IdentifierType::from(parsed.identifier_type), parsed.key)
                        .with_optional_value(value)
                        .with_contexts(contexts),
                );
            }
            Err(error) => {
                debug!(
                    target: "taskplane.manifest",
                    %error,
                    "skipping malformed contextual identifier entry"
                );
            }
        }
    }
    identifiers
}

// ---------------------------------------------------------------------------
// Dependencies and annotations
// ---------------------------------------------------------------------------

/// Extract dependency identifiers from `metadata.dependencies[]`.
///
/// Only `ManifestName` and `Label` reference types are recognised; a `Label`
/// reference without a `value` is malformed and skipped.
#[must_use]
pub fn build_dependency_identifiers(metadata: &serde_json::Value) -> Vec<Identifier> {
    let mut dependencies = Vec::new();
    for entry in entries(metadata, "dependencies") {
        let parsed = match serde_json::from_value::<DependencyEntry>(entry) {
            Ok(parsed) => parsed,
            Err(error) => {
                debug!(target: "taskplane.manifest", %error, "skipping malformed dependency entry");
                continue;
            }
        };
        for reference in parsed.identifiers {
            let reference = match serde_json::from_value::<DependencyReference>(reference) {
                Ok(reference) => reference,
                Err(error) => {
                    debug!(
                        target: "taskplane.manifest",
                        %error,
                        "skipping malformed dependency reference"
                    );
                    continue;
                }
            };
            match parsed.identifier_type.as_str() {
                "ManifestName" => {
                    dependencies.push(Identifier::new(IdentifierType::ManifestName, reference.key));
                }
                "Label" => match reference.value {
                    Some(value) => dependencies.push(
                        Identifier::new(IdentifierType::Label, reference.key).with_value(value),
                    ),
                    None => {
                        debug!(
                            target: "taskplane.manifest",
                            key = %reference.key,
                            "skipping label dependency reference without a value"
                        );
                    }
                },
                other => {
                    debug!(
                        target: "taskplane.manifest",
                        identifier_type = %other,
                        "skipping dependency entry with unsupported identifier type"
                    );
                }
            }
        }
    }
    dependencies
}

/// Copy `metadata.annotations` into a string map, stringifying non-string
/// values.
#[must_use]
pub fn build_annotations(metadata: &serde_json::Value) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    if let Some(map) = metadata.get("annotations").and_then(serde_json::Value::as_object) {
        for (key, value) in map {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            annotations.insert(key.clone(), rendered);
        }
    }
    annotations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_to_lower_recurses_into_mappings_but_not_arrays() {
        let value = serde_json::json!({
            "Annotations": {"Contact": "ops"},
            "Identifiers": [{"Type": "ManifestName", "Key": "t1"}],
        });
        let lowered = keys_to_lower(&value);
        assert!(lowered.get("annotations").is_some());
        assert_eq!(lowered["annotations"]["contact"], "ops");
        // Array entries keep their original spelling.
        assert_eq!(lowered["identifiers"][0]["Type"], "ManifestName");
    }

    #[test]
    fn keys_to_lower_is_idempotent() {
        let value = serde_json::json!({"A": {"B": {"C": 1}}, "d": [{"E": 2}]});
        let once = keys_to_lower(&value);
        let twice = keys_to_lower(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn non_contextual_builder_accepts_val_and_value_spellings() {
        let metadata = serde_json::json!({
            "identifiers": [
                {"type": "ManifestName", "key": "t1"},
                {"type": "Label", "key": "env", "val": "prod"},
                {"type": "Label", "key": "tier", "value": "web", "val": "ignored"},
            ]
        });
        let identifiers = build_non_contextual_identifiers(&metadata, Identifiers::new());
        assert_eq!(identifiers.len(), 3);
        assert!(identifiers.matches_any_context(
            &IdentifierType::Label,
            "env",
            Some("prod"),
            &IdentifierContexts::new()
        ));
        // `value` wins over `val`.
        assert!(identifiers.matches_any_context(
            &IdentifierType::Label,
            "tier",
            Some("web"),
            &IdentifierContexts::new()
        ));
    }

    #[test]
    fn non_contextual_builder_skips_malformed_entries() {
        let metadata = serde_json::json!({
            "identifiers": [
                {"type": "ManifestName"},
                {"key": "orphan"},
                "not-a-mapping",
                {"type": "ManifestName", "key": "kept"},
            ]
        });
        let identifiers = build_non_contextual_identifiers(&metadata, Identifiers::new());
        assert_eq!(identifiers.len(), 1);
    }

    #[test]
    fn contextual_builder_expands_names_into_contexts() {
        let metadata = serde_json::json!({
            "contextualIdentifiers": [{
                "type": "ExecutionScope",
                "key": "INCLUDE",
                "contexts": [
                    {"type": "Environment", "names": ["sandbox", "test"]},
                    {"type": "Command", "names": ["apply"]},
                ]
            }]
        });
        let identifiers = build_contextual_identifiers(&metadata, Identifiers::new());
        assert_eq!(identifiers.len(), 1);
        let identifier = identifiers.iter().next().unwrap();
        assert!(identifier.is_contextual());
        assert_eq!(identifier.contexts().len(), 3);
        assert!(identifier.contexts().contains(&IdentifierContext::new("Environment", "test")));
        assert!(identifier.contexts().contains(&IdentifierContext::new("Command", "apply")));
    }

    #[test]
    fn contextual_builder_seeds_from_current_identifiers() {
        let metadata = serde_json::json!({
            "identifiers": [{"type": "ManifestName", "key": "t1"}],
            "contextualIdentifiers": [{
                "type": "ExecutionScope",
                "key": "EXCLUDE",
                "contexts": [{"type": "Command", "names": ["delete"]}],
            }]
        });
        let seeded = build_contextual_identifiers(
            &metadata,
            build_non_contextual_identifiers(&metadata, Identifiers::new()),
        );
        assert_eq!(seeded.len(), 2);
    }

    #[test]
    fn dependency_builder_recognises_names_and_labels() {
        let metadata = serde_json::json!({
            "dependencies": [
                {"identifierType": "ManifestName", "identifiers": [{"key": "t1"}, {"key": "t2"}]},
                {"identifierType": "Label", "identifiers": [
                    {"key": "env", "value": "prod"},
                    {"key": "missing-value"},
                ]},
                {"identifierType": "TeamOwner", "identifiers": [{"key": "ignored"}]},
            ]
        });
        let dependencies = build_dependency_identifiers(&metadata);
        assert_eq!(dependencies.len(), 3);
        assert_eq!(*dependencies[0].identifier_type(), IdentifierType::ManifestName);
        assert_eq!(dependencies[0].key(), "t1");
        assert_eq!(dependencies[1].key(), "t2");
        assert_eq!(*dependencies[2].identifier_type(), IdentifierType::Label);
        assert_eq!(dependencies[2].value(), Some("prod"));
    }

    #[test]
    fn annotations_are_stringified() {
        let metadata = serde_json::json!({
            "annotations": {"contact": "ops@example.com", "retries": 3, "critical": true}
        });
        let annotations = build_annotations(&metadata);
        assert_eq!(annotations.get("contact").map(String::as_str), Some("ops@example.com"));
        assert_eq!(annotations.get("retries").map(String::as_str), Some("3"));
        assert_eq!(annotations.get("critical").map(String::as_str), Some("true"));
    }

    #[test]
    fn manifest_schema_names_required_fields() {
        let schema = manifest_schema();
        let schema = serde_json::to_value(&schema).unwrap();
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&serde_json::json!("kind")));
        assert!(required.contains(&serde_json::json!("version")));
    }
}
