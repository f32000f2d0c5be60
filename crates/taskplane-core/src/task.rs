// SPDX-License-Identifier: MIT OR Apache-2.0
//! The immutable task value.
//!
//! A [`Task`] is built once from `(kind, version, spec, metadata)` and never
//! mutated afterwards: its identifiers, dependencies, checksum, and id are
//! all derived at construction.  The engine owns tasks by id; everything
//! else refers to them through ids.

use crate::context::IdentifierContexts;
use crate::identifier::{Identifier, IdentifierType, Identifiers, PROCESSING_SCOPE_KEY};
use crate::manifest::{
    Manifest, build_annotations, build_contextual_identifiers, build_dependency_identifiers,
    build_non_contextual_identifiers, keys_to_lower,
};
use crate::{ContractError, hash_value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// A declaratively described unit of work.
///
/// Value-equal after construction: two tasks built from the same inputs have
/// the same checksum and id.
#[derive(Debug, Clone)]
pub struct Task {
    kind: String,
    version: String,
    metadata: serde_json::Value,
    spec: serde_json::Value,
    identifiers: Identifiers,
    dependencies: Vec<Identifier>,
    annotations: BTreeMap<String, String>,
    checksum: String,
    id: String,
    can_be_persisted: bool,
}

impl Task {
    /// Build a task from its manifest parts.
    ///
    /// Identifiers are ingested from the metadata as provided; afterwards all
    /// mapping keys in `metadata` and `spec` are lower-cased (recursing into
    /// nested mappings, not into arrays).  Non-mapping `metadata`/`spec`
    /// values are treated as empty.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        version: impl Into<String>,
        spec: serde_json::Value,
        metadata: serde_json::Value,
    ) -> Self {
        let kind = kind.into();
        let version = version.into();

        // Identifier ingestion sees the metadata exactly as authored; the
        // lower-cased copy is what the task stores and hashes.
        let identifiers = build_contextual_identifiers(
            &metadata,
            build_non_contextual_identifiers(&metadata, Identifiers::new()),
        );
        let metadata = normalize_mapping(&metadata);
        let spec = normalize_mapping(&spec);

        let annotations = build_annotations(&metadata);
        let dependencies = build_dependency_identifiers(&metadata);
        let checksum = hash_value(&task_value(&kind, &version, &metadata, &spec));

        let named = identifiers.iter().find(|identifier| {
            !identifier.is_contextual()
                && *identifier.identifier_type() == IdentifierType::ManifestName
                && !identifier.key().is_empty()
        });
        let (id, can_be_persisted) = match named {
            Some(identifier) => (identifier.key().to_string(), true),
            None => (checksum.clone(), false),
        };
        if can_be_persisted {
            debug!(target: "taskplane.task", task_id = %id, checksum = %checksum, "task constructed");
        } else {
            warn!(
                target: "taskplane.task",
                task_id = %id,
                "task has no manifest name and cannot be persisted"
            );
        }

        Self {
            kind,
            version,
            metadata,
            spec,
            identifiers,
            dependencies,
            annotations,
            checksum,
            id,
            can_be_persisted,
        }
    }

    /// Lift a whole parsed manifest document into a task.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::InvalidManifest`] when the document is not a
    /// mapping with non-empty string `kind` and `version` fields.
    pub fn from_manifest(document: &serde_json::Value) -> Result<Self, ContractError> {
        let manifest: Manifest = serde_json::from_value(document.clone())
            .map_err(|error| ContractError::InvalidManifest {
                reason: error.to_string(),
            })?;
        if manifest.kind.is_empty() {
            return Err(ContractError::InvalidManifest {
                reason: "kind must not be empty".to_string(),
            });
        }
        if manifest.version.is_empty() {
            return Err(ContractError::InvalidManifest {
                reason: "version must not be empty".to_string(),
            });
        }
        Ok(Self::new(
            manifest.kind,
            manifest.version,
            manifest.spec.unwrap_or_else(empty_mapping),
            manifest.metadata.unwrap_or_else(empty_mapping),
        ))
    }

    /// Task kind, matched against processor kinds.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Kind version, matched against a processor's supported versions.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The lower-cased metadata mapping.
    #[must_use]
    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    /// The lower-cased spec mapping (opaque to the engine).
    #[must_use]
    pub fn spec(&self) -> &serde_json::Value {
        &self.spec
    }

    /// All identifiers ingested from the metadata.
    #[must_use]
    pub fn identifiers(&self) -> &Identifiers {
        &self.identifiers
    }

    /// Dependency identifiers in declaration order.
    #[must_use]
    pub fn dependencies(&self) -> &[Identifier] {
        &self.dependencies
    }

    /// Free-form annotations copied from the metadata.
    #[must_use]
    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    /// SHA-256 checksum over the canonical `{kind, version, metadata?, spec?}`
    /// mapping (empty sub-mappings omitted).
    #[must_use]
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// The task id: the manifest name when one exists, the checksum otherwise.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns `true` when the task has a manifest name and can therefore be
    /// keyed in long-term state.
    #[must_use]
    pub fn can_be_persisted(&self) -> bool {
        self.can_be_persisted
    }

    /// The canonical `{kind, version, metadata?, spec?}` mapping the checksum
    /// is computed over.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        task_value(&self.kind, &self.version, &self.metadata, &self.spec)
    }

    /// Returns `true` when a `ManifestName` identifier matches `name`.
    #[must_use]
    pub fn match_name(&self, name: &str) -> bool {
        self.identifiers.matches_any_context(
            &IdentifierType::ManifestName,
            name,
            None,
            &IdentifierContexts::new(),
        )
    }

    /// Returns `true` when a `Label` identifier matches `(key, value)`.
    #[must_use]
    pub fn match_label(&self, key: &str, value: &str) -> bool {
        self.identifiers.matches_any_context(
            &IdentifierType::Label,
            key,
            Some(value),
            &IdentifierContexts::new(),
        )
    }

    /// Evaluate this task's execution scope against a processing target.
    ///
    /// A target that is not the `ExecutionScope/processing` shape imposes no
    /// scope filter and every task qualifies.  Otherwise the task's own
    /// `ExecutionScope` identifiers are evaluated: any `EXCLUDE` naming the
    /// target's command or environment disqualifies; `INCLUDE` constraints
    /// collect required command and environment names that the target must
    /// then satisfy.  Exclusion dominates inclusion.
    #[must_use]
    pub fn qualifies_for_processing(&self, target: &Identifier) -> bool {
        if !target.is_processing_scope() {
            return true;
        }

        let mut command = None;
        let mut environment = None;
        for context in target.contexts() {
            match context.context_type() {
                "Command" => command = Some(context.context_name()),
                "Environment" => environment = Some(context.context_name()),
                _ => {}
            }
        }

        let mut qualifies = true;
        let mut required_commands: Vec<&str> = Vec::new();
        let mut required_environments: Vec<&str> = Vec::new();
        for identifier in &self.identifiers {
            if *identifier.identifier_type() != IdentifierType::ExecutionScope {
                continue;
            }
            match identifier.key() {
                "EXCLUDE" => {
                    for context in identifier.contexts() {
                        match context.context_type() {
                            "Command" if Some(context.context_name()) == command => {
                                qualifies = false;
                                info!(
                                    target: "taskplane.task",
                                    task_id = %self.id,
                                    command = %context.context_name(),
                                    "task disqualified by explicit command exclusion"
                                );
                            }
                            "Environment" if Some(context.context_name()) == environment => {
                                qualifies = false;
                                info!(
                                    target: "taskplane.task",
                                    task_id = %self.id,
                                    environment = %context.context_name(),
                                    "task disqualified by explicit environment exclusion"
                                );
                            }
                            _ => {}
                        }
                    }
                }
                "INCLUDE" => {
                    for context in identifier.contexts() {
                        match context.context_type() {
                            "Command" => required_commands.push(context.context_name()),
                            "Environment" => required_environments.push(context.context_name()),
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        if qualifies {
            if !required_commands.is_empty()
                && !command.is_some_and(|name| required_commands.contains(&name))
            {
                qualifies = false;
                info!(
                    target: "taskplane.task",
                    task_id = %self.id,
                    command = command.unwrap_or("<none>"),
                    "task disqualified: command not in its inclusion scope"
                );
            }
            if !required_environments.is_empty()
                && !environment.is_some_and(|name| required_environments.contains(&name))
            {
                qualifies = false;
                info!(
                    target: "taskplane.task",
                    task_id = %self.id,
                    environment = environment.unwrap_or("<none>"),
                    "task disqualified: environment not in its inclusion scope"
                );
            }
        }

        qualifies
    }

    /// Match this task against a name or label identifier, or — when handed a
    /// processing-scope identifier — delegate to
    /// [`qualifies_for_processing`](Self::qualifies_for_processing).
    ///
    /// Name and label matching walks this task's non-scope identifiers of the
    /// given identifier's type.  When the given identifier is unscoped, the
    /// first such identifier decides the outcome, positively or negatively;
    /// when it carries contexts, a basic `(key[, value])` match additionally
    /// requires at least one shared context.
    #[must_use]
    pub fn match_name_or_label_identifier(&self, identifier: &Identifier) -> bool {
        if identifier.is_processing_scope() {
            return self.qualifies_for_processing(identifier);
        }
        if !matches!(
            identifier.identifier_type(),
            IdentifierType::ManifestName | IdentifierType::Label
        ) {
            return false;
        }

        for task_identifier in &self.identifiers {
            if *task_identifier.identifier_type() == IdentifierType::ExecutionScope
                || task_identifier.key() == PROCESSING_SCOPE_KEY
            {
                continue;
            }
            if task_identifier.identifier_type() != identifier.identifier_type() {
                continue;
            }
            let basic_match = match identifier.identifier_type() {
                IdentifierType::ManifestName => task_identifier.key() == identifier.key(),
                IdentifierType::Label => {
                    task_identifier.key() == identifier.key()
                        && task_identifier.value() == identifier.value()
                }
                _ => false,
            };
            if identifier.contexts().is_empty() {
                // The first identifier of the queried type settles it.
                return basic_match;
            }
            if basic_match
                && task_identifier.contexts().shares_any_with(identifier.contexts())
            {
                return true;
            }
        }
        false
    }
}

fn empty_mapping() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn normalize_mapping(value: &serde_json::Value) -> serde_json::Value {
    if value.is_object() {
        keys_to_lower(value)
    } else {
        empty_mapping()
    }
}

fn task_value(
    kind: &str,
    version: &str,
    metadata: &serde_json::Value,
    spec: &serde_json::Value,
) -> serde_json::Value {
    let mut data = serde_json::Map::new();
    data.insert("kind".to_string(), serde_json::Value::String(kind.to_string()));
    data.insert(
        "version".to_string(),
        serde_json::Value::String(version.to_string()),
    );
    if metadata.as_object().is_some_and(|map| !map.is_empty()) {
        data.insert("metadata".to_string(), metadata.clone());
    }
    if spec.as_object().is_some_and(|map| !map.is_empty()) {
        data.insert("spec".to_string(), spec.clone());
    }
    serde_json::Value::Object(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named_task(name: &str) -> Task {
        Task::new(
            "P1",
            "v1",
            serde_json::json!({"f": 1}),
            serde_json::json!({"identifiers": [{"type": "ManifestName", "key": name}]}),
        )
    }

    #[test]
    fn named_task_uses_manifest_name_as_id() {
        let task = named_task("t1");
        assert_eq!(task.id(), "t1");
        assert!(task.can_be_persisted());
        assert_ne!(task.id(), task.checksum());
    }

    #[test]
    fn unnamed_task_falls_back_to_checksum_id() {
        let task = Task::new("P1", "v1", serde_json::json!({"f": 1}), empty_mapping());
        assert_eq!(task.id(), task.checksum());
        assert!(!task.can_be_persisted());
    }

    #[test]
    fn checksum_is_deterministic_and_key_case_insensitive() {
        let a = Task::new(
            "P1",
            "v1",
            serde_json::json!({"Field": 1}),
            serde_json::json!({"Annotations": {"Contact": "ops"}}),
        );
        let b = Task::new(
            "P1",
            "v1",
            serde_json::json!({"field": 1}),
            serde_json::json!({"annotations": {"contact": "ops"}}),
        );
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn checksum_omits_empty_sub_mappings() {
        let task = Task::new("P1", "v1", empty_mapping(), empty_mapping());
        let value = task.to_value();
        assert!(value.get("metadata").is_none());
        assert!(value.get("spec").is_none());
        assert_eq!(value["kind"], "P1");
        assert_eq!(value["version"], "v1");
    }

    #[test]
    fn match_name_and_label() {
        let task = Task::new(
            "P1",
            "v1",
            empty_mapping(),
            serde_json::json!({"identifiers": [
                {"type": "ManifestName", "key": "t1"},
                {"type": "Label", "key": "env", "value": "prod"},
            ]}),
        );
        assert!(task.match_name("t1"));
        assert!(!task.match_name("t2"));
        assert!(task.match_label("env", "prod"));
        assert!(!task.match_label("env", "test"));
    }

    #[test]
    fn from_manifest_requires_kind_and_version() {
        let err = Task::from_manifest(&serde_json::json!({"version": "v1"})).unwrap_err();
        assert!(matches!(err, ContractError::InvalidManifest { .. }));
        let err = Task::from_manifest(&serde_json::json!({"kind": "", "version": "v1"}))
            .unwrap_err();
        assert!(matches!(err, ContractError::InvalidManifest { .. }));
        let task = Task::from_manifest(&serde_json::json!({
            "kind": "P1",
            "version": "v1",
            "metadata": {"identifiers": [{"type": "ManifestName", "key": "t1"}]},
            "spec": {"f": 1},
        }))
        .unwrap();
        assert_eq!(task.id(), "t1");
    }

    #[test]
    fn mutating_source_values_does_not_affect_a_built_task() {
        let mut metadata =
            serde_json::json!({"identifiers": [{"type": "ManifestName", "key": "t1"}]});
        let task = Task::new("P1", "v1", empty_mapping(), metadata.clone());
        metadata["identifiers"][0]["key"] = serde_json::json!("changed");
        assert_eq!(task.id(), "t1");
        assert!(task.match_name("t1"));
    }
}
