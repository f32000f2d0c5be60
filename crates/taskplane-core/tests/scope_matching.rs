// SPDX-License-Identifier: MIT OR Apache-2.0
//! Execution-scope qualification and name/label matching.

use taskplane_core::{Identifier, IdentifierContext, IdentifierContexts, IdentifierType, Task};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn scoped_task(contextual_identifiers: serde_json::Value) -> Task {
    Task::new(
        "P1",
        "v1",
        serde_json::json!({}),
        serde_json::json!({
            "identifiers": [{"type": "ManifestName", "key": "scoped"}],
            "contextualIdentifiers": contextual_identifiers,
        }),
    )
}

fn include(contexts: serde_json::Value) -> serde_json::Value {
    serde_json::json!([{"type": "ExecutionScope", "key": "INCLUDE", "contexts": contexts}])
}

fn exclude(contexts: serde_json::Value) -> serde_json::Value {
    serde_json::json!([{"type": "ExecutionScope", "key": "EXCLUDE", "contexts": contexts}])
}

// ---------------------------------------------------------------------------
// qualifies_for_processing
// ---------------------------------------------------------------------------

#[test]
fn unscoped_task_qualifies_everywhere() {
    let task = Task::new(
        "P1",
        "v1",
        serde_json::json!({}),
        serde_json::json!({"identifiers": [{"type": "ManifestName", "key": "plain"}]}),
    );
    assert!(task.qualifies_for_processing(&Identifier::processing_scope("apply", "production")));
    assert!(task.qualifies_for_processing(&Identifier::processing_scope("delete", "sandbox")));
}

#[test]
fn non_processing_target_imposes_no_filter() {
    let task = scoped_task(include(
        serde_json::json!([{"type": "Environment", "names": ["c2"]}]),
    ));
    // A name identifier is not a processing target; everything qualifies.
    let name = Identifier::new(IdentifierType::ManifestName, "whatever");
    assert!(task.qualifies_for_processing(&name));
    // So is an ExecutionScope identifier with a different key.
    let other_scope = Identifier::new(IdentifierType::ExecutionScope, "reporting");
    assert!(task.qualifies_for_processing(&other_scope));
}

#[test]
fn environment_inclusion_excludes_other_environments() {
    let task = scoped_task(include(
        serde_json::json!([{"type": "Environment", "names": ["c2"]}]),
    ));
    assert!(task.qualifies_for_processing(&Identifier::processing_scope("apply", "c2")));
    assert!(!task.qualifies_for_processing(&Identifier::processing_scope("apply", "c1")));
}

#[test]
fn command_inclusion_excludes_other_commands() {
    let task = scoped_task(include(
        serde_json::json!([{"type": "Command", "names": ["apply", "get"]}]),
    ));
    assert!(task.qualifies_for_processing(&Identifier::processing_scope("apply", "default")));
    assert!(task.qualifies_for_processing(&Identifier::processing_scope("get", "default")));
    assert!(!task.qualifies_for_processing(&Identifier::processing_scope("delete", "default")));
}

#[test]
fn exclusion_disqualifies_named_command_and_environment() {
    let task = scoped_task(exclude(serde_json::json!([
        {"type": "Command", "names": ["delete"]},
        {"type": "Environment", "names": ["production"]},
    ])));
    assert!(!task.qualifies_for_processing(&Identifier::processing_scope("delete", "sandbox")));
    assert!(!task.qualifies_for_processing(&Identifier::processing_scope("apply", "production")));
    assert!(task.qualifies_for_processing(&Identifier::processing_scope("apply", "sandbox")));
}

#[test]
fn exclusion_dominates_inclusion() {
    let task = scoped_task(serde_json::json!([
        {"type": "ExecutionScope", "key": "INCLUDE",
         "contexts": [{"type": "Environment", "names": ["production"]}]},
        {"type": "ExecutionScope", "key": "EXCLUDE",
         "contexts": [{"type": "Command", "names": ["apply"]}]},
    ]));
    // Included environment and excluded command at once: excluded wins.
    assert!(!task.qualifies_for_processing(&Identifier::processing_scope("apply", "production")));
    assert!(task.qualifies_for_processing(&Identifier::processing_scope("get", "production")));
}

#[test]
fn inclusion_constraints_accumulate_across_identifiers() {
    let task = scoped_task(serde_json::json!([
        {"type": "ExecutionScope", "key": "INCLUDE",
         "contexts": [{"type": "Environment", "names": ["sandbox"]}]},
        {"type": "ExecutionScope", "key": "INCLUDE",
         "contexts": [{"type": "Environment", "names": ["test"]}]},
    ]));
    assert!(task.qualifies_for_processing(&Identifier::processing_scope("apply", "sandbox")));
    assert!(task.qualifies_for_processing(&Identifier::processing_scope("apply", "test")));
    assert!(!task.qualifies_for_processing(&Identifier::processing_scope("apply", "production")));
}

// ---------------------------------------------------------------------------
// match_name_or_label_identifier
// ---------------------------------------------------------------------------

fn labelled_task() -> Task {
    Task::new(
        "P1",
        "v1",
        serde_json::json!({}),
        serde_json::json!({"identifiers": [
            {"type": "ManifestName", "key": "t1"},
            {"type": "Label", "key": "env", "value": "prod"},
        ]}),
    )
}

#[test]
fn matches_by_name_and_by_label() {
    let task = labelled_task();
    assert!(task.match_name_or_label_identifier(&Identifier::new(
        IdentifierType::ManifestName,
        "t1"
    )));
    assert!(task.match_name_or_label_identifier(
        &Identifier::new(IdentifierType::Label, "env").with_value("prod")
    ));
    assert!(!task.match_name_or_label_identifier(&Identifier::new(
        IdentifierType::ManifestName,
        "t2"
    )));
    assert!(!task.match_name_or_label_identifier(
        &Identifier::new(IdentifierType::Label, "env").with_value("test")
    ));
}

#[test]
fn label_match_works_even_when_a_name_is_listed_first() {
    // Identifiers of other types are skipped; the name does not shadow the
    // label for a label query.
    let task = labelled_task();
    assert!(task.match_name_or_label_identifier(
        &Identifier::new(IdentifierType::Label, "env").with_value("prod")
    ));
}

#[test]
fn first_identifier_of_the_queried_type_decides_an_unscoped_query() {
    // For an unscoped query the first identifier of the queried type settles
    // the outcome, so a second manifest name is never reached.
    let task = Task::new(
        "P1",
        "v1",
        serde_json::json!({}),
        serde_json::json!({"identifiers": [
            {"type": "ManifestName", "key": "primary"},
            {"type": "ManifestName", "key": "alias"},
        ]}),
    );
    assert!(task.match_name_or_label_identifier(&Identifier::new(
        IdentifierType::ManifestName,
        "primary"
    )));
    assert!(!task.match_name_or_label_identifier(&Identifier::new(
        IdentifierType::ManifestName,
        "alias"
    )));
}

#[test]
fn other_identifier_types_never_match() {
    let task = labelled_task();
    assert!(!task.match_name_or_label_identifier(&Identifier::new(
        IdentifierType::Custom("TeamOwner".into()),
        "t1"
    )));
}

#[test]
fn contextual_match_requires_a_shared_context() {
    let task = Task::new(
        "P1",
        "v1",
        serde_json::json!({}),
        serde_json::json!({
            "contextualIdentifiers": [{
                "type": "Label", "key": "tier", "value": "web",
                "contexts": [{"type": "Environment", "names": ["sandbox"]}],
            }],
        }),
    );
    let sandbox: IdentifierContexts = [IdentifierContext::new("Environment", "sandbox")]
        .into_iter()
        .collect();
    let production: IdentifierContexts = [IdentifierContext::new("Environment", "production")]
        .into_iter()
        .collect();

    let matching = Identifier::new(IdentifierType::Label, "tier")
        .with_value("web")
        .with_contexts(sandbox);
    let disjoint = Identifier::new(IdentifierType::Label, "tier")
        .with_value("web")
        .with_contexts(production);

    assert!(task.match_name_or_label_identifier(&matching));
    assert!(!task.match_name_or_label_identifier(&disjoint));
}

#[test]
fn processing_target_delegates_to_scope_qualification() {
    let task = scoped_task(include(
        serde_json::json!([{"type": "Environment", "names": ["c2"]}]),
    ));
    assert!(task.match_name_or_label_identifier(&Identifier::processing_scope("apply", "c2")));
    assert!(!task.match_name_or_label_identifier(&Identifier::processing_scope("apply", "c1")));
}
