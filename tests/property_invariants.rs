// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cross-crate properties: every plan over a random acyclic dependency
//! graph is a duplicate-free topological ordering, whatever the insertion
//! order.

use proptest::prelude::*;
use taskplane::{Engine, Identifier, KeyValueStore, StateStore, Task, TaskProcessor};

struct NoopProcessor {
    versions: Vec<String>,
}

impl NoopProcessor {
    fn new() -> Self {
        Self {
            versions: vec!["v1".to_string()],
        }
    }
}

impl TaskProcessor for NoopProcessor {
    fn kind(&self) -> &str {
        "P1"
    }

    fn versions(&self) -> &[String] {
        &self.versions
    }

    fn process_task(
        &self,
        _task: &Task,
        _command: &str,
        _context: &str,
        key_value_store: KeyValueStore,
        _state: &mut StateStore,
    ) -> anyhow::Result<KeyValueStore> {
        Ok(key_value_store)
    }
}

fn task_with_dependencies(index: usize, dependency_indices: &[usize]) -> Task {
    let mut metadata = serde_json::json!({
        "identifiers": [{"type": "ManifestName", "key": format!("t{index}")}],
    });
    if !dependency_indices.is_empty() {
        let references: Vec<serde_json::Value> = dependency_indices
            .iter()
            .map(|dep| serde_json::json!({"key": format!("t{dep}")}))
            .collect();
        metadata["dependencies"] = serde_json::json!([
            {"identifierType": "ManifestName", "identifiers": references},
        ]);
    }
    Task::new("P1", "v1", serde_json::json!({}), metadata)
}

/// Random DAG: task `i` may depend only on tasks with smaller indices, so
/// the graph is acyclic by construction.  Insertion order is shuffled
/// independently of the edges.
fn arb_dag() -> impl Strategy<Value = (Vec<Vec<bool>>, Vec<usize>)> {
    (2..8usize).prop_flat_map(|n| {
        let edges = proptest::collection::vec(proptest::collection::vec(any::<bool>(), n), n);
        let insertion = Just((0..n).collect::<Vec<usize>>()).prop_shuffle();
        (edges, insertion)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn plans_are_duplicate_free_topological_orderings((edges, insertion) in arb_dag()) {
        let n = edges.len();
        let mut engine = Engine::new();
        engine.register_task_processor(NoopProcessor::new());
        for &index in &insertion {
            let dependency_indices: Vec<usize> =
                (0..index).filter(|&j| edges[index][j]).collect();
            engine
                .add_task(task_with_dependencies(index, &dependency_indices))
                .unwrap();
        }

        let plan = engine
            .calculate_current_task_order(&Identifier::processing_scope("apply", "default"))
            .unwrap();

        // Complete and duplicate-free.
        prop_assert_eq!(plan.len(), n);
        let mut sorted = plan.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(sorted.len(), n);

        // Every dependency precedes its dependent.
        let position = |name: &str| plan.iter().position(|id| id == name).unwrap();
        for (index, row) in edges.iter().enumerate() {
            for j in 0..index {
                if row[j] {
                    prop_assert!(
                        position(&format!("t{j}")) < position(&format!("t{index}")),
                        "t{} must precede t{} in {:?}",
                        j,
                        index,
                        plan
                    );
                }
            }
        }
    }
}
