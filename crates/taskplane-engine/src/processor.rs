// SPDX-License-Identifier: MIT OR Apache-2.0
//! The task processor contract.
//!
//! A [`TaskProcessor`] handles one manifest kind across one or more versions.
//! The engine guards every invocation with the run-id gate in
//! [`TaskProcessor::task_pre_processing_check`], so processor bodies may
//! assume at-most-once delivery per `(task, command, context)` unless a
//! caller bypasses the check.

use crate::state::StateStore;
use taskplane_core::{KeyValueStore, Task};
use tracing::warn;

/// Run-state marker: the task is about to be attempted.
pub const RUN_STATE_PENDING: i64 = 1;
/// Run-state marker: the task was processed successfully.
pub const RUN_STATE_DONE: i64 = 2;
/// Run-state marker: the task's processor failed.
pub const RUN_STATE_FAILED: i64 = -1;

/// Build the run-id key that gates processing of one task under one
/// `(command, context)` pair.
#[must_use]
pub fn task_run_id(task_id: &str, command: &str, context: &str) -> String {
    format!("PROCESSING_TASK:{task_id}:{command}:{context}")
}

/// Handler for one manifest kind.
///
/// Implementations provide [`process_task`](Self::process_task) and identity
/// methods; the pre-processing gate is a provided method.
pub trait TaskProcessor: Send + Sync {
    /// The manifest kind this processor handles.
    fn kind(&self) -> &str;

    /// The kind versions this processor supports, in declaration order.
    fn versions(&self) -> &[String];

    /// The commands this processor understands.
    fn supported_commands(&self) -> Vec<String> {
        ["apply", "get", "delete", "describe"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Process one task.
    ///
    /// Implementations may read and write per-task state through `state`
    /// (convention: non-empty pre-existing state means "already in the
    /// desired state, skip") and must return the possibly-updated store
    /// rather than retaining references to it.
    ///
    /// # Errors
    ///
    /// A returned error is recorded in the store as [`RUN_STATE_FAILED`] by
    /// the gate and is not re-raised; the dispatcher continues with the
    /// remaining tasks.
    fn process_task(
        &self,
        task: &Task,
        command: &str,
        context: &str,
        key_value_store: KeyValueStore,
        state: &mut StateStore,
    ) -> anyhow::Result<KeyValueStore>;

    /// The run-id gate: memoize execution state and (optionally) invoke
    /// [`process_task`](Self::process_task).
    ///
    /// The gate key is `PROCESSING_TASK:<task_id>:<command>:<context>`.
    /// An unset entry is initialised to [`RUN_STATE_PENDING`]; only a
    /// pending entry triggers processing.  Success flips the entry to
    /// [`RUN_STATE_DONE`], failure to [`RUN_STATE_FAILED`] with the error
    /// swallowed.  Any other entry logs a warning and leaves the store
    /// unchanged.
    fn task_pre_processing_check(
        &self,
        task: &Task,
        command: &str,
        context: &str,
        mut key_value_store: KeyValueStore,
        call_process_task_if_check_pass: bool,
        state: &mut StateStore,
    ) -> KeyValueStore {
        let run_id = task_run_id(task.id(), command, context);
        if !key_value_store.contains_key(&run_id) {
            key_value_store.save(run_id.clone(), RUN_STATE_PENDING);
        }
        let run_state = key_value_store.get(&run_id).and_then(serde_json::Value::as_i64);
        if run_state == Some(RUN_STATE_PENDING) {
            if call_process_task_if_check_pass {
                match self.process_task(task, command, context, key_value_store.clone(), state) {
                    Ok(mut updated) => {
                        updated.save(run_id, RUN_STATE_DONE);
                        key_value_store = updated;
                    }
                    Err(error) => {
                        warn!(
                            target: "taskplane.engine",
                            task_id = %task.id(),
                            command = %command,
                            context = %context,
                            %error,
                            "task processing failed"
                        );
                        key_value_store.save(run_id, RUN_STATE_FAILED);
                    }
                }
            }
        } else {
            warn!(
                target: "taskplane.engine",
                task_id = %task.id(),
                command = %command,
                context = %context,
                "task was already previously validated or executed"
            );
        }
        key_value_store
    }
}
