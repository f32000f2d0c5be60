// SPDX-License-Identifier: MIT OR Apache-2.0
//! taskplane-engine
//!
//! Orchestration layer.
//!
//! Responsibilities:
//! - register task processors and lifecycle hooks
//! - ingest tasks and reject duplicates at registration time
//! - plan a dependency-ordered, scope-filtered execution order
//! - drive every planned task through the lifecycle, threading the shared
//!   key/value store through hooks and processors and flushing state
//!
//! The engine is single-threaded and synchronous by design: tasks run
//! strictly in plan order on the calling thread, and determinism is part of
//! the contract.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Lifecycle hooks and their registry.
pub mod hooks;
/// The task processor contract and run-id gate.
pub mod processor;
/// Long-term state persistence.
pub mod state;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use taskplane_core::{Identifier, IdentifierType, KeyValueStore, LifecycleStage, LifecycleStageSet, Task};
use thiserror::Error;
use tracing::{debug, warn};

pub use hooks::{
    COMMAND_NOT_APPLICABLE, CONTEXT_ALL, EXTRA_EXCEPTION_MESSAGE, Hook, HookCall, HookError,
    HookExtras, HookHandler, Hooks, always_fail_handler,
};
pub use processor::{
    RUN_STATE_DONE, RUN_STATE_FAILED, RUN_STATE_PENDING, TaskProcessor, task_run_id,
};
pub use state::{FileStateBackend, NullStateBackend, ObjectState, StateBackend, StateCache, StateStore};

/// Name of the hook the engine installs to make missing processors fatal.
pub const DEFAULT_REGISTRATION_FAILURE_HOOK: &str = "default_task_registration_failure";

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Errors from the taskplane engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A task with the same id was already added.
    #[error(
        "task \"{task_id}\" was already added; use distinct manifest names to tell similar manifests apart"
    )]
    DuplicateTask {
        /// The id that collided.
        task_id: String,
    },

    /// The requested task id does not exist in the registry.
    #[error("task \"{task_id}\" not found")]
    TaskNotFound {
        /// The id that was looked up.
        task_id: String,
    },

    /// A named dependency resolved to zero registered tasks.
    #[error("dependency \"{name}\" of task \"{task_id}\" not found")]
    MissingDependency {
        /// The manifest name the dependency referenced.
        name: String,
        /// The task declaring the dependency.
        task_id: String,
    },

    /// A dependency exists but does not qualify under the current scope.
    #[error(
        "task \"{task_id}\" depends on task \"{dependency_task_id}\" which is out of scope for processing; remove the dependency or adjust the dependency's execution scope"
    )]
    OutOfScopeDependency {
        /// The task declaring the dependency.
        task_id: String,
        /// The dependency that is out of scope.
        dependency_task_id: String,
    },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle detected at task \"{task_id}\"")]
    DependencyCycle {
        /// The task at which the cycle closed.
        task_id: String,
    },

    /// A lifecycle hook's handler failed.
    #[error(
        "hook \"{hook}\" failed during command \"{command}\" in context \"{context}\" at lifecycle stage {stage}"
    )]
    HookFailed {
        /// The failing hook's name.
        hook: String,
        /// The command in play.
        command: String,
        /// The context in play.
        context: String,
        /// The numeric lifecycle stage code.
        stage: i8,
        /// The handler's error.
        #[source]
        source: HookError,
    },
}

impl EngineError {
    /// Return the stable [`ErrorCode`](taskplane_error::ErrorCode) for this
    /// error.
    #[must_use]
    pub fn error_code(&self) -> taskplane_error::ErrorCode {
        match self {
            Self::DuplicateTask { .. } => taskplane_error::ErrorCode::TaskDuplicate,
            Self::TaskNotFound { .. } => taskplane_error::ErrorCode::TaskNotFound,
            Self::MissingDependency { .. } => taskplane_error::ErrorCode::DependencyNotFound,
            Self::OutOfScopeDependency { .. } => taskplane_error::ErrorCode::DependencyOutOfScope,
            Self::DependencyCycle { .. } => taskplane_error::ErrorCode::DependencyCycle,
            Self::HookFailed { .. } => taskplane_error::ErrorCode::HookFailed,
        }
    }

    /// Convert this error into a [`ClassifiedError`](taskplane_error::ClassifiedError)
    /// carrying structured context.
    #[must_use]
    pub fn into_classified(self) -> taskplane_error::ClassifiedError {
        let code = self.error_code();
        let message = self.to_string();
        let classified = taskplane_error::ClassifiedError::new(code, message);
        match self {
            Self::DuplicateTask { task_id } | Self::TaskNotFound { task_id } => {
                classified.with_context("task_id", task_id)
            }
            Self::MissingDependency { name, task_id } => classified
                .with_context("task_id", task_id)
                .with_context("dependency", name),
            Self::OutOfScopeDependency {
                task_id,
                dependency_task_id,
            } => classified
                .with_context("task_id", task_id)
                .with_context("dependency_task_id", dependency_task_id),
            Self::DependencyCycle { task_id } => classified.with_context("task_id", task_id),
            Self::HookFailed {
                hook,
                command,
                context,
                stage,
                ..
            } => classified
                .with_context("hook", hook)
                .with_context("command", command)
                .with_context("context", context)
                .with_context("stage", i64::from(stage)),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Central orchestrator: task registry, planner, and lifecycle dispatcher.
///
/// ```
/// use taskplane_engine::Engine;
///
/// let engine = Engine::new();
/// assert_eq!(engine.task_count(), 0);
/// ```
pub struct Engine {
    tasks: Vec<Arc<Task>>,
    task_index: BTreeMap<String, usize>,
    processors: BTreeMap<String, Arc<dyn TaskProcessor>>,
    processor_index: BTreeMap<String, String>,
    key_value_store: KeyValueStore,
    hooks: Hooks,
    state: StateStore,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Create an engine with an empty store, no hooks, and the null state
    /// backend.
    #[must_use]
    pub fn new() -> Self {
        let mut engine = Self {
            tasks: Vec::new(),
            task_index: BTreeMap::new(),
            processors: BTreeMap::new(),
            processor_index: BTreeMap::new(),
            key_value_store: KeyValueStore::new(),
            hooks: Hooks::new(),
            state: StateStore::default(),
        };
        engine.install_default_hooks();
        engine
    }

    /// Replace the key/value store, returning the updated engine.
    #[must_use]
    pub fn with_key_value_store(mut self, key_value_store: KeyValueStore) -> Self {
        self.key_value_store = key_value_store;
        self
    }

    /// Replace the hook registry, returning the updated engine.
    ///
    /// The default registration-failure hook is re-installed when the given
    /// registry has nothing matching that event.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self.install_default_hooks();
        self
    }

    /// Replace the state store, returning the updated engine.
    #[must_use]
    pub fn with_state_store(mut self, state: StateStore) -> Self {
        self.state = state;
        self
    }

    /// The engine's current key/value store.
    #[must_use]
    pub fn key_value_store(&self) -> &KeyValueStore {
        &self.key_value_store
    }

    /// Mutable access to the key/value store (e.g. to clear run-id gates).
    pub fn key_value_store_mut(&mut self) -> &mut KeyValueStore {
        &mut self.key_value_store
    }

    /// The hook registry.
    #[must_use]
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Mutable access to the hook registry.
    pub fn hooks_mut(&mut self) -> &mut Hooks {
        &mut self.hooks
    }

    /// The state store.
    #[must_use]
    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Mutable access to the state store.
    pub fn state_mut(&mut self) -> &mut StateStore {
        &mut self.state
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Registered task ids in insertion order.
    #[must_use]
    pub fn task_ids(&self) -> Vec<&str> {
        self.tasks.iter().map(|task| task.id()).collect()
    }

    /// Returns `true` when a processor is registered for `(kind, version)`.
    #[must_use]
    pub fn has_processor_for(&self, kind: &str, version: &str) -> bool {
        self.processor_index.contains_key(&format!("{kind}:{version}"))
    }

    /// Register a processor under its executor id
    /// (`"<kind>:<v1>:<v2>:…"`), with a per-version lookup entry for every
    /// supported version.
    pub fn register_task_processor(&mut self, processor: impl TaskProcessor + 'static) {
        let processor: Arc<dyn TaskProcessor> = Arc::new(processor);
        let kind = processor.kind().to_string();
        let versions = processor.versions().to_vec();

        let mut executor_id = kind.clone();
        for version in &versions {
            executor_id.push(':');
            executor_id.push_str(version);
        }
        for version in &versions {
            self.processor_index
                .insert(format!("{kind}:{version}"), executor_id.clone());
        }
        debug!(
            target: "taskplane.engine",
            executor_id = %executor_id,
            versions = versions.len(),
            "registered task processor"
        );
        self.processors.insert(executor_id, processor);
    }

    /// Add a task to the registry, driving it through the registration
    /// stages.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DuplicateTask`] when the id is already present,
    /// or [`EngineError::HookFailed`] when a registration hook fails — which
    /// includes the default registration-failure hook fired when no
    /// processor is registered for the task's `(kind, version)`.
    pub fn add_task(&mut self, task: Task) -> Result<(), EngineError> {
        if self.task_index.contains_key(task.id()) {
            return Err(EngineError::DuplicateTask {
                task_id: task.id().to_string(),
            });
        }
        let task = Arc::new(task);
        let extras = HookExtras::new();

        self.key_value_store = self.hooks.process_hook(
            COMMAND_NOT_APPLICABLE,
            CONTEXT_ALL,
            LifecycleStage::TaskPreRegister,
            self.key_value_store.clone(),
            Some(&task),
            Some(task.id()),
            &extras,
        )?;

        let processor_key = format!("{}:{}", task.kind(), task.version());
        if !self.processor_index.contains_key(&processor_key) {
            let mut error_extras = HookExtras::new();
            error_extras.insert(
                EXTRA_EXCEPTION_MESSAGE.to_string(),
                serde_json::Value::String(format!(
                    "task kind \"{}\" with version \"{}\" has no processor registered; register all task processors before adding tasks",
                    task.kind(),
                    task.version()
                )),
            );
            self.key_value_store = self.hooks.process_hook(
                COMMAND_NOT_APPLICABLE,
                CONTEXT_ALL,
                LifecycleStage::TaskRegisteredError,
                self.key_value_store.clone(),
                Some(&task),
                Some(task.id()),
                &error_extras,
            )?;
        }

        self.task_index
            .insert(task.id().to_string(), self.tasks.len());
        self.tasks.push(Arc::clone(&task));

        self.key_value_store = self.hooks.process_hook(
            COMMAND_NOT_APPLICABLE,
            CONTEXT_ALL,
            LifecycleStage::TaskRegistered,
            self.key_value_store.clone(),
            Some(&task),
            Some(task.id()),
            &extras,
        )?;
        Ok(())
    }

    /// Find a task by manifest name with a linear scan, optionally skipping
    /// the caller's own id (used during dependency expansion).
    #[must_use]
    pub fn find_task_by_name(&self, name: &str, calling_task_id: Option<&str>) -> Option<&Task> {
        self.tasks
            .iter()
            .filter(|task| calling_task_id != Some(task.id()))
            .find(|task| task.match_name(name))
            .map(Arc::as_ref)
    }

    /// Exact task lookup by id.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::TaskNotFound`] when the id is absent.
    pub fn get_task_by_task_id(&self, task_id: &str) -> Result<&Task, EngineError> {
        self.task_index
            .get(task_id)
            .map(|index| self.tasks[*index].as_ref())
            .ok_or_else(|| EngineError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }

    /// Ids of every task matching the identifier, in registry order.
    #[must_use]
    pub fn find_task_ids_matching_identifier(&self, identifier: &Identifier) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|task| task.match_name_or_label_identifier(identifier))
            .map(|task| task.id().to_string())
            .collect()
    }

    /// Compute the dependency-ordered, scope-filtered plan for a processing
    /// target.
    ///
    /// Qualifying tasks are visited in insertion order; each is expanded
    /// depth-first through its (transitive) dependencies, so every
    /// dependency precedes its dependents in the returned plan.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingDependency`],
    /// [`EngineError::OutOfScopeDependency`], or
    /// [`EngineError::DependencyCycle`]; planning fails atomically.
    pub fn calculate_current_task_order(
        &self,
        target: &Identifier,
    ) -> Result<Vec<String>, EngineError> {
        let mut plan: Vec<String> = Vec::new();
        for task in &self.tasks {
            debug!(target: "taskplane.engine", task_id = %task.id(), "planner considering task");
            if !task.qualifies_for_processing(target) {
                continue;
            }
            if plan.iter().any(|id| id == task.id()) {
                continue;
            }
            let mut visiting = Vec::new();
            self.order_tasks(&mut plan, task, target, &mut visiting)?;
        }
        Ok(plan)
    }

    fn order_tasks(
        &self,
        plan: &mut Vec<String>,
        task: &Task,
        target: &Identifier,
        visiting: &mut Vec<String>,
    ) -> Result<(), EngineError> {
        if visiting.iter().any(|id| id == task.id()) {
            return Err(EngineError::DependencyCycle {
                task_id: task.id().to_string(),
            });
        }
        visiting.push(task.id().to_string());

        for dependency in task.dependencies() {
            let matching_ids = self.find_task_ids_matching_identifier(dependency);
            if *dependency.identifier_type() == IdentifierType::ManifestName
                && matching_ids.is_empty()
            {
                return Err(EngineError::MissingDependency {
                    name: dependency.key().to_string(),
                    task_id: task.id().to_string(),
                });
            }
            for dependency_task_id in matching_ids {
                if plan.iter().any(|id| *id == dependency_task_id) {
                    continue;
                }
                let dependency_task = self.get_task_by_task_id(&dependency_task_id)?;
                if !dependency_task.qualifies_for_processing(target) {
                    return Err(EngineError::OutOfScopeDependency {
                        task_id: task.id().to_string(),
                        dependency_task_id,
                    });
                }
                self.order_tasks(plan, dependency_task, target, visiting)?;
            }
        }

        if !plan.iter().any(|id| id == task.id()) {
            plan.push(task.id().to_string());
        }
        visiting.pop();
        Ok(())
    }

    /// Plan and execute every qualifying task for `(command, context)`.
    ///
    /// Per task: emit `TASK_PRE_PROCESSING_START`; look up the processor
    /// (none registered ⇒ skip silently, it was already reported at add
    /// time); run the gated processor call; emit
    /// `TASK_PRE_PROCESSING_COMPLETED` and `TASK_PROCESSING_PRE_START`;
    /// flush state; emit `TASK_PROCESSING_POST_DONE`.
    ///
    /// # Errors
    ///
    /// Returns planning errors and [`EngineError::HookFailed`]; a hook
    /// failure aborts the run with the store keeping partial progress.
    /// Processor failures are soft and recorded per task in the store.
    pub fn process_context(&mut self, command: &str, context: &str) -> Result<(), EngineError> {
        let target = Identifier::processing_scope(command, context);

        let mut plan = self.calculate_current_task_order(&target)?;
        let mut seen = BTreeSet::new();
        plan.retain(|id| seen.insert(id.clone()));
        debug!(target: "taskplane.engine", ?plan, command = %command, context = %context, "computed task order");

        let extras = HookExtras::new();
        for task_id in plan {
            let Some(task) = self
                .task_index
                .get(&task_id)
                .map(|index| Arc::clone(&self.tasks[*index]))
            else {
                continue;
            };

            self.key_value_store = self.hooks.process_hook(
                command,
                context,
                LifecycleStage::TaskPreProcessingStart,
                self.key_value_store.clone(),
                Some(&task),
                Some(&task_id),
                &extras,
            )?;

            let processor_key = format!("{}:{}", task.kind(), task.version());
            let Some(processor) = self
                .processor_index
                .get(&processor_key)
                .and_then(|executor_id| self.processors.get(executor_id))
                .map(Arc::clone)
            else {
                debug!(
                    target: "taskplane.engine",
                    task_id = %task_id,
                    processor = %processor_key,
                    "no processor registered; skipping task"
                );
                continue;
            };

            let store = std::mem::take(&mut self.key_value_store);
            self.key_value_store =
                processor.task_pre_processing_check(&task, command, context, store, true, &mut self.state);

            self.key_value_store = self.hooks.process_hook(
                command,
                context,
                LifecycleStage::TaskPreProcessingCompleted,
                self.key_value_store.clone(),
                Some(&task),
                Some(&task_id),
                &extras,
            )?;

            self.key_value_store = self.hooks.process_hook(
                command,
                context,
                LifecycleStage::TaskProcessingPreStart,
                self.key_value_store.clone(),
                Some(&task),
                Some(&task_id),
                &extras,
            )?;

            if let Err(error) = self.state.persist_all_state() {
                warn!(
                    target: "taskplane.engine",
                    task_id = %task_id,
                    %error,
                    "failed to flush state; continuing"
                );
            }

            self.key_value_store = self.hooks.process_hook(
                command,
                context,
                LifecycleStage::TaskProcessingPostDone,
                self.key_value_store.clone(),
                Some(&task),
                Some(&task_id),
                &extras,
            )?;
        }
        Ok(())
    }

    fn install_default_hooks(&mut self) {
        if self.hooks.any_hook_exists(
            COMMAND_NOT_APPLICABLE,
            CONTEXT_ALL,
            LifecycleStage::TaskRegisteredError,
        ) {
            return;
        }
        self.hooks.register_hook(Hook::new(
            DEFAULT_REGISTRATION_FAILURE_HOOK,
            vec![COMMAND_NOT_APPLICABLE.to_string()],
            vec![CONTEXT_ALL.to_string()],
            LifecycleStageSet::from(LifecycleStage::TaskRegisteredError),
            always_fail_handler,
        ));
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("tasks", &self.tasks.len())
            .field("processors", &self.processors.len())
            .field("hooks", &self.hooks.hook_count())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
