// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lifecycle hooks.
//!
//! A [`Hook`] pairs a handler with the `(command, context, stage)` triples it
//! wants to observe; a [`Hooks`] registry dispatches every lifecycle event to
//! all matching hooks in registration order.  Handlers may return a
//! replacement [`KeyValueStore`], which the dispatcher adopts by value-copy.
//! A handler error is fatal to the enclosing operation.

use crate::EngineError;
use std::collections::BTreeMap;
use std::sync::Arc;
use taskplane_core::{KeyValueStore, LifecycleStage, LifecycleStageSet, Task};
use tracing::{debug, error, warn};

/// Command wildcard for dispatcher-synthesized events (registration and
/// registration errors), where no user command is in play.
pub const COMMAND_NOT_APPLICABLE: &str = "NOT_APPLICABLE";

/// Context wildcard for dispatcher-synthesized events, matched regardless of
/// user context.
pub const CONTEXT_ALL: &str = "ALL";

/// Extras key carrying an override message for the default registration
/// failure handler.
pub const EXTRA_EXCEPTION_MESSAGE: &str = "ExceptionMessage";

/// Free-form parameters passed through to handlers.
pub type HookExtras = BTreeMap<String, serde_json::Value>;

/// The error type handlers may return.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

// ---------------------------------------------------------------------------
// Handler contract
// ---------------------------------------------------------------------------

/// Everything a handler gets to see for one lifecycle event.
#[derive(Debug)]
pub struct HookCall<'a> {
    /// Name of the hook being invoked.
    pub hook_name: &'a str,
    /// The task the event concerns, when one is in play.
    pub task: Option<&'a Task>,
    /// The task id the event concerns (may be set without a task).
    pub task_id: Option<&'a str>,
    /// The dispatcher's current store.
    pub key_value_store: &'a KeyValueStore,
    /// The command driving the run (or [`COMMAND_NOT_APPLICABLE`]).
    pub command: &'a str,
    /// The context the command runs under (or [`CONTEXT_ALL`]).
    pub context: &'a str,
    /// The lifecycle stage being announced.
    pub stage: LifecycleStage,
    /// Free-form extra parameters from the emitter.
    pub extras: &'a HookExtras,
}

/// A lifecycle event handler.
///
/// Return `Ok(Some(store))` to replace the dispatcher's store,
/// `Ok(None)` to leave it untouched, or `Err` to abort the enclosing
/// operation.  Closures with the matching signature implement this trait.
pub trait HookHandler: Send + Sync {
    /// Handle one lifecycle event.
    ///
    /// # Errors
    ///
    /// A returned error is re-raised by the registry as
    /// [`EngineError::HookFailed`] and aborts the enclosing operation.
    fn handle(&self, call: HookCall<'_>) -> Result<Option<KeyValueStore>, HookError>;
}

impl<F> HookHandler for F
where
    F: Fn(HookCall<'_>) -> Result<Option<KeyValueStore>, HookError> + Send + Sync,
{
    fn handle(&self, call: HookCall<'_>) -> Result<Option<KeyValueStore>, HookError> {
        self(call)
    }
}

/// Handler that always fails, taking its message from
/// [`EXTRA_EXCEPTION_MESSAGE`] when present.
///
/// Installed by the engine as the default `TASK_REGISTERED_ERROR` hook; this
/// is the mechanism by which a missing processor becomes fatal.
///
/// # Errors
///
/// Always returns an error.
pub fn always_fail_handler(call: HookCall<'_>) -> Result<Option<KeyValueStore>, HookError> {
    let task_id = call
        .task
        .map(Task::id)
        .or(call.task_id)
        .unwrap_or("unknown");
    let default_message = format!(
        "hook \"{}\" forced a failure on command \"{}\" in context \"{}\" at stage {} for task \"{}\"",
        call.hook_name, call.command, call.context, call.stage, task_id
    );
    let message = match call
        .extras
        .get(EXTRA_EXCEPTION_MESSAGE)
        .and_then(serde_json::Value::as_str)
    {
        Some(override_message) => {
            error!(target: "taskplane.hooks", "{default_message}");
            override_message.to_string()
        }
        None => default_message,
    };
    Err(message.into())
}

// ---------------------------------------------------------------------------
// Hook
// ---------------------------------------------------------------------------

/// A named handler registered against commands, contexts, and stages.
#[derive(Clone)]
pub struct Hook {
    name: String,
    commands: Vec<String>,
    contexts: Vec<String>,
    stages: LifecycleStageSet,
    handler: Arc<dyn HookHandler>,
}

impl Hook {
    /// Create a hook from its matching triples and handler.
    pub fn new(
        name: impl Into<String>,
        commands: Vec<String>,
        contexts: Vec<String>,
        stages: LifecycleStageSet,
        handler: impl HookHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            commands,
            contexts,
            stages,
            handler: Arc::new(handler),
        }
    }

    /// The hook's name (unique within a registry).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` when this hook observes the given triple.
    #[must_use]
    pub fn matches(&self, command: &str, context: &str, stage: LifecycleStage) -> bool {
        self.commands.iter().any(|c| c == command)
            && self.contexts.iter().any(|c| c == context)
            && self.stages.contains(stage)
    }

    /// Invoke the handler for one event.
    ///
    /// A non-matching triple returns the store unchanged.  A handler that
    /// returns a replacement store has it adopted by value-copy.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::HookFailed`] when the handler fails.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &self,
        command: &str,
        context: &str,
        stage: LifecycleStage,
        key_value_store: KeyValueStore,
        task: Option<&Task>,
        task_id: Option<&str>,
        extras: &HookExtras,
    ) -> Result<KeyValueStore, EngineError> {
        if !self.matches(command, context, stage) {
            return Ok(key_value_store);
        }
        debug!(
            target: "taskplane.hooks",
            hook = %self.name,
            stage = %stage,
            task_id = task_id.unwrap_or("none"),
            command = %command,
            context = %context,
            "invoking hook"
        );
        let call = HookCall {
            hook_name: &self.name,
            task,
            task_id,
            key_value_store: &key_value_store,
            command,
            context,
            stage,
            extras,
        };
        match self.handler.handle(call) {
            Ok(Some(replacement)) => Ok(replacement),
            Ok(None) => Ok(key_value_store),
            Err(source) => {
                error!(
                    target: "taskplane.hooks",
                    hook = %self.name,
                    stage = %stage,
                    command = %command,
                    context = %context,
                    error = %source,
                    "hook failed"
                );
                Err(EngineError::HookFailed {
                    hook: self.name.clone(),
                    command: command.to_string(),
                    context: context.to_string(),
                    stage: stage.code(),
                    source,
                })
            }
        }
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("commands", &self.commands)
            .field("contexts", &self.contexts)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Hooks registry
// ---------------------------------------------------------------------------

/// Ordered collection of [`Hook`]s, dispatched in registration order.
#[derive(Debug, Clone, Default)]
pub struct Hooks {
    hooks: Vec<Hook>,
}

impl Hooks {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook.  Names are unique; a second registration under an
    /// existing name is ignored with a warning.
    pub fn register_hook(&mut self, hook: Hook) {
        if self.hooks.iter().any(|existing| existing.name() == hook.name()) {
            warn!(
                target: "taskplane.hooks",
                hook = %hook.name(),
                "hook name already registered; ignoring"
            );
            return;
        }
        self.hooks.push(hook);
    }

    /// Dispatch one lifecycle event to every matching hook in registration
    /// order, threading the store through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the first [`EngineError::HookFailed`]; later hooks are not
    /// invoked.
    #[allow(clippy::too_many_arguments)]
    pub fn process_hook(
        &self,
        command: &str,
        context: &str,
        stage: LifecycleStage,
        key_value_store: KeyValueStore,
        task: Option<&Task>,
        task_id: Option<&str>,
        extras: &HookExtras,
    ) -> Result<KeyValueStore, EngineError> {
        let mut store = key_value_store;
        for hook in &self.hooks {
            store = hook.process(command, context, stage, store, task, task_id, extras)?;
        }
        Ok(store)
    }

    /// Returns `true` when any registered hook observes the given triple.
    #[must_use]
    pub fn any_hook_exists(&self, command: &str, context: &str, stage: LifecycleStage) -> bool {
        self.hooks.iter().any(|hook| hook.matches(command, context, stage))
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// Names of all registered hooks, in registration order.
    #[must_use]
    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(Hook::name).collect()
    }
}
