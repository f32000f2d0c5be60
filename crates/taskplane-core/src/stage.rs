// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lifecycle stages.
//!
//! Every task passes through up to six milestones, each with a paired error
//! variant.  The numeric codes are part of the external contract and are
//! guaranteed not to change: positive codes 1..=6 for the success stages,
//! their negation for the error stages.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// LifecycleStage
// ---------------------------------------------------------------------------

/// A milestone in a task's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LifecycleStage {
    /// About to be registered (code `1`).
    TaskPreRegister,
    /// Registration failed (code `-1`).
    TaskPreRegisterError,
    /// Registered in the task registry (code `2`).
    TaskRegistered,
    /// Registration was rejected, e.g. no processor available (code `-2`).
    TaskRegisteredError,
    /// Pre-processing about to begin (code `3`).
    TaskPreProcessingStart,
    /// Pre-processing failed to begin (code `-3`).
    TaskPreProcessingStartError,
    /// Pre-processing (including the processor call) finished (code `4`).
    TaskPreProcessingCompleted,
    /// Pre-processing failed (code `-4`).
    TaskPreProcessingCompletedError,
    /// Post-processing about to begin (code `5`).
    TaskProcessingPreStart,
    /// Post-processing failed to begin (code `-5`).
    TaskProcessingPreStartError,
    /// Post-processing finished (code `6`).
    TaskProcessingPostDone,
    /// Post-processing failed (code `-6`).
    TaskProcessingPostDoneError,
}

impl LifecycleStage {
    /// All twelve stages in code order (1, −1, 2, −2, …).
    pub const ALL: [Self; 12] = [
        Self::TaskPreRegister,
        Self::TaskPreRegisterError,
        Self::TaskRegistered,
        Self::TaskRegisteredError,
        Self::TaskPreProcessingStart,
        Self::TaskPreProcessingStartError,
        Self::TaskPreProcessingCompleted,
        Self::TaskPreProcessingCompletedError,
        Self::TaskProcessingPreStart,
        Self::TaskProcessingPreStartError,
        Self::TaskProcessingPostDone,
        Self::TaskProcessingPostDoneError,
    ];

    /// Returns the stable numeric code for this stage.
    #[must_use]
    pub fn code(self) -> i8 {
        match self {
            Self::TaskPreRegister => 1,
            Self::TaskPreRegisterError => -1,
            Self::TaskRegistered => 2,
            Self::TaskRegisteredError => -2,
            Self::TaskPreProcessingStart => 3,
            Self::TaskPreProcessingStartError => -3,
            Self::TaskPreProcessingCompleted => 4,
            Self::TaskPreProcessingCompletedError => -4,
            Self::TaskProcessingPreStart => 5,
            Self::TaskProcessingPreStartError => -5,
            Self::TaskProcessingPostDone => 6,
            Self::TaskProcessingPostDoneError => -6,
        }
    }

    /// Look up a stage by its numeric code.
    #[must_use]
    pub fn from_code(code: i8) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.code() == code)
    }

    /// Returns `true` for the error variants (negative codes).
    #[must_use]
    pub fn is_error(self) -> bool {
        self.code() < 0
    }

    /// Returns the error counterpart of a success stage (or the stage
    /// itself when it is already an error stage).
    #[must_use]
    pub fn error_stage(self) -> Self {
        Self::from_code(-self.code().abs()).unwrap_or(self)
    }

    /// Returns the stable name of this stage.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::TaskPreRegister => "TASK_PRE_REGISTER",
            Self::TaskPreRegisterError => "TASK_PRE_REGISTER_ERROR",
            Self::TaskRegistered => "TASK_REGISTERED",
            Self::TaskRegisteredError => "TASK_REGISTERED_ERROR",
            Self::TaskPreProcessingStart => "TASK_PRE_PROCESSING_START",
            Self::TaskPreProcessingStartError => "TASK_PRE_PROCESSING_START_ERROR",
            Self::TaskPreProcessingCompleted => "TASK_PRE_PROCESSING_COMPLETED",
            Self::TaskPreProcessingCompletedError => "TASK_PRE_PROCESSING_COMPLETED_ERROR",
            Self::TaskProcessingPreStart => "TASK_PROCESSING_PRE_START",
            Self::TaskProcessingPreStartError => "TASK_PROCESSING_PRE_START_ERROR",
            Self::TaskProcessingPostDone => "TASK_PROCESSING_POST_DONE",
            Self::TaskProcessingPostDoneError => "TASK_PROCESSING_POST_DONE_ERROR",
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for LifecycleStage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.code())
    }
}

impl<'de> Deserialize<'de> for LifecycleStage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i8::deserialize(deserializer)?;
        Self::from_code(code)
            .ok_or_else(|| D::Error::custom(format!("unknown lifecycle stage code {code}")))
    }
}

// ---------------------------------------------------------------------------
// LifecycleStageSet
// ---------------------------------------------------------------------------

/// An ordered set of stages used as a hook's allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleStageSet {
    stages: Vec<LifecycleStage>,
}

impl LifecycleStageSet {
    /// Create a set containing all twelve stages.
    #[must_use]
    pub fn all() -> Self {
        Self {
            stages: LifecycleStage::ALL.to_vec(),
        }
    }

    /// Create an empty set.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a stage to the set; duplicates are ignored.
    pub fn register(&mut self, stage: LifecycleStage) {
        if !self.stages.contains(&stage) {
            self.stages.push(stage);
        }
    }

    /// Returns `true` when the stage is in the set.
    #[must_use]
    pub fn contains(&self, stage: LifecycleStage) -> bool {
        self.stages.contains(&stage)
    }

    /// Number of stages in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` when the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Iterate the stages in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, LifecycleStage> {
        self.stages.iter()
    }
}

impl From<LifecycleStage> for LifecycleStageSet {
    fn from(stage: LifecycleStage) -> Self {
        let mut set = Self::empty();
        set.register(stage);
        set
    }
}

impl FromIterator<LifecycleStage> for LifecycleStageSet {
    fn from_iter<I: IntoIterator<Item = LifecycleStage>>(iter: I) -> Self {
        let mut set = Self::empty();
        for stage in iter {
            set.register(stage);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(LifecycleStage::TaskPreRegister.code(), 1);
        assert_eq!(LifecycleStage::TaskRegistered.code(), 2);
        assert_eq!(LifecycleStage::TaskPreProcessingStart.code(), 3);
        assert_eq!(LifecycleStage::TaskPreProcessingCompleted.code(), 4);
        assert_eq!(LifecycleStage::TaskProcessingPreStart.code(), 5);
        assert_eq!(LifecycleStage::TaskProcessingPostDone.code(), 6);
        assert_eq!(LifecycleStage::TaskRegisteredError.code(), -2);
    }

    #[test]
    fn from_code_round_trips_every_stage() {
        for stage in LifecycleStage::ALL {
            assert_eq!(LifecycleStage::from_code(stage.code()), Some(stage));
        }
        assert_eq!(LifecycleStage::from_code(0), None);
        assert_eq!(LifecycleStage::from_code(7), None);
    }

    #[test]
    fn error_stage_pairs_success_with_error() {
        assert_eq!(
            LifecycleStage::TaskRegistered.error_stage(),
            LifecycleStage::TaskRegisteredError
        );
        assert_eq!(
            LifecycleStage::TaskRegisteredError.error_stage(),
            LifecycleStage::TaskRegisteredError
        );
        assert!(LifecycleStage::TaskRegisteredError.is_error());
        assert!(!LifecycleStage::TaskRegistered.is_error());
    }

    #[test]
    fn serde_uses_numeric_codes() {
        let json = serde_json::to_string(&LifecycleStage::TaskProcessingPostDone).unwrap();
        assert_eq!(json, "6");
        let stage: LifecycleStage = serde_json::from_str("-3").unwrap();
        assert_eq!(stage, LifecycleStage::TaskPreProcessingStartError);
        assert!(serde_json::from_str::<LifecycleStage>("9").is_err());
    }

    #[test]
    fn default_set_contains_all_stages() {
        let set = LifecycleStageSet::all();
        assert_eq!(set.len(), 12);
        for stage in LifecycleStage::ALL {
            assert!(set.contains(stage));
        }
    }

    #[test]
    fn empty_set_can_register_single_stages() {
        let mut set = LifecycleStageSet::empty();
        assert!(set.is_empty());
        set.register(LifecycleStage::TaskRegisteredError);
        set.register(LifecycleStage::TaskRegisteredError);
        assert_eq!(set.len(), 1);
        assert!(set.contains(LifecycleStage::TaskRegisteredError));
        assert!(!set.contains(LifecycleStage::TaskRegistered));
    }
}
