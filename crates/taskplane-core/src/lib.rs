// SPDX-License-Identifier: MIT OR Apache-2.0
//! taskplane-core
//!
//! The stable contract for taskplane: the identifier model, manifest
//! ingestion, the immutable [`Task`] value, lifecycle stages, and the
//! per-run [`KeyValueStore`].
//!
//! If you only take one dependency, take this one.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Identifier contexts: the `(type, name)` pairs that scope identifiers.
pub mod context;
/// Typed identifiers and their de-duplicated collection.
pub mod identifier;
/// The per-run string-keyed scratchpad shared by hooks and processors.
pub mod kv;
/// Manifest normalization and identifier/dependency ingestion.
pub mod manifest;
/// Lifecycle stages and stage sets.
pub mod stage;
/// The immutable task value derived from a manifest.
pub mod task;

use sha2::{Digest, Sha256};

pub use context::{IdentifierContext, IdentifierContexts};
pub use identifier::{Identifier, IdentifierType, Identifiers, PROCESSING_SCOPE_KEY};
pub use kv::KeyValueStore;
pub use manifest::{
    Manifest, build_annotations, build_contextual_identifiers, build_dependency_identifiers,
    build_non_contextual_identifiers, keys_to_lower, manifest_schema,
};
pub use stage::{LifecycleStage, LifecycleStageSet};
pub use task::Task;

/// Errors from contract-level operations (serialization, manifest lifting).
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    /// JSON serialization or deserialization failed.
    #[error("failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A manifest document is missing required fields or has the wrong shape.
    #[error("invalid manifest: {reason}")]
    InvalidManifest {
        /// Human-readable explanation of what was wrong.
        reason: String,
    },
}

impl ContractError {
    /// Return the stable [`ErrorCode`](taskplane_error::ErrorCode) for this error.
    #[must_use]
    pub fn error_code(&self) -> taskplane_error::ErrorCode {
        match self {
            Self::Json(_) => taskplane_error::ErrorCode::Internal,
            Self::InvalidManifest { .. } => taskplane_error::ErrorCode::ManifestInvalid,
        }
    }
}

/// Produce a deterministic JSON string for hashing.
///
/// This is not a full JCS implementation, but it is stable for our types:
/// - keys are sorted (serde_json's `Map` is a `BTreeMap` by default)
/// - numbers are serialized consistently by serde_json
///
/// # Errors
///
/// Returns [`ContractError::Json`] if the value cannot be serialized.
pub fn canonical_json<T: serde::Serialize>(value: &T) -> Result<String, ContractError> {
    let v = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&v)?)
}

/// Compute the hex-encoded SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hash an in-memory JSON tree via its canonical string form.
///
/// Serializing a `serde_json::Value` tree cannot fail, so this is total.
pub(crate) fn hash_value(value: &serde_json::Value) -> String {
    serde_json::to_string(value)
        .map(|s| sha256_hex(s.as_bytes()))
        .unwrap_or_default()
}
