// SPDX-License-Identifier: MIT OR Apache-2.0
//! taskplane
//!
//! Facade crate re-exporting the taskplane contract and engine:
//!
//! - [`taskplane_core`] — identifiers, manifests, tasks, lifecycle stages,
//!   and the per-run key/value store
//! - [`taskplane_engine`] — the processor registry, hook registry, planner,
//!   and lifecycle dispatcher
//! - [`taskplane_error`] — stable error codes for host applications
//!
//! A host application registers processors and hooks on an
//! [`Engine`](taskplane_engine::Engine), adds one [`Task`](taskplane_core::Task)
//! per parsed manifest, and calls `process_context(command, context)`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub use taskplane_core::*;
pub use taskplane_engine::*;
pub use taskplane_error;
