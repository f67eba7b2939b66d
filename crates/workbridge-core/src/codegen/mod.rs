//! Generation of the bootstrap program for a new context.
//!
//! ```text
//! Imports ──► emit_imports ─────┐
//!                               ├──► Bootstrap::assemble ──► program text + data: URL
//! Methods ──► serialize_methods ┘                      └──► ScriptScope (executor bindings)
//! ```

mod bootstrap;
mod imports;
mod serializer;
mod shape;

use serde::{Deserialize, Serialize};

pub use bootstrap::{Bootstrap, Entrypoint, Resource, SCRIPT_MIME};
pub use imports::{Imports, emit_imports, is_script_locator};
pub use serializer::{MODULE_BINDINGS, serialize_callable, serialize_methods};

/// Execution mode of a context's program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerType {
    /// Top-level bindings, scripts loaded with `importScripts`.
    #[default]
    Classic,
    /// Bindings resolved through the exported `workerMethods` object.
    Module,
}

impl WorkerType {
    pub fn is_module(self) -> bool {
        matches!(self, Self::Module)
    }
}
