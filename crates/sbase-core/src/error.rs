//! Core error types.

use thiserror::Error;

use crate::store::DeclarationId;

/// Errors raised while resolving and composing declarations.
///
/// All of these are programming or configuration defects; registration of a
/// model aborts on the first one instead of producing a partial schema.
#[derive(Debug, Error)]
pub enum Error {
    /// A declaration id does not belong to the metadata store.
    #[error("unknown declaration {0:?}")]
    UnknownDeclaration(DeclarationId),

    /// The parent/mixin graph contains a cycle.
    #[error("inheritance cycle: {}", path.join(" -> "))]
    InheritanceCycle {
        /// Declaration names along the cycle, first and last are equal.
        path: Vec<String>,
    },

    /// A declaration was re-entered through an inheritance edge while still compiling.
    #[error("declaration `{declaration}` is already compiling for tenant `{tenant}`")]
    CompilationInProgress {
        /// Declaration name.
        declaration: String,
        /// Tenant being compiled.
        tenant: String,
    },

    /// A validator or index refers to a path missing from the merged field map.
    #[error("declaration `{declaration}` has no path `{path}`")]
    UnknownPath {
        /// Declaration name.
        declaration: String,
        /// The missing path.
        path: String,
    },

    /// A virtual shadows a real field.
    #[error("virtual `{name}` conflicts with a field of `{declaration}`")]
    VirtualConflict {
        /// Declaration name.
        declaration: String,
        /// Virtual name.
        name: String,
    },

    /// A plugin rejected the schema it was applied to.
    #[error("plugin `{plugin}` failed on `{declaration}`: {message}")]
    Plugin {
        /// Declaration name.
        declaration: String,
        /// Plugin name.
        plugin: String,
        /// Failure description.
        message: String,
    },

    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, Error>;
