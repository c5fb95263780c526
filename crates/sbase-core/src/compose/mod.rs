//! Composition of declarations into compiled schemas.

mod composer;
pub mod merge;
pub mod naming;
pub mod resolver;

use std::sync::Arc;

pub use composer::Composer;
pub use merge::{MergedMetadata, Source};
pub use resolver::{resolve, ResolvedSources};

use crate::schema::Schema;
use crate::store::DeclarationId;

/// Tenant that always exists.
pub const DEFAULT_TENANT: &str = "default";

/// Composition settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositionConfig {
    /// Namespace collections by tenant.
    pub multi_tenancy: bool,
    /// Namespace of the default tenant's collections.
    pub default_collection_namespace: Option<String>,
}

impl CompositionConfig {
    /// Create a config with multi-tenancy disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable multi-tenancy.
    pub fn with_multi_tenancy(mut self, enabled: bool) -> Self {
        self.multi_tenancy = enabled;
        self
    }

    /// Set the default tenant's namespace.
    pub fn with_default_collection_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_collection_namespace = Some(namespace.into());
        self
    }
}

/// The result of composing one declaration for one tenant.
#[derive(Debug)]
pub struct CompiledSchema {
    /// Source declaration.
    pub declaration: DeclarationId,
    /// Tenant the schema was compiled for.
    pub tenant: String,
    /// Merged metadata, with nested declaration types resolved.
    pub metadata: MergedMetadata,
    /// The executable schema.
    pub schema: Arc<Schema>,
}

impl CompiledSchema {
    /// Declaration name.
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Physical collection.
    pub fn collection(&self) -> &str {
        self.schema.collection()
    }
}
