//! Collection naming and reserved member names.

use super::{CompositionConfig, DEFAULT_TENANT};

/// Separator between namespace and collection.
pub const NAMESPACE_SEPARATOR: &str = ".";

/// Instance method names owned by the framework.
pub const RESERVED_METHODS: &[&str] = &["constructor", "save", "remove", "validate", "toJSON"];

/// Static names owned by the framework.
pub const RESERVED_STATICS: &[&str] = &[
    "name",
    "prototype",
    "create",
    "insertMany",
    "find",
    "findOne",
    "findOneAndUpdate",
    "count",
    "deleteMany",
    "populate",
    "discriminator",
    "on",
];

/// Collection used when a declaration configures none: the lower-cased
/// name, pluralized with a trailing `s`.
pub fn default_collection(name: &str) -> String {
    let lower = name.to_lowercase();
    if lower.ends_with('s') {
        lower
    } else {
        format!("{lower}s")
    }
}

/// Namespace of a tenant's collections.
pub fn namespace<'a>(config: &'a CompositionConfig, tenant: &'a str) -> &'a str {
    if !config.multi_tenancy {
        ""
    } else if tenant == DEFAULT_TENANT {
        config.default_collection_namespace.as_deref().unwrap_or("")
    } else {
        tenant
    }
}

/// Physical collection of `collection` for `tenant`.
pub fn physical_collection(config: &CompositionConfig, tenant: &str, collection: &str) -> String {
    [namespace(config, tenant), collection]
        .iter()
        .filter(|segment| !segment.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(NAMESPACE_SEPARATOR)
}
