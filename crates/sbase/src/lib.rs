//! SBASE - Composable model declarations with multi-tenant routing.
//!
//! Declare models in a [`MetadataStore`](base::MetadataStore), hand the store
//! to a [`ModelRegistrar`](tenancy::ModelRegistrar) and work with the routed
//! models it returns.
//!
//! # Quick Start
//!
//! ```ignore
//! use sbase::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut store = MetadataStore::new();
//!     let builtins = Builtins::declare(&mut store);
//!     let user = store
//!         .declare("User")
//!         .extends(builtins.a7_model)
//!         .field("name", required())
//!         .build();
//!
//!     let registrar = sbase::sled_registrar(store, MultiTenancyConfig::single("mem://app"));
//!     let users = registrar.register_a7_model(user)?;
//!     let fields = json!({ "name": "ana" }).as_object().cloned().unwrap_or_default();
//!     users.create(fields).await?;
//!     Ok(())
//! }
//! ```

pub use sbase_core as base;
pub use sbase_tenancy as tenancy;

#[cfg(feature = "sled")]
pub use sbase_sled as storage;

/// Common imports.
pub mod prelude {
    pub use sbase_core::{
        array_field, db_ref, db_ref_array, default_value, enum_field, index_field, map_field,
        required, unique, Builtins, DeclarationId, Document, FieldOptions, FieldType, Fields,
        Hook, Index, Method, MetadataStore, Plugin, Query, RelationVirtual, Schema, StaticMethod,
        UpdateValidator, Virtual,
    };
    pub use sbase_tenancy::{
        ModelRegistrar, MultiTenancyConfig, MultiTenancySettings, TenantRoutedModel,
        DEFAULT_TENANT,
    };
    pub use serde_json::{json, Value};
}

/// A registrar over the sled driver.
#[cfg(feature = "sled")]
pub fn sled_registrar(
    store: sbase_core::MetadataStore,
    config: sbase_tenancy::MultiTenancyConfig,
) -> sbase_tenancy::ModelRegistrar {
    sbase_tenancy::ModelRegistrar::new(
        std::sync::Arc::new(store),
        std::sync::Arc::new(sbase_sled::SledDriver::new()),
        config,
    )
}
