//! SBASE Tenancy - Per-tenant connections and tenant-routed models.
//!
//! A [`ModelRegistrar`] compiles declarations for each tenant, binds them to
//! that tenant's connection through the [`TenantRegistry`], and hands back a
//! [`TenantRoutedModel`] that forwards every operation to the current tenant.

pub mod config;
pub mod discriminator;
pub mod error;
pub mod registrar;
pub mod registry;
pub mod router;

pub use config::{
    ConnectionFactory, MultiTenancyConfig, MultiTenancySettings, OnConnectionCreatedFn, OnErrorFn,
    TenancyFn, Uris, DEFAULT_TENANT,
};
pub use error::{Error, Result};
pub use registrar::ModelRegistrar;
pub use registry::{Tenant, TenantRegistry};
pub use router::{
    CallShape, DirectModel, LazyStatic, Operation, Route, TenantMap, TenantRoutedModel,
    TenantRouter, LAZY_OPERATIONS, SHARED_OPERATIONS,
};
