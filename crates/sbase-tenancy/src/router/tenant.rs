use std::fmt;
use std::sync::Arc;

use sbase_core::PhysicalModel;
use tracing::trace;

use super::{LazyStatic, TenantMap, TenantRoutedModel};
use crate::config::TenancyFn;
use crate::error::{Error, Result};

/// A logical model holding one physical model per tenant.
///
/// Each operation asks the tenancy function for the current tenant and runs
/// on that tenant's model.
#[derive(Clone)]
pub struct TenantRouter {
    name: String,
    tenants: Arc<TenantMap>,
    tenancy_fn: TenancyFn,
}

impl TenantRouter {
    /// Create a router over `tenants`.
    pub fn new(name: impl Into<String>, tenants: TenantMap, tenancy_fn: TenancyFn) -> Self {
        Self {
            name: name.into(),
            tenants: Arc::new(tenants),
            tenancy_fn,
        }
    }

    /// A tenant's model.
    pub fn tenant(&self, tenant: &str) -> Option<&Arc<dyn PhysicalModel>> {
        self.tenants.get(tenant)
    }
}

impl TenantRoutedModel for TenantRouter {
    fn name(&self) -> &str {
        &self.name
    }

    fn tenant_map(&self) -> &TenantMap {
        &self.tenants
    }

    fn resolve(&self, context: &str) -> Result<Arc<dyn PhysicalModel>> {
        let tenant = (self.tenancy_fn)(context);
        trace!(model = %self.name, context = %context, tenant = %tenant, "routing");
        self.tenants
            .get(&tenant)
            .cloned()
            .ok_or(Error::UnknownTenant(tenant))
    }

    fn lazy(&self, name: &str) -> LazyStatic {
        LazyStatic::new(name, self.tenants.clone(), self.tenancy_fn.clone())
    }
}

impl fmt::Debug for TenantRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantRouter")
            .field("name", &self.name)
            .field("tenants", &self.tenants.tenants().collect::<Vec<_>>())
            .finish()
    }
}
