use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use sbase_core::PhysicalModel;
use tracing::trace;

use super::TenantMap;
use crate::config::TenancyFn;
use crate::error::{Error, Result};

/// A static whose tenant is resolved only when it is called.
///
/// Holding the handle across a tenant switch calls the static on the tenant
/// current at call time.
#[derive(Clone)]
pub struct LazyStatic {
    name: String,
    tenants: Arc<TenantMap>,
    tenancy_fn: TenancyFn,
}

impl LazyStatic {
    pub(crate) fn new(name: impl Into<String>, tenants: Arc<TenantMap>, tenancy_fn: TenancyFn) -> Self {
        Self {
            name: name.into(),
            tenants,
            tenancy_fn,
        }
    }

    /// Static name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The model the static would run on now.
    pub fn resolve(&self) -> Result<Arc<dyn PhysicalModel>> {
        let tenant = (self.tenancy_fn)(&self.name);
        trace!(static_fn = %self.name, tenant = %tenant, "resolving static");
        self.tenants
            .get(&tenant)
            .cloned()
            .ok_or(Error::UnknownTenant(tenant))
    }

    /// Call the static.
    pub async fn call(&self, args: Vec<Value>) -> Result<Value> {
        let model = self.resolve()?;
        Ok(model.call_static(&self.name, args).await?)
    }
}

impl fmt::Debug for LazyStatic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyStatic")
            .field("name", &self.name)
            .field("tenants", &self.tenants.tenants().collect::<Vec<_>>())
            .finish()
    }
}
