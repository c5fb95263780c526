use std::sync::Arc;

use sbase_core::PhysicalModel;

use super::{LazyStatic, TenantMap, TenantRoutedModel};
use crate::config::DEFAULT_TENANT;
use crate::error::Result;

/// A model on a single connection. Every operation goes to it.
#[derive(Debug, Clone)]
pub struct DirectModel {
    name: String,
    model: Arc<dyn PhysicalModel>,
    tenants: Arc<TenantMap>,
}

impl DirectModel {
    /// Wrap a physical model.
    pub fn new(model: Arc<dyn PhysicalModel>) -> Self {
        let mut tenants = TenantMap::new();
        tenants.insert(DEFAULT_TENANT, model.clone());
        Self {
            name: model.name().to_string(),
            model,
            tenants: Arc::new(tenants),
        }
    }

    /// The physical model.
    pub fn model(&self) -> &Arc<dyn PhysicalModel> {
        &self.model
    }
}

impl TenantRoutedModel for DirectModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn tenant_map(&self) -> &TenantMap {
        &self.tenants
    }

    fn resolve(&self, _context: &str) -> Result<Arc<dyn PhysicalModel>> {
        Ok(self.model.clone())
    }

    fn lazy(&self, name: &str) -> LazyStatic {
        LazyStatic::new(name, self.tenants.clone(), Arc::new(|_| DEFAULT_TENANT.to_string()))
    }
}
