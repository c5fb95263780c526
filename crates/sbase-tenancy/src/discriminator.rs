//! Discriminator sub-models over routed models.

use std::sync::Arc;

use sbase_core::{Composer, DeclarationId};
use tracing::debug;

use crate::config::DEFAULT_TENANT;
use crate::error::{Error, Result};
use crate::registry::TenantRegistry;
use crate::router::{DirectModel, TenantMap, TenantRoutedModel, TenantRouter};

/// Create the discriminator sub-model of `base` for declaration `sub`.
///
/// With multi-tenancy disabled the single physical model is specialized and
/// wrapped in a [`DirectModel`]. Otherwise `sub` is compiled for every tenant
/// of the base's map and each tenant model is specialized separately.
pub fn specialize(
    composer: &Composer,
    registry: &TenantRegistry,
    base: &dyn TenantRoutedModel,
    sub: DeclarationId,
) -> Result<Arc<dyn TenantRoutedModel>> {
    let name = composer.store().name(sub)?.to_string();

    if !registry.config().enabled() {
        let model = base
            .tenant_map()
            .get(DEFAULT_TENANT)
            .cloned()
            .ok_or_else(|| Error::UnknownTenant(DEFAULT_TENANT.to_string()))?;
        let compiled = composer.compile(sub, DEFAULT_TENANT)?;
        let specialized = model.discriminator(&name, compiled.schema.clone())?;
        if let Some(tenant) = registry.get(DEFAULT_TENANT) {
            tenant.insert_model(&name, specialized.clone());
        }
        debug!(base = %base.name(), discriminator = %name, "created discriminator");
        return Ok(Arc::new(DirectModel::new(specialized)));
    }

    let mut tenants = TenantMap::new();
    for (tenant, model) in base.tenant_map().iter() {
        let compiled = composer.compile(sub, tenant)?;
        let specialized = model.discriminator(&name, compiled.schema.clone())?;
        if let Some(entry) = registry.get(tenant) {
            entry.insert_model(&name, specialized.clone());
        }
        debug!(base = %base.name(), discriminator = %name, tenant = %tenant, "created discriminator");
        tenants.insert(tenant, specialized);
    }

    Ok(Arc::new(TenantRouter::new(
        name,
        tenants,
        registry.config().tenancy_fn.clone(),
    )))
}
