//! Turns declarations into live, tenant-routed models.

use std::collections::HashSet;
use std::sync::Arc;

use sbase_core::builtin::A7_MODEL;
use sbase_core::{CompiledSchema, Composer, DeclarationId, MetadataStore, PhysicalModel, StorageDriver};
use tracing::{debug, info};

use crate::config::{MultiTenancyConfig, DEFAULT_TENANT};
use crate::discriminator;
use crate::error::{Error, Result};
use crate::registry::TenantRegistry;
use crate::router::{DirectModel, TenantMap, TenantRoutedModel, TenantRouter};

/// Registers declarations of a store on every tenant.
pub struct ModelRegistrar {
    composer: Composer,
    registry: TenantRegistry,
}

impl ModelRegistrar {
    /// Create a registrar.
    pub fn new(
        store: Arc<MetadataStore>,
        driver: Arc<dyn StorageDriver>,
        config: MultiTenancyConfig,
    ) -> Self {
        let composer = Composer::new(store, config.composition());
        Self {
            composer,
            registry: TenantRegistry::new(driver, config),
        }
    }

    /// The composer.
    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// The tenant registry.
    pub fn registry(&self) -> &TenantRegistry {
        &self.registry
    }

    /// Compile `id` for `tenant`.
    pub fn compiled(&self, id: DeclarationId, tenant: &str) -> Result<Arc<CompiledSchema>> {
        Ok(self.composer.compile(id, tenant)?)
    }

    /// Register `id` and return its routed model.
    ///
    /// With multi-tenancy disabled the model lives on the `default` tenant
    /// only. Otherwise it is compiled and bound for every configured tenant.
    pub fn register(&self, id: DeclarationId) -> Result<Arc<dyn TenantRoutedModel>> {
        let name = self.composer.store().name(id)?.to_string();

        if !self.registry.config().enabled() {
            let model = self.register_on(id, &name, DEFAULT_TENANT)?;
            info!(model = %name, "registered model");
            return Ok(Arc::new(DirectModel::new(model)));
        }

        let mut tenants = TenantMap::new();
        for tenant in self.registry.tenant_ids() {
            let model = self.register_on(id, &name, &tenant)?;
            tenants.insert(tenant, model);
        }
        info!(model = %name, tenants = tenants.len(), "registered tenant-routed model");
        Ok(Arc::new(TenantRouter::new(
            name,
            tenants,
            self.registry.config().tenancy_fn.clone(),
        )))
    }

    /// Create the discriminator sub-model `sub` of `base`.
    pub fn discriminator(
        &self,
        base: &dyn TenantRoutedModel,
        sub: DeclarationId,
    ) -> Result<Arc<dyn TenantRoutedModel>> {
        discriminator::specialize(&self.composer, &self.registry, base, sub)
    }

    /// Register a declaration built on the application base model.
    pub fn register_a7_model(&self, id: DeclarationId) -> Result<Arc<dyn TenantRoutedModel>> {
        self.ensure_a7(id)?;
        self.register(id)
    }

    /// Create a discriminator sub-model of an application model.
    pub fn discriminator_a7_model(
        &self,
        base: &dyn TenantRoutedModel,
        sub: DeclarationId,
    ) -> Result<Arc<dyn TenantRoutedModel>> {
        self.ensure_a7(sub)?;
        self.discriminator(base, sub)
    }

    fn register_on(
        &self,
        id: DeclarationId,
        name: &str,
        tenant: &str,
    ) -> Result<Arc<dyn PhysicalModel>> {
        let compiled = self.composer.compile(id, tenant)?;
        let entry = self.registry.get_or_create(tenant)?;
        debug!(
            declaration = %name,
            tenant = %tenant,
            collection = %compiled.collection(),
            "binding compiled schema"
        );
        Ok(entry.register_model(name, compiled.schema.clone())?)
    }

    fn ensure_a7(&self, id: DeclarationId) -> Result<()> {
        let store = self.composer.store();
        let base = store
            .find(A7_MODEL)
            .ok_or_else(|| Error::InvalidConfig(format!("`{A7_MODEL}` is not declared")))?;

        let mut seen = HashSet::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if next == base {
                return Ok(());
            }
            if !seen.insert(next) {
                continue;
            }
            let declaration = store.get(next)?;
            pending.extend(declaration.mixins.iter().copied());
            pending.extend(declaration.parent);
        }

        Err(Error::InvalidConfig(format!(
            "`{}` is not built on `{A7_MODEL}`",
            store.name(id)?
        )))
    }
}
