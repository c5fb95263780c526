//! Per-tenant connections and the models bound to them.

use std::sync::{Arc, OnceLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sbase_core::{Connection, DriverError, DriverResult, ErrorCallback, PhysicalModel, Schema, StorageDriver};
use tracing::{debug, info, trace};

use crate::config::{ConnectionFactory, MultiTenancyConfig, DEFAULT_TENANT};
use crate::error::{Error, Result};

/// A tenant: its connection and the models registered on it.
pub struct Tenant {
    id: String,
    connection: Arc<dyn Connection>,
    models: DashMap<String, Arc<dyn PhysicalModel>>,
}

impl Tenant {
    fn new(id: String, connection: Arc<dyn Connection>) -> Self {
        Self {
            id,
            connection,
            models: DashMap::new(),
        }
    }

    /// Tenant id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The tenant's connection.
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Register `schema` as `name`, or return the model registered earlier.
    pub fn register_model(&self, name: &str, schema: Arc<Schema>) -> DriverResult<Arc<dyn PhysicalModel>> {
        match self.models.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                trace!(tenant = %self.id, model = %name, "model already registered");
                Ok(entry.get().clone())
            }
            Entry::Vacant(entry) => {
                let model = self.connection.model(name, schema)?;
                debug!(tenant = %self.id, model = %name, collection = %model.collection(), "registered model");
                Ok(entry.insert(model).clone())
            }
        }
    }

    /// Record a model created outside [`register_model`](Self::register_model).
    pub fn insert_model(&self, name: &str, model: Arc<dyn PhysicalModel>) {
        self.models.insert(name.to_string(), model);
    }

    /// Look up a registered model.
    pub fn model(&self, name: &str) -> Option<Arc<dyn PhysicalModel>> {
        self.models.get(name).map(|entry| entry.clone())
    }
}

impl std::fmt::Debug for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tenant")
            .field("id", &self.id)
            .field("uri", &self.connection.uri())
            .field("models", &self.models.len())
            .finish()
    }
}

enum Target<'a> {
    Factory(&'a ConnectionFactory),
    Uri(&'a str),
}

/// Creates each tenant's connection at most once.
///
/// Each tenant key has its own once-cell, so concurrent first access to one
/// tenant waits on that tenant only.
pub struct TenantRegistry {
    driver: Arc<dyn StorageDriver>,
    config: MultiTenancyConfig,
    tenants: DashMap<String, Arc<OnceLock<Arc<Tenant>>>>,
}

impl TenantRegistry {
    /// Create a registry.
    pub fn new(driver: Arc<dyn StorageDriver>, config: MultiTenancyConfig) -> Self {
        Self {
            driver,
            config,
            tenants: DashMap::new(),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &MultiTenancyConfig {
        &self.config
    }

    /// Every tenant id models are registered for.
    pub fn tenant_ids(&self) -> Vec<String> {
        if self.config.enabled() {
            self.config.tenant_ids()
        } else {
            vec![DEFAULT_TENANT.to_string()]
        }
    }

    /// Get a tenant, creating its connection on first access.
    pub fn get_or_create(&self, tenant: &str) -> Result<Arc<Tenant>> {
        if let Some(existing) = self.get(tenant) {
            return Ok(existing);
        }

        let target = match (&self.config.connection_factory, self.config.settings.uri_for(tenant)) {
            (Some(factory), _) => Target::Factory(factory),
            (None, Some(uri)) => Target::Uri(uri),
            (None, None) => {
                return Err(Error::InvalidConfig(format!(
                    "no connection uri for tenant `{tenant}`"
                )))
            }
        };

        let cell = self
            .tenants
            .entry(tenant.to_string())
            .or_insert_with(|| Arc::new(OnceLock::new()))
            .clone();
        let created = cell.get_or_init(|| Arc::new(self.connect(tenant, target)));
        Ok(created.clone())
    }

    /// Get a tenant that has already been created.
    pub fn get(&self, tenant: &str) -> Option<Arc<Tenant>> {
        self.tenants
            .get(tenant)
            .and_then(|cell| cell.get().cloned())
    }

    /// Number of created tenants.
    pub fn len(&self) -> usize {
        self.tenants.iter().filter(|cell| cell.get().is_some()).count()
    }

    /// Check whether no tenant has been created.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn connect(&self, tenant: &str, target: Target<'_>) -> Tenant {
        let connection = match target {
            Target::Factory(factory) => factory(tenant),
            Target::Uri(uri) => {
                let on_error = self.config.on_error.clone();
                let owner = tenant.to_string();
                let callback: ErrorCallback = Arc::new(move |err: &DriverError| on_error(err, &owner));
                self.driver
                    .connect(uri, &self.config.settings.options_for(tenant), callback)
            }
        };

        info!(
            tenant = %tenant,
            uri = %connection.uri(),
            connected = connection.is_connected(),
            "created tenant connection"
        );
        if let Some(callback) = &self.config.on_connection_created {
            callback(&connection, tenant);
        }
        Tenant::new(tenant.to_string(), connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Barrier, Mutex};

    use sbase_core::{Fields, SchemaOptions};
    use sbase_sled::SledDriver;

    fn registry(config: MultiTenancyConfig) -> TenantRegistry {
        TenantRegistry::new(Arc::new(SledDriver::new()), config)
    }

    #[test]
    fn test_tenant_created_once() {
        let created = Arc::new(Mutex::new(Vec::new()));
        let sink = created.clone();
        let config = MultiTenancyConfig::single("mem://once")
            .with_on_connection_created(move |_, tenant| sink.lock().unwrap().push(tenant.to_string()));
        let registry = registry(config);

        let first = registry.get_or_create(DEFAULT_TENANT).unwrap();
        let second = registry.get_or_create(DEFAULT_TENANT).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.connection().is_connected());
        assert_eq!(*created.lock().unwrap(), vec![DEFAULT_TENANT.to_string()]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.tenant_ids(), vec![DEFAULT_TENANT.to_string()]);
    }

    #[test]
    fn test_per_tenant_uris() {
        let uris = HashMap::from([
            (DEFAULT_TENANT.to_string(), "mem://main".to_string()),
            ("acme".to_string(), "mem://acme".to_string()),
        ]);
        let config = MultiTenancyConfig::default()
            .with_enabled(true)
            .with_tenants(["acme"])
            .with_tenant_uris(uris);
        let registry = registry(config);

        assert_eq!(registry.get_or_create("acme").unwrap().connection().uri(), "mem://acme");
        assert!(matches!(registry.get_or_create("other"), Err(Error::InvalidConfig(_))));
        assert!(registry.get("other").is_none());
        assert_eq!(registry.tenant_ids(), vec!["default", "acme"]);
    }

    #[test]
    fn test_connection_error_goes_to_callback() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let config = MultiTenancyConfig::single("ftp://nowhere")
            .with_on_error(move |_, tenant| sink.lock().unwrap().push(tenant.to_string()));
        let registry = registry(config);

        let tenant = registry.get_or_create(DEFAULT_TENANT).unwrap();
        assert!(!tenant.connection().is_connected());
        assert_eq!(*errors.lock().unwrap(), vec![DEFAULT_TENANT.to_string()]);
        assert!(matches!(
            tenant.register_model("User", Arc::new(Schema::new("User", vec![], SchemaOptions::new()))),
            Err(DriverError::NotConnected(_))
        ));
    }

    #[test]
    fn test_connection_factory() {
        let driver = Arc::new(SledDriver::new());
        let factory_driver = driver.clone();
        let config = MultiTenancyConfig::default().with_connection_factory(move |tenant| {
            factory_driver.connect(&format!("mem://factory-{tenant}"), &Fields::new(), Arc::new(|_| {}))
        });
        let registry = TenantRegistry::new(driver, config);

        let tenant = registry.get_or_create("acme").unwrap();
        assert_eq!(tenant.connection().uri(), "mem://factory-acme");

        let schema = Arc::new(Schema::new("User", vec![], SchemaOptions::new().with_collection("users")));
        let first = tenant.register_model("User", schema.clone()).unwrap();
        let second = tenant.register_model("User", schema).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(tenant.model("User").is_some());
    }

    #[test]
    fn test_concurrent_first_access_connects_once_per_tenant() {
        let driver = Arc::new(SledDriver::new());
        let factory_driver = driver.clone();
        let connects = Arc::new(AtomicUsize::new(0));
        let counter = connects.clone();
        let config = MultiTenancyConfig::default()
            .with_enabled(true)
            .with_tenants(["acme"])
            .with_connection_factory(move |tenant| {
                counter.fetch_add(1, Ordering::SeqCst);
                factory_driver.connect(&format!("mem://concurrent-{tenant}"), &Fields::new(), Arc::new(|_| {}))
            });
        let registry = TenantRegistry::new(driver, config);
        let barrier = Barrier::new(16);

        let tenants: Vec<Arc<Tenant>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let (registry, barrier) = (&registry, &barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        let tenant = if i % 2 == 0 { DEFAULT_TENANT } else { "acme" };
                        registry.get_or_create(tenant).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 2);
        for tenant in &tenants {
            let cached = registry.get(tenant.id()).unwrap();
            assert!(Arc::ptr_eq(tenant, &cached));
        }
    }
}
