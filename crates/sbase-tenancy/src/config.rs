//! Multi-tenancy configuration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sbase_core::{CompositionConfig, Connection, DriverError, Fields};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use sbase_core::DEFAULT_TENANT;

/// Resolves the current tenant. Receives the name of the operation or
/// property being accessed.
pub type TenancyFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Receives connection errors with the tenant they belong to.
pub type OnErrorFn = Arc<dyn Fn(&DriverError, &str) + Send + Sync>;

/// Runs once for every newly created tenant connection.
pub type OnConnectionCreatedFn = Arc<dyn Fn(&Arc<dyn Connection>, &str) + Send + Sync>;

/// Creates the connection of a tenant, replacing URI-based connects.
pub type ConnectionFactory = Arc<dyn Fn(&str) -> Arc<dyn Connection> + Send + Sync>;

/// Connection URIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Uris {
    /// One URI shared by every tenant.
    Shared(String),
    /// One URI per tenant.
    PerTenant(HashMap<String, String>),
}

/// Serializable multi-tenancy settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MultiTenancySettings {
    /// Route models per tenant.
    pub enabled: bool,
    /// Namespace of the default tenant's collections.
    pub default_collection_namespace: Option<String>,
    /// Configured tenants, in addition to `default`.
    pub tenants: Vec<String>,
    /// Connection URIs.
    pub uris: Option<Uris>,
    /// Connection options shared by every tenant.
    pub options: Fields,
    /// Tenant-specific connection options, extending `options`.
    pub tenant_options: HashMap<String, Fields>,
}

impl MultiTenancySettings {
    /// Parse settings from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check the settings for obvious mistakes.
    pub fn validate(&self) -> Result<()> {
        if let Some(tenant) = self.tenants.iter().find(|t| t.is_empty()) {
            return Err(Error::InvalidConfig(format!("empty tenant id {tenant:?}")));
        }
        if let Some(tenant) = self.tenants.iter().find(|t| t.contains('.')) {
            return Err(Error::InvalidConfig(format!(
                "tenant id `{tenant}` contains the namespace separator"
            )));
        }
        Ok(())
    }

    /// Every tenant id: `default` first, then the configured ones.
    pub fn tenant_ids(&self) -> Vec<String> {
        let mut ids = vec![DEFAULT_TENANT.to_string()];
        for tenant in &self.tenants {
            if !ids.contains(tenant) {
                ids.push(tenant.clone());
            }
        }
        ids
    }

    /// Connection URI of a tenant.
    pub fn uri_for(&self, tenant: &str) -> Option<&str> {
        match self.uris.as_ref()? {
            Uris::Shared(uri) => Some(uri.as_str()),
            Uris::PerTenant(uris) => uris.get(tenant).map(String::as_str),
        }
    }

    /// Connection options of a tenant.
    pub fn options_for(&self, tenant: &str) -> Fields {
        let mut options = self.options.clone();
        if let Some(extra) = self.tenant_options.get(tenant) {
            options.extend(extra.clone());
        }
        options
    }
}

/// Settings plus the callbacks that drive tenant resolution and connections.
#[derive(Clone)]
pub struct MultiTenancyConfig {
    /// Serializable settings.
    pub settings: MultiTenancySettings,
    /// Current-tenant resolver.
    pub tenancy_fn: TenancyFn,
    /// Connection error handler.
    pub on_error: OnErrorFn,
    /// Connection-created hook.
    pub on_connection_created: Option<OnConnectionCreatedFn>,
    /// Per-tenant connection factory.
    pub connection_factory: Option<ConnectionFactory>,
}

impl MultiTenancyConfig {
    /// Create a config from settings with default callbacks.
    pub fn new(settings: MultiTenancySettings) -> Self {
        Self {
            settings,
            tenancy_fn: Arc::new(|_| DEFAULT_TENANT.to_string()),
            on_error: Arc::new(|err, tenant| {
                tracing::error!(error = %err, tenant = %tenant, "tenant connection error");
            }),
            on_connection_created: None,
            connection_factory: None,
        }
    }

    /// Single-connection setup with multi-tenancy disabled.
    pub fn single(uri: impl Into<String>) -> Self {
        Self::new(MultiTenancySettings {
            uris: Some(Uris::Shared(uri.into())),
            ..MultiTenancySettings::default()
        })
    }

    /// Enable multi-tenancy.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.settings.enabled = enabled;
        self
    }

    /// Set the configured tenants.
    pub fn with_tenants<I, S>(mut self, tenants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.tenants = tenants.into_iter().map(Into::into).collect();
        self
    }

    /// Set the default tenant's collection namespace.
    pub fn with_default_collection_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.settings.default_collection_namespace = Some(namespace.into());
        self
    }

    /// Use one URI for every tenant.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.settings.uris = Some(Uris::Shared(uri.into()));
        self
    }

    /// Use one URI per tenant.
    pub fn with_tenant_uris(mut self, uris: HashMap<String, String>) -> Self {
        self.settings.uris = Some(Uris::PerTenant(uris));
        self
    }

    /// Set the tenant resolver.
    pub fn with_tenancy_fn(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.tenancy_fn = Arc::new(f);
        self
    }

    /// Set the connection error handler.
    pub fn with_on_error(mut self, f: impl Fn(&DriverError, &str) + Send + Sync + 'static) -> Self {
        self.on_error = Arc::new(f);
        self
    }

    /// Set the connection-created hook.
    pub fn with_on_connection_created(
        mut self,
        f: impl Fn(&Arc<dyn Connection>, &str) + Send + Sync + 'static,
    ) -> Self {
        self.on_connection_created = Some(Arc::new(f));
        self
    }

    /// Create tenant connections with a factory instead of the driver.
    pub fn with_connection_factory(
        mut self,
        f: impl Fn(&str) -> Arc<dyn Connection> + Send + Sync + 'static,
    ) -> Self {
        self.connection_factory = Some(Arc::new(f));
        self
    }

    /// Whether multi-tenancy is enabled.
    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Resolve the current tenant for an operation or property.
    pub fn current_tenant(&self, context: &str) -> String {
        (self.tenancy_fn)(context)
    }

    /// Every tenant id.
    pub fn tenant_ids(&self) -> Vec<String> {
        self.settings.tenant_ids()
    }

    /// The composition config these settings imply.
    pub fn composition(&self) -> CompositionConfig {
        let config = CompositionConfig::new().with_multi_tenancy(self.settings.enabled);
        match &self.settings.default_collection_namespace {
            Some(namespace) => config.with_default_collection_namespace(namespace.clone()),
            None => config,
        }
    }
}

impl Default for MultiTenancyConfig {
    fn default() -> Self {
        Self::new(MultiTenancySettings::default())
    }
}

impl fmt::Debug for MultiTenancyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiTenancyConfig")
            .field("settings", &self.settings)
            .field("on_connection_created", &self.on_connection_created.is_some())
            .field("connection_factory", &self.connection_factory.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_from_json() {
        let settings = MultiTenancySettings::from_json(
            r#"{
                "enabled": true,
                "defaultCollectionNamespace": "public",
                "tenants": ["acme", "default", "acme"],
                "uris": { "default": "mem://main", "acme": "mem://acme" },
                "options": { "cache": 1024 },
                "tenantOptions": { "acme": { "cache": 64 } }
            }"#,
        )
        .unwrap();

        assert!(settings.enabled);
        assert_eq!(settings.tenant_ids(), vec!["default", "acme"]);
        assert_eq!(settings.uri_for("acme"), Some("mem://acme"));
        assert_eq!(settings.uri_for("other"), None);
        assert_eq!(settings.options_for("acme").get("cache"), Some(&json!(64)));
        assert_eq!(settings.options_for("default").get("cache"), Some(&json!(1024)));
    }

    #[test]
    fn test_shared_uri() {
        let settings = MultiTenancySettings::from_json(r#"{ "uris": "mem://shared" }"#).unwrap();
        assert!(!settings.enabled);
        assert_eq!(settings.uri_for("anyone"), Some("mem://shared"));
    }

    #[test]
    fn test_invalid_tenant() {
        assert!(matches!(
            MultiTenancySettings::from_json(r#"{ "tenants": ["a.b"] }"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            MultiTenancySettings::from_json(r#"{ "tenants": 3 }"#),
            Err(Error::Settings(_))
        ));
    }

    #[test]
    fn test_config_defaults() {
        let config = MultiTenancyConfig::default()
            .with_enabled(true)
            .with_tenants(["acme"])
            .with_default_collection_namespace("public");
        assert_eq!(config.current_tenant("find"), DEFAULT_TENANT);

        let composition = config.composition();
        assert!(composition.multi_tenancy);
        assert_eq!(composition.default_collection_namespace.as_deref(), Some("public"));

        let config = config.with_tenancy_fn(|_| "acme".to_string());
        assert_eq!(config.current_tenant("find"), "acme");
    }
}
