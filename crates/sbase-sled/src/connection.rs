use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use sbase_core::{Connection, ConnectionOptions, DriverError, DriverResult, PhysicalModel, Schema};
use serde_json::Value;
use sled::Db;
use tracing::debug;

use crate::model::SledModel;

/// State shared by a connection and the models bound to it.
pub(crate) struct Shared {
    pub(crate) uri: String,
    pub(crate) db: Option<Db>,
    pub(crate) models: DashMap<String, Arc<SledModel>>,
}

impl Shared {
    pub(crate) fn model(&self, name: &str) -> DriverResult<Arc<SledModel>> {
        self.models
            .get(name)
            .map(|entry| entry.clone())
            .ok_or_else(|| DriverError::MissingModel(name.to_string()))
    }

    pub(crate) fn register(&self, name: &str, model: Arc<SledModel>) -> DriverResult<()> {
        match self.models.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(DriverError::OverwriteModel(name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(model);
                Ok(())
            }
        }
    }
}

/// A connection to one sled database.
pub struct SledConnection {
    shared: Arc<Shared>,
    settings: DashMap<String, Value>,
}

impl SledConnection {
    pub(crate) fn open(uri: &str, db: Db, options: ConnectionOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                uri: uri.to_string(),
                db: Some(db),
                models: DashMap::new(),
            }),
            settings: options.into_iter().collect(),
        }
    }

    pub(crate) fn disconnected(uri: &str) -> Self {
        Self {
            shared: Arc::new(Shared {
                uri: uri.to_string(),
                db: None,
                models: DashMap::new(),
            }),
            settings: DashMap::new(),
        }
    }

    /// Names of the bound models.
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.models.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl Connection for SledConnection {
    fn uri(&self) -> &str {
        &self.shared.uri
    }

    fn is_connected(&self) -> bool {
        self.shared.db.is_some()
    }

    fn model(&self, name: &str, schema: Arc<Schema>) -> DriverResult<Arc<dyn PhysicalModel>> {
        let db = self
            .shared
            .db
            .as_ref()
            .ok_or_else(|| DriverError::NotConnected(self.shared.uri.clone()))?;
        if self.shared.models.contains_key(name) {
            return Err(DriverError::OverwriteModel(name.to_string()));
        }

        let model = Arc::new(SledModel::open(name, schema, db, Arc::downgrade(&self.shared))?);
        self.shared.register(name, model.clone())?;
        debug!(uri = %self.shared.uri, model = %name, collection = %model.collection(), "bound model");
        Ok(model)
    }

    fn get_model(&self, name: &str) -> Option<Arc<dyn PhysicalModel>> {
        self.shared
            .models
            .get(name)
            .map(|entry| entry.clone() as Arc<dyn PhysicalModel>)
    }

    fn set(&self, key: &str, value: Value) {
        self.settings.insert(key.to_string(), value);
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.settings.get(key).map(|entry| entry.clone())
    }
}

impl fmt::Debug for SledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SledConnection")
            .field("uri", &self.shared.uri)
            .field("connected", &self.shared.db.is_some())
            .field("models", &self.model_names())
            .finish()
    }
}
