//! Tenant-routed models.
//!
//! Every operation on a logical model is classified by [`Operation::shape`]:
//! shared operations fan out to every tenant, lazy operations resolve the
//! tenant only when finally invoked, and all others resolve the current tenant
//! eagerly and delegate to that tenant's physical model.

mod direct;
mod lazy;
mod tenant;

use std::sync::Arc;

use async_trait::async_trait;
use sbase_core::{Document, Fields, Listener, PhysicalModel, Query, Schema};
use serde_json::Value;

pub use direct::DirectModel;
pub use lazy::LazyStatic;
pub use tenant::TenantRouter;

use crate::error::{Error, Result};

/// Operations of a routed model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Insert a new document.
    Create,
    /// Insert several documents.
    InsertMany,
    /// Insert or replace a document.
    Save,
    /// Remove a document.
    Remove,
    /// Query documents.
    Find,
    /// Query one document.
    FindOne,
    /// Update one document.
    FindOneAndUpdate,
    /// Count documents.
    Count,
    /// Delete documents.
    DeleteMany,
    /// Resolve references.
    Populate,
    /// Read the bound schema.
    Schema,
    /// Write a model property.
    SetProperty,
    /// Read a model property.
    GetProperty,
    /// Register a change listener.
    On,
    /// Call a static.
    CallStatic,
}

/// How an operation picks its tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    /// Run on every tenant.
    Shared,
    /// Resolve the tenant when the returned handle is invoked.
    Lazy,
    /// Resolve the tenant now.
    Current,
}

/// Operations that fan out to every tenant.
pub const SHARED_OPERATIONS: &[Operation] = &[Operation::On];

/// Operations whose tenant is resolved at invocation time.
pub const LAZY_OPERATIONS: &[Operation] = &[Operation::CallStatic];

impl Operation {
    /// Every operation.
    pub const ALL: [Operation; 15] = [
        Operation::Create,
        Operation::InsertMany,
        Operation::Save,
        Operation::Remove,
        Operation::Find,
        Operation::FindOne,
        Operation::FindOneAndUpdate,
        Operation::Count,
        Operation::DeleteMany,
        Operation::Populate,
        Operation::Schema,
        Operation::SetProperty,
        Operation::GetProperty,
        Operation::On,
        Operation::CallStatic,
    ];

    /// Operation name, passed to the tenancy function.
    pub fn name(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::InsertMany => "insertMany",
            Operation::Save => "save",
            Operation::Remove => "remove",
            Operation::Find => "find",
            Operation::FindOne => "findOne",
            Operation::FindOneAndUpdate => "findOneAndUpdate",
            Operation::Count => "count",
            Operation::DeleteMany => "deleteMany",
            Operation::Populate => "populate",
            Operation::Schema => "schema",
            Operation::SetProperty => "setProperty",
            Operation::GetProperty => "getProperty",
            Operation::On => "on",
            Operation::CallStatic => "callStatic",
        }
    }

    /// Routing shape.
    pub fn shape(self) -> CallShape {
        if SHARED_OPERATIONS.contains(&self) {
            CallShape::Shared
        } else if LAZY_OPERATIONS.contains(&self) {
            CallShape::Lazy
        } else {
            CallShape::Current
        }
    }
}

/// Physical models keyed by tenant, in tenant order.
#[derive(Debug, Clone, Default)]
pub struct TenantMap {
    entries: Vec<(String, Arc<dyn PhysicalModel>)>,
}

impl TenantMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a tenant's model.
    pub fn insert(&mut self, tenant: impl Into<String>, model: Arc<dyn PhysicalModel>) {
        let tenant = tenant.into();
        match self.entries.iter_mut().find(|(t, _)| *t == tenant) {
            Some(entry) => entry.1 = model,
            None => self.entries.push((tenant, model)),
        }
    }

    /// A tenant's model.
    pub fn get(&self, tenant: &str) -> Option<&Arc<dyn PhysicalModel>> {
        self.entries.iter().find(|(t, _)| t == tenant).map(|(_, m)| m)
    }

    /// Tenant ids in order.
    pub fn tenants(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    /// Entries in tenant order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn PhysicalModel>)> {
        self.entries.iter().map(|(t, m)| (t.as_str(), m))
    }

    /// Number of tenants.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where an operation goes.
#[derive(Debug)]
pub enum Route {
    /// The current tenant's model.
    One(Arc<dyn PhysicalModel>),
    /// Every tenant's model.
    All(Vec<Arc<dyn PhysicalModel>>),
    /// A handle resolving its tenant later.
    Deferred(LazyStatic),
}

impl Route {
    /// The single model of a current-tenant route.
    pub fn one(self, operation: Operation) -> Result<Arc<dyn PhysicalModel>> {
        match self {
            Route::One(model) => Ok(model),
            _ => Err(Error::Unroutable(operation.name())),
        }
    }

    /// The models of a shared route.
    pub fn all(self, operation: Operation) -> Result<Vec<Arc<dyn PhysicalModel>>> {
        match self {
            Route::All(models) => Ok(models),
            _ => Err(Error::Unroutable(operation.name())),
        }
    }

    /// The handle of a lazy route.
    pub fn deferred(self, operation: Operation) -> Result<LazyStatic> {
        match self {
            Route::Deferred(handle) => Ok(handle),
            _ => Err(Error::Unroutable(operation.name())),
        }
    }
}

/// A logical model that forwards every operation to a physical model.
#[async_trait]
pub trait TenantRoutedModel: Send + Sync {
    /// Logical model name.
    fn name(&self) -> &str;

    /// Physical models by tenant.
    fn tenant_map(&self) -> &TenantMap;

    /// The physical model of the tenant the tenancy function picks for
    /// `context` (an operation, property or static name).
    fn resolve(&self, context: &str) -> Result<Arc<dyn PhysicalModel>>;

    /// A handle to the static `name` that resolves its tenant when called.
    fn lazy(&self, name: &str) -> LazyStatic;

    /// Every tenant's physical model, in tenant order.
    fn models(&self) -> Vec<Arc<dyn PhysicalModel>> {
        self.tenant_map().iter().map(|(_, m)| m.clone()).collect()
    }

    /// Route an operation.
    fn route(&self, operation: Operation, context: &str) -> Result<Route> {
        Ok(match operation.shape() {
            CallShape::Shared => Route::All(self.models()),
            CallShape::Lazy => Route::Deferred(self.lazy(context)),
            CallShape::Current => Route::One(self.resolve(context)?),
        })
    }

    /// Insert a new document.
    async fn create(&self, fields: Fields) -> Result<Document> {
        let op = Operation::Create;
        Ok(self.route(op, op.name())?.one(op)?.create(fields).await?)
    }

    /// Insert several documents.
    async fn insert_many(&self, documents: Vec<Fields>) -> Result<Vec<Document>> {
        let op = Operation::InsertMany;
        Ok(self.route(op, op.name())?.one(op)?.insert_many(documents).await?)
    }

    /// Insert or replace a document.
    async fn save(&self, document: Document) -> Result<Document> {
        let op = Operation::Save;
        Ok(self.route(op, op.name())?.one(op)?.save(document).await?)
    }

    /// Remove a document.
    async fn remove(&self, document: Document) -> Result<Document> {
        let op = Operation::Remove;
        Ok(self.route(op, op.name())?.one(op)?.remove(document).await?)
    }

    /// Query documents.
    async fn find(&self, query: Query) -> Result<Vec<Document>> {
        let op = Operation::Find;
        Ok(self.route(op, op.name())?.one(op)?.find(query).await?)
    }

    /// Query one document.
    async fn find_one(&self, query: Query) -> Result<Option<Document>> {
        let op = Operation::FindOne;
        Ok(self.route(op, op.name())?.one(op)?.find_one(query).await?)
    }

    /// Update one document.
    async fn find_one_and_update(&self, query: Query) -> Result<Option<Document>> {
        let op = Operation::FindOneAndUpdate;
        Ok(self
            .route(op, op.name())?
            .one(op)?
            .find_one_and_update(query)
            .await?)
    }

    /// Count documents.
    async fn count(&self, query: Query) -> Result<usize> {
        let op = Operation::Count;
        Ok(self.route(op, op.name())?.one(op)?.count(query).await?)
    }

    /// Delete documents.
    async fn delete_many(&self, query: Query) -> Result<usize> {
        let op = Operation::DeleteMany;
        Ok(self.route(op, op.name())?.one(op)?.delete_many(query).await?)
    }

    /// Resolve references at `paths`.
    async fn populate(&self, documents: Vec<Document>, paths: &[String]) -> Result<Vec<Document>> {
        let op = Operation::Populate;
        Ok(self
            .route(op, op.name())?
            .one(op)?
            .populate(documents, paths)
            .await?)
    }

    /// The current tenant's schema.
    fn schema(&self) -> Result<Arc<Schema>> {
        let op = Operation::Schema;
        Ok(self.route(op, op.name())?.one(op)?.schema())
    }

    /// Write a property on the current tenant's model.
    fn set_property(&self, key: &str, value: Value) -> Result<()> {
        self.route(Operation::SetProperty, key)?
            .one(Operation::SetProperty)?
            .set_property(key, value);
        Ok(())
    }

    /// Read a property of the current tenant's model.
    fn get_property(&self, key: &str) -> Result<Option<Value>> {
        Ok(self
            .route(Operation::GetProperty, key)?
            .one(Operation::GetProperty)?
            .get_property(key))
    }

    /// Register a listener on every tenant, returning the listener ids.
    fn on(&self, listener: Listener) -> Result<Vec<usize>> {
        let op = Operation::On;
        Ok(self
            .route(op, op.name())?
            .all(op)?
            .iter()
            .map(|model| model.on(listener.clone()))
            .collect())
    }

    /// A static of the model, resolved when invoked.
    fn static_fn(&self, name: &str) -> Result<LazyStatic> {
        self.route(Operation::CallStatic, name)?
            .deferred(Operation::CallStatic)
    }

    /// Call a static on the tenant current at call time.
    async fn call_static(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        self.static_fn(name)?.call(args).await
    }
}
