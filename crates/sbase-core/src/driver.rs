//! Storage driver interface.
//!
//! The composer and router only speak to the document store through these
//! traits. A driver opens [`Connection`]s; a connection binds compiled schemas
//! to collections as [`PhysicalModel`]s.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::document::{Document, Fields};
use crate::query::Query;
use crate::schema::{HookError, Schema, ValidationError};

/// Driver-specific connection options.
pub type ConnectionOptions = Fields;

/// Errors raised by storage drivers.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The connection could not be opened.
    #[error("failed to connect to `{uri}`: {message}")]
    Connection {
        /// Connection URI.
        uri: String,
        /// Failure description.
        message: String,
    },

    /// The connection failed to open earlier and is unusable.
    #[error("connection to `{0}` is not open")]
    NotConnected(String),

    /// A model with this name is already bound to the connection.
    #[error("cannot overwrite model `{0}` once compiled")]
    OverwriteModel(String),

    /// No model with this name is bound to the connection.
    #[error("model `{0}` is not registered")]
    MissingModel(String),

    /// A hook, method or static failed.
    #[error("hook failed: {0}")]
    Hook(#[from] HookError),

    /// A document failed validation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The document has no identity or does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// The document cannot be stored.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Document encoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The underlying store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Driver result alias.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Receives connection errors.
pub type ErrorCallback = Arc<dyn Fn(&DriverError) + Send + Sync>;

/// Kind of change a listener is notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelEventKind {
    /// A document was inserted.
    Create,
    /// A stored document was changed.
    Update,
    /// A document was removed.
    Delete,
}

impl ModelEventKind {
    /// Event name.
    pub fn as_str(self) -> &'static str {
        match self {
            ModelEventKind::Create => "create",
            ModelEventKind::Update => "update",
            ModelEventKind::Delete => "delete",
        }
    }
}

/// A change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEvent {
    /// What happened.
    pub kind: ModelEventKind,
    /// Runtime model of the document.
    pub model: String,
    /// Physical collection.
    pub collection: String,
    /// Document identity.
    pub id: String,
}

/// Change listener.
pub type Listener = Arc<dyn Fn(&ModelEvent) + Send + Sync>;

/// Opens connections to a document store.
pub trait StorageDriver: Send + Sync {
    /// Open a connection.
    ///
    /// Failures are reported to `on_error` and produce a connection whose
    /// [`is_connected`](Connection::is_connected) is false; this never panics.
    fn connect(
        &self,
        uri: &str,
        options: &ConnectionOptions,
        on_error: ErrorCallback,
    ) -> Arc<dyn Connection>;
}

/// An open (or failed) connection.
pub trait Connection: Send + Sync + fmt::Debug {
    /// Connection URI.
    fn uri(&self) -> &str;

    /// Check whether the connection opened successfully.
    fn is_connected(&self) -> bool;

    /// Bind a schema to its collection under `name`.
    fn model(&self, name: &str, schema: Arc<Schema>) -> DriverResult<Arc<dyn PhysicalModel>>;

    /// Look up a bound model.
    fn get_model(&self, name: &str) -> Option<Arc<dyn PhysicalModel>>;

    /// Set a connection option.
    fn set(&self, key: &str, value: Value);

    /// Read a connection option.
    fn get(&self, key: &str) -> Option<Value>;
}

/// A schema bound to a collection of one connection.
#[async_trait]
pub trait PhysicalModel: Send + Sync + fmt::Debug {
    /// Model name.
    fn name(&self) -> &str;

    /// Physical collection.
    fn collection(&self) -> &str;

    /// Bound schema.
    fn schema(&self) -> Arc<Schema>;

    /// Build, validate and insert a document.
    async fn create(&self, fields: Fields) -> DriverResult<Document>;

    /// Insert several documents.
    async fn insert_many(&self, documents: Vec<Fields>) -> DriverResult<Vec<Document>>;

    /// Insert a new document or replace a stored one.
    async fn save(&self, document: Document) -> DriverResult<Document>;

    /// Remove a stored document.
    async fn remove(&self, document: Document) -> DriverResult<Document>;

    /// Find matching documents.
    async fn find(&self, query: Query) -> DriverResult<Vec<Document>>;

    /// Find the first matching document.
    async fn find_one(&self, query: Query) -> DriverResult<Option<Document>>;

    /// Apply the query's update to the first matching document.
    async fn find_one_and_update(&self, query: Query) -> DriverResult<Option<Document>>;

    /// Count matching documents.
    async fn count(&self, query: Query) -> DriverResult<usize>;

    /// Delete matching documents, returning how many were deleted.
    async fn delete_many(&self, query: Query) -> DriverResult<usize>;

    /// Resolve reference fields and relation virtuals at `paths`.
    async fn populate(&self, documents: Vec<Document>, paths: &[String]) -> DriverResult<Vec<Document>>;

    /// Call a static of the schema.
    async fn call_static(&self, name: &str, args: Vec<Value>) -> DriverResult<Value>;

    /// Register a change listener, returning its id.
    fn on(&self, listener: Listener) -> usize;

    /// Set a model property.
    fn set_property(&self, key: &str, value: Value);

    /// Read a model property.
    fn get_property(&self, key: &str) -> Option<Value>;

    /// Specialize this model: documents of the returned model share this
    /// model's collection and are tagged with `name` under the discriminator
    /// key.
    fn discriminator(&self, name: &str, schema: Arc<Schema>) -> DriverResult<Arc<dyn PhysicalModel>>;
}
