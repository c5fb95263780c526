//! SBASE Core - Model declarations, schema composition, and the storage driver interface.
//!
//! Declarations are recorded in a [`MetadataStore`], resolved over their
//! parents and mixins, and compiled by the [`Composer`] into per-tenant
//! [`Schema`]s that a [`StorageDriver`] binds to collections.

pub mod builtin;
pub mod compose;
pub mod document;
pub mod driver;
pub mod error;
pub mod query;
pub mod schema;
pub mod store;

pub use builtin::Builtins;
pub use compose::{
    CompiledSchema, Composer, CompositionConfig, MergedMetadata, ResolvedSources, DEFAULT_TENANT,
};
pub use document::{Document, Fields, ID_FIELD};
pub use driver::{
    Connection, ConnectionOptions, DriverError, DriverResult, ErrorCallback, Listener, ModelEvent,
    ModelEventKind, PhysicalModel, StorageDriver,
};
pub use error::{Error, Result};
pub use query::{Query, QueryOptions, Update};
pub use schema::{
    DataLevelConfig, DefaultValue, FieldDef, FieldOptions, FieldType, Hook, HookContext,
    HookError, HookStage, Index, LevelMap, Method, Plugin, PluginError, RelationVirtual, Schema,
    SchemaOptions, SchemaSlot, StaticContext, StaticMethod, StaticType, UpdateValidator,
    ValidationContext, ValidationError, Virtual,
};
pub use store::{DeclarationBuilder, DeclarationId, Fragment, FragmentBag, MetadataStore};

// Field sugar
pub use schema::field::{
    array_field, db_ref, db_ref_array, default_value, enum_field, index_field, map_field, required,
    unique,
};
