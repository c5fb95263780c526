//! Physical schema: the executable artifact a model is built from.
//!
//! A [`Schema`] is produced by the composer for one declaration and tenant.
//! It carries the merged fields, options, hooks, virtuals, methods, statics,
//! indexes and path validators, plus the data-level map plugins fill in.

pub mod field;
pub mod hooks;
pub mod methods;
pub mod plugin;
pub mod types;
pub mod validator;
pub mod virtuals;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use field::FieldDef;
pub use field::FieldOptions;
pub use hooks::{Hook, HookContext, HookError, HookTarget};
pub use methods::{Method, StaticContext, StaticMethod};
pub use plugin::{Index, Plugin, PluginError};
pub use types::{DefaultValue, FieldType, SchemaSlot, StaticType};
pub use validator::{UpdateValidator, ValidationContext, ValidationError};
pub use virtuals::{RelationVirtual, Virtual};

use crate::document::{get_path, Document, Fields, ID_FIELD};
use crate::query::Query;

/// Option key of the configured collection.
pub const COLLECTION: &str = "collection";
/// Option key of the discriminator key.
pub const DISCRIMINATOR_KEY: &str = "discriminatorKey";
/// Option key of the data-level configuration.
pub const DATA_LEVEL: &str = "dataLevel";
/// Option key of strict mode.
pub const STRICT: &str = "strict";
/// Discriminator key used when none is configured.
pub const DEFAULT_DISCRIMINATOR_KEY: &str = "__t";

/// The lowest data level; every other level contains it.
pub const MINIMAL: &str = "MINIMAL";
/// The highest data level; contains every path.
pub const MAXIMAL: &str = "MAXIMAL";

/// Schema options, a shallow map merged from `Config` fragments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaOptions(Fields);

impl SchemaOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an option.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Write an option.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Shallow extend: keys of `later` overwrite.
    pub fn extend(&mut self, later: Fields) {
        self.0.extend(later);
    }

    /// The configured collection, if any.
    pub fn collection(&self) -> Option<&str> {
        self.get(COLLECTION).and_then(Value::as_str)
    }

    /// Set the collection.
    pub fn with_collection(self, collection: impl Into<String>) -> Self {
        self.with(COLLECTION, collection.into())
    }

    /// Key storing the runtime model name of specialized documents.
    pub fn discriminator_key(&self) -> &str {
        self.get(DISCRIMINATOR_KEY)
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_DISCRIMINATOR_KEY)
    }

    /// Drop unknown fields on construction. Defaults to true.
    pub fn strict(&self) -> bool {
        self.get(STRICT).and_then(Value::as_bool).unwrap_or(true)
    }

    /// Data-level configuration, when present and well formed.
    pub fn data_level(&self) -> Option<DataLevelConfig> {
        self.get(DATA_LEVEL)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Borrow the raw map.
    pub fn as_fields(&self) -> &Fields {
        &self.0
    }
}

impl From<Fields> for SchemaOptions {
    fn from(fields: Fields) -> Self {
        Self(fields)
    }
}

/// Data-level configuration read from the `dataLevel` option.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataLevelConfig {
    /// Ordered levels; a path at one level is visible at every later level.
    #[serde(default)]
    pub levels: Vec<String>,
    /// Level used for queries that do not name one.
    #[serde(default)]
    pub default: Option<String>,
}

/// Paths visible at each data level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelMap(BTreeMap<String, Vec<String>>);

impl LevelMap {
    /// Add a path to a level, ignoring duplicates.
    pub fn add(&mut self, level: &str, path: &str) {
        let paths = self.0.entry(level.to_string()).or_default();
        if !paths.iter().any(|p| p == path) {
            paths.push(path.to_string());
        }
    }

    /// Paths of a level; empty for unknown levels.
    pub fn paths(&self, level: &str) -> &[String] {
        self.0.get(level).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check whether nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge another map into this one.
    pub fn union(&mut self, other: &LevelMap) {
        for (level, paths) in &other.0 {
            for path in paths {
                self.add(level, path);
            }
        }
    }
}

/// Whether a hook runs before or after its operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    /// Before.
    Pre,
    /// After.
    Post,
}

/// An executable schema.
pub struct Schema {
    name: String,
    fields: Vec<FieldDef>,
    options: SchemaOptions,
    parent: Option<SchemaSlot>,
    pres: Vec<Hook>,
    posts: Vec<Hook>,
    virtuals: Vec<Virtual>,
    methods: Vec<Method>,
    statics: Vec<StaticMethod>,
    indexes: Vec<Index>,
    validators: Vec<UpdateValidator>,
    level_map: RwLock<LevelMap>,
}

impl Schema {
    /// Create a schema with fields and options and nothing else.
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>, options: SchemaOptions) -> Self {
        Self {
            name: name.into(),
            fields,
            options,
            parent: None,
            pres: Vec::new(),
            posts: Vec::new(),
            virtuals: Vec::new(),
            methods: Vec::new(),
            statics: Vec::new(),
            indexes: Vec::new(),
            validators: Vec::new(),
            level_map: RwLock::new(LevelMap::default()),
        }
    }

    /// Declaration name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in merge order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Look up a field by path.
    pub fn field(&self, path: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == path)
    }

    /// Check whether a path is a field, or lies inside a nested schema.
    pub fn has_path(&self, path: &str) -> bool {
        if path == ID_FIELD || self.field(path).is_some() {
            return true;
        }
        let Some((head, rest)) = path.split_once('.') else {
            return false;
        };
        match self.field(head).and_then(FieldDef::field_type) {
            Some(FieldType::Embedded(slot)) => slot.get().is_some_and(|s| s.has_path(rest)),
            Some(FieldType::Mixed) | Some(FieldType::Map(_)) => true,
            _ => false,
        }
    }

    /// Options.
    pub fn options(&self) -> &SchemaOptions {
        &self.options
    }

    /// Set an option.
    pub fn set_option(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.options.set(key, value);
    }

    /// The physical collection name.
    pub fn collection(&self) -> &str {
        self.options.collection().unwrap_or(&self.name)
    }

    /// Parent schema, when the declaration extends another and the parent
    /// has finished compiling.
    pub fn parent(&self) -> Option<&Arc<Schema>> {
        self.parent.as_ref().and_then(SchemaSlot::get)
    }

    /// Handle to the parent schema, filled or not.
    pub fn parent_slot(&self) -> Option<&SchemaSlot> {
        self.parent.as_ref()
    }

    /// Record the parent schema.
    pub fn set_parent(&mut self, parent: SchemaSlot) {
        self.parent = Some(parent);
    }

    /// Ancestors, nearest first. Stops at the first parent still compiling.
    pub fn ancestors(&self) -> impl Iterator<Item = &Arc<Schema>> {
        std::iter::successors(self.parent(), |schema| schema.parent())
    }

    /// Add a hook.
    pub fn add_hook(&mut self, stage: HookStage, hook: Hook) {
        match stage {
            HookStage::Pre => self.pres.push(hook),
            HookStage::Post => self.posts.push(hook),
        }
    }

    /// Add a pre hook.
    pub fn pre(&mut self, hook: Hook) {
        self.add_hook(HookStage::Pre, hook);
    }

    /// Add a post hook.
    pub fn post(&mut self, hook: Hook) {
        self.add_hook(HookStage::Post, hook);
    }

    /// Hooks of a stage bound to `event`, in registration order.
    pub fn hooks<'a>(&'a self, stage: HookStage, event: &'a str) -> impl Iterator<Item = &'a Hook> {
        let hooks = match stage {
            HookStage::Pre => &self.pres,
            HookStage::Post => &self.posts,
        };
        hooks.iter().filter(move |hook| hook.name == event)
    }

    /// Run document hooks. A failing serial hook aborts the chain; failing
    /// parallel hooks are reported after the rest have run.
    pub fn run_document_hooks(
        &self,
        stage: HookStage,
        event: &str,
        document: &mut Document,
    ) -> Result<(), HookError> {
        hooks::run_chain(self.hooks(stage, event), |hook| {
            hook.run(&mut HookContext::for_document(event, self, document))
        })
    }

    /// Run query hooks, with the same failure rules as document hooks.
    pub fn run_query_hooks(
        &self,
        stage: HookStage,
        event: &str,
        query: &mut Query,
    ) -> Result<(), HookError> {
        hooks::run_chain(self.hooks(stage, event), |hook| {
            hook.run(&mut HookContext::for_query(event, self, query))
        })
    }

    /// Add a virtual.
    pub fn add_virtual(&mut self, virtual_field: Virtual) {
        self.virtuals.push(virtual_field);
    }

    /// Virtuals.
    pub fn virtuals(&self) -> &[Virtual] {
        &self.virtuals
    }

    /// Look up a virtual.
    pub fn virtual_field(&self, name: &str) -> Option<&Virtual> {
        self.virtuals.iter().find(|v| v.name == name)
    }

    /// Add an instance method. A later method replaces one with the same name.
    pub fn add_method(&mut self, method: Method) {
        self.methods.retain(|m| m.name != method.name);
        self.methods.push(method);
    }

    /// Look up an instance method.
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Call an instance method on a document.
    pub fn call_method(
        &self,
        document: &mut Document,
        name: &str,
        args: &[Value],
    ) -> Result<Value, HookError> {
        let method = self
            .method(name)
            .ok_or_else(|| HookError::UnknownMethod(name.to_string()))?;
        (method.func)(document, args)
    }

    /// Add a static. A later static replaces one with the same name.
    pub fn add_static(&mut self, method: StaticMethod) {
        self.statics.retain(|m| m.name != method.name);
        self.statics.push(method);
    }

    /// Look up a static.
    pub fn static_method(&self, name: &str) -> Option<&StaticMethod> {
        self.statics.iter().find(|m| m.name == name)
    }

    /// Statics.
    pub fn statics(&self) -> &[StaticMethod] {
        &self.statics
    }

    /// Add an index.
    pub fn add_index(&mut self, index: Index) {
        if !self.indexes.contains(&index) {
            self.indexes.push(index);
        }
    }

    /// Compound indexes plus one single-path index per indexed field.
    pub fn indexes(&self) -> Vec<Index> {
        let mut indexes: Vec<Index> = self
            .fields
            .iter()
            .filter(|f| f.options.is_indexed())
            .map(|f| {
                let index = Index::new().asc(f.name.clone());
                if f.options.unique == Some(true) {
                    index.unique()
                } else {
                    index
                }
            })
            .collect();
        indexes.extend(self.indexes.iter().cloned());
        indexes
    }

    /// Add a path validator.
    pub fn add_validator(&mut self, validator: UpdateValidator) {
        self.validators.push(validator);
    }

    /// Path validators.
    pub fn validators(&self) -> &[UpdateValidator] {
        &self.validators
    }

    /// Register a path at a data level.
    pub fn add_level_path(&self, level: &str, path: &str) {
        self.level_map.write().add(level, path);
    }

    /// Paths visible at a data level.
    pub fn level_paths(&self, level: &str) -> Vec<String> {
        self.level_map.read().paths(level).to_vec()
    }

    /// Snapshot of the data-level map.
    pub fn level_map(&self) -> LevelMap {
        self.level_map.read().clone()
    }

    /// Build the stored field map of a new document.
    ///
    /// In strict mode unknown top-level keys are dropped, except the identity
    /// and the discriminator key. Missing fields receive their defaults, and
    /// provided objects of nested schemas are instantiated recursively.
    pub fn instantiate(&self, fields: Fields) -> Fields {
        let mut stack = Vec::new();
        self.instantiate_guarded(fields, &mut stack)
    }

    fn instantiate_guarded(&self, mut fields: Fields, stack: &mut Vec<*const Schema>) -> Fields {
        stack.push(self as *const Schema);

        if self.options.strict() {
            let discriminator_key = self.options.discriminator_key();
            fields.retain(|key, _| {
                key == ID_FIELD
                    || key == discriminator_key
                    || self.fields.iter().any(|f| {
                        f.name == *key || f.name.split('.').next() == Some(key.as_str())
                    })
            });
        }

        for field in &self.fields {
            match get_path(&fields, &field.name) {
                Some(value) => {
                    if let Some(FieldType::Embedded(slot)) = field.field_type() {
                        let value = value.clone();
                        if let Some(nested) = slot.get() {
                            let value = nested.instantiate_value(value, stack);
                            crate::document::set_path(&mut fields, &field.name, value);
                        }
                    }
                }
                None => {
                    if let Some(value) = self.default_for(field, stack) {
                        crate::document::set_path(&mut fields, &field.name, value);
                    }
                }
            }
        }

        stack.pop();
        fields
    }

    fn instantiate_value(&self, value: Value, stack: &mut Vec<*const Schema>) -> Value {
        match value {
            Value::Object(inner) => Value::Object(self.instantiate_guarded(inner, stack)),
            other => other,
        }
    }

    fn default_for(&self, field: &FieldDef, stack: &mut Vec<*const Schema>) -> Option<Value> {
        match field.options.default.as_ref()? {
            DefaultValue::Value(value) => Some(value.clone()),
            DefaultValue::Now => Some(Value::from(types::now_millis())),
            DefaultValue::Generate(generate) => Some(generate()),
            DefaultValue::EmptyInstance(slot) => {
                let nested = slot.get()?;
                if stack.contains(&Arc::as_ptr(nested)) {
                    return None;
                }
                Some(Value::Object(nested.instantiate_guarded(Fields::new(), stack)))
            }
        }
    }

    /// Validate the stored field map of a document being saved.
    pub fn validate(&self, fields: &Fields) -> Result<(), ValidationError> {
        for field in &self.fields {
            let value = get_path(fields, &field.name);
            let missing = matches!(value, None | Some(Value::Null));

            if missing {
                if field.options.is_required() {
                    return Err(ValidationError::required(&field.name));
                }
                continue;
            }

            if let (Some(allowed), Some(Value::String(s))) = (&field.options.enum_values, value) {
                if !allowed.iter().any(|a| a == s) {
                    return Err(ValidationError::not_in_enum(&field.name, &Value::String(s.clone())));
                }
            }

            if let (Some(FieldType::Embedded(slot)), Some(Value::Object(inner))) =
                (field.field_type(), value)
            {
                if let Some(nested) = slot.get() {
                    nested.validate(inner)?;
                }
            }
        }

        for validator in &self.validators {
            validator.validate_document(fields)?;
        }
        Ok(())
    }

    /// A schema for documents specialized from `self`.
    ///
    /// Fields of `sub` replace same-named fields, options extend, and hooks,
    /// virtuals, methods, statics, indexes and validators are unioned. The
    /// result keeps the base collection and discriminator key.
    pub fn merged_with(&self, sub: &Schema) -> Schema {
        let mut fields = self.fields.clone();
        for field in &sub.fields {
            match fields.iter_mut().find(|f| f.name == field.name) {
                Some(existing) => *existing = field.clone(),
                None => fields.push(field.clone()),
            }
        }

        let mut options = self.options.clone();
        options.extend(sub.options.as_fields().clone());
        if let Some(collection) = self.options.get(COLLECTION) {
            options.set(COLLECTION, collection.clone());
        }
        options.set(DISCRIMINATOR_KEY, self.options.discriminator_key());

        let mut merged = Schema::new(sub.name.clone(), fields, options);
        merged.parent = Some(SchemaSlot::filled(Arc::new(self.snapshot())));
        merged.pres = union(&self.pres, &sub.pres);
        merged.posts = union(&self.posts, &sub.posts);
        merged.virtuals = union(&self.virtuals, &sub.virtuals);
        merged.indexes = union(&self.indexes, &sub.indexes);
        merged.validators = union(&self.validators, &sub.validators);
        for method in self.methods.iter().chain(&sub.methods) {
            merged.add_method(method.clone());
        }
        for method in self.statics.iter().chain(&sub.statics) {
            merged.add_static(method.clone());
        }

        let mut levels = self.level_map();
        levels.union(&sub.level_map.read());
        *merged.level_map.get_mut() = levels;
        merged
    }

    fn snapshot(&self) -> Schema {
        Schema {
            name: self.name.clone(),
            fields: self.fields.clone(),
            options: self.options.clone(),
            parent: self.parent.clone(),
            pres: self.pres.clone(),
            posts: self.posts.clone(),
            virtuals: self.virtuals.clone(),
            methods: self.methods.clone(),
            statics: self.statics.clone(),
            indexes: self.indexes.clone(),
            validators: self.validators.clone(),
            level_map: RwLock::new(self.level_map()),
        }
    }
}

fn union<T: Clone + PartialEq>(first: &[T], second: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(first.len() + second.len());
    for item in first.iter().chain(second) {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("collection", &self.collection())
            .field("fields", &self.fields.iter().map(|f| &f.name).collect::<Vec<_>>())
            .field("parent", &self.parent)
            .field("pres", &self.pres.len())
            .field("posts", &self.posts.len())
            .field("virtuals", &self.virtuals)
            .finish_non_exhaustive()
    }
}
