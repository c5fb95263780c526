use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::merge::{MergedMetadata, Source};
use super::naming::{self, RESERVED_METHODS, RESERVED_STATICS};
use super::resolver::resolve;
use super::{CompiledSchema, CompositionConfig};
use crate::error::{Error, Result};
use crate::schema::field::FieldDef;
use crate::schema::types::{DefaultValue, FieldType, SchemaSlot};
use crate::schema::{Schema, SchemaOptions, COLLECTION};
use crate::store::{DeclarationId, MetadataStore};

type CacheKey = (DeclarationId, String);

/// A compile-cache entry.
///
/// Inserted before the schema is built; `schema` is handed to fields that
/// reference the declaration while it is still compiling.
struct CacheSlot {
    compiled: OnceLock<Arc<CompiledSchema>>,
    schema: SchemaSlot,
}

impl CacheSlot {
    fn new() -> Self {
        Self {
            compiled: OnceLock::new(),
            schema: SchemaSlot::new(),
        }
    }
}

/// Compiles declarations into per-tenant schemas and caches the results.
///
/// Compilation is synchronous and meant to run at startup. The cache lock is
/// held only for lookups and inserts, never while a schema is being built.
pub struct Composer {
    store: Arc<MetadataStore>,
    config: CompositionConfig,
    merged: Mutex<HashMap<DeclarationId, Arc<MergedMetadata>>>,
    cache: Mutex<HashMap<CacheKey, Arc<CacheSlot>>>,
}

impl Composer {
    /// Create a composer over a finished metadata store.
    pub fn new(store: Arc<MetadataStore>, config: CompositionConfig) -> Self {
        Self {
            store,
            config,
            merged: Mutex::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The metadata store.
    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    /// The composition config.
    pub fn config(&self) -> &CompositionConfig {
        &self.config
    }

    /// Merged metadata of a declaration, independent of any tenant.
    pub fn merged(&self, id: DeclarationId) -> Result<Arc<MergedMetadata>> {
        let cached = self.merged.lock().get(&id).cloned();
        if let Some(merged) = cached {
            return Ok(merged);
        }

        let sources = resolve(&self.store, id)?;
        let inherited = sources
            .inherited()
            .map(|source| self.merged(source))
            .collect::<Result<Vec<_>>>()?;
        let own = &self.store.get(id)?.fragments;

        let merged = Arc::new(MergedMetadata::merge(
            inherited
                .iter()
                .map(|m| Source::Merged(m.as_ref()))
                .chain(std::iter::once(Source::Own(own))),
        ));
        self.merged.lock().insert(id, merged.clone());
        Ok(merged)
    }

    /// Compile `id` for `tenant`, or return the cached result.
    pub fn compile(&self, id: DeclarationId, tenant: &str) -> Result<Arc<CompiledSchema>> {
        self.compile_slot(id, tenant).map(|(_, compiled)| compiled)
    }

    /// Handle to the schema of `id` for `tenant`.
    ///
    /// When the declaration is still compiling the handle is returned unfilled;
    /// it is filled once that compilation finishes.
    pub fn schema_handle(&self, id: DeclarationId, tenant: &str) -> Result<SchemaSlot> {
        let existing = self.cache.lock().get(&(id, tenant.to_string())).cloned();
        match existing {
            Some(slot) => Ok(slot.schema.clone()),
            None => self
                .compile_slot(id, tenant)
                .map(|(slot, _)| slot.schema.clone()),
        }
    }

    /// Check whether `id` has a finished schema for `tenant`.
    pub fn is_compiled(&self, id: DeclarationId, tenant: &str) -> bool {
        self.cache
            .lock()
            .get(&(id, tenant.to_string()))
            .is_some_and(|slot| slot.compiled.get().is_some())
    }

    /// Drop every cached result of `id`. Declarations that embed or extend
    /// it keep their own results.
    ///
    /// A schema that reaches itself through embedded fields or a parent
    /// link holds a reference cycle and is not freed by invalidation. Its
    /// memory lives until the process exits.
    pub fn invalidate(&self, id: DeclarationId) {
        self.merged.lock().remove(&id);
        self.cache.lock().retain(|(declaration, _), _| *declaration != id);
        debug!(declaration = %id, "invalidated compiled schemas");
    }

    fn compile_slot(
        &self,
        id: DeclarationId,
        tenant: &str,
    ) -> Result<(Arc<CacheSlot>, Arc<CompiledSchema>)> {
        let key = (id, tenant.to_string());
        let (slot, fresh) = match self.cache.lock().entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => (entry.insert(Arc::new(CacheSlot::new())).clone(), true),
        };

        if let Some(compiled) = slot.compiled.get() {
            trace!(declaration = %compiled.name(), tenant = %tenant, "compile cache hit");
            return Ok((slot.clone(), compiled.clone()));
        }
        if !fresh {
            return Err(Error::CompilationInProgress {
                declaration: self.store.name(id)?.to_string(),
                tenant: tenant.to_string(),
            });
        }

        match self.build(id, tenant) {
            Ok(compiled) => {
                let compiled = Arc::new(compiled);
                slot.schema.fill(compiled.schema.clone());
                let _ = slot.compiled.set(compiled.clone());
                Ok((slot, compiled))
            }
            Err(err) => {
                self.cache.lock().remove(&key);
                Err(err)
            }
        }
    }

    fn build(&self, id: DeclarationId, tenant: &str) -> Result<CompiledSchema> {
        let declaration = self.store.get(id)?;
        let name = declaration.name.clone();
        debug!(declaration = %name, tenant = %tenant, "compiling declaration");

        let mut metadata = (*self.merged(id)?).clone();
        for field in &mut metadata.fields {
            self.resolve_field(field, tenant)?;
        }

        let mut options = SchemaOptions::from(metadata.config.clone());
        let collection = options
            .collection()
            .map(str::to_string)
            .unwrap_or_else(|| naming::default_collection(&name));
        options.set(
            COLLECTION,
            naming::physical_collection(&self.config, tenant, &collection),
        );

        let mut schema = Schema::new(name.clone(), metadata.fields.clone(), options);

        if let Some(parent) = declaration.parent {
            schema.set_parent(self.schema_handle(parent, tenant)?);
        }

        for hook in &metadata.pres {
            schema.pre(hook.clone());
        }
        for hook in &metadata.posts {
            schema.post(hook.clone());
        }

        for virtual_field in &metadata.virtuals {
            if schema.field(&virtual_field.name).is_some() {
                return Err(Error::VirtualConflict {
                    declaration: name,
                    name: virtual_field.name.clone(),
                });
            }
            schema.add_virtual(virtual_field.clone());
        }

        for method in &metadata.methods {
            if RESERVED_METHODS.contains(&method.name.as_str()) {
                warn!(declaration = %name, method = %method.name, "skipping reserved method name");
                continue;
            }
            schema.add_method(method.clone());
        }
        for method in &metadata.statics {
            if RESERVED_STATICS.contains(&method.name.as_str()) {
                warn!(declaration = %name, method = %method.name, "skipping reserved static name");
                continue;
            }
            schema.add_static(method.clone());
        }

        for plugin in &metadata.plugins {
            trace!(declaration = %name, plugin = %plugin.name, priority = ?plugin.priority, "applying plugin");
            plugin
                .apply(&mut schema, &metadata.config)
                .map_err(|err| Error::Plugin {
                    declaration: name.clone(),
                    plugin: plugin.name.clone(),
                    message: err.0,
                })?;
        }

        for index in &metadata.indexes {
            if let Some((path, _)) = index.fields.iter().find(|(path, _)| !schema.has_path(path)) {
                return Err(Error::UnknownPath {
                    declaration: name,
                    path: path.clone(),
                });
            }
            schema.add_index(index.clone());
        }

        for validator in &metadata.validators {
            if !schema.has_path(&validator.path) {
                return Err(Error::UnknownPath {
                    declaration: name,
                    path: validator.path.clone(),
                });
            }
            schema.add_validator(validator.clone());
        }

        debug!(
            declaration = %name,
            tenant = %tenant,
            collection = %schema.collection(),
            fields = schema.fields().len(),
            "compiled declaration"
        );

        Ok(CompiledSchema {
            declaration: id,
            tenant: tenant.to_string(),
            metadata,
            schema: Arc::new(schema),
        })
    }

    fn resolve_field(&self, field: &mut FieldDef, tenant: &str) -> Result<()> {
        let Some(declared) = field
            .options
            .field_type
            .clone()
            .or_else(|| field.options.declared_type.clone())
        else {
            return Ok(());
        };

        let resolved = self.resolve_type(declared, tenant)?;
        if let FieldType::Embedded(slot) = &resolved {
            if field.options.default.is_none() {
                field.options.default = Some(DefaultValue::EmptyInstance(slot.clone()));
            }
        }
        field.options.field_type = Some(resolved);
        Ok(())
    }

    fn resolve_type(&self, field_type: FieldType, tenant: &str) -> Result<FieldType> {
        Ok(match field_type {
            FieldType::Model(id) => FieldType::Embedded(self.schema_handle(id, tenant)?),
            FieldType::Array(inner) => FieldType::array(self.resolve_type(*inner, tenant)?),
            FieldType::Map(inner) => FieldType::map(self.resolve_type(*inner, tenant)?),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::DEFAULT_TENANT;
    use crate::document::Fields;
    use crate::schema::field::{required, FieldOptions};
    use crate::schema::hooks::SAVE;
    use crate::schema::methods::{Method, StaticMethod};
    use crate::schema::plugin::{Index, Plugin, PluginError};
    use crate::schema::validator::UpdateValidator;
    use crate::schema::virtuals::Virtual;
    use crate::schema::HookStage;
    use serde_json::{json, Value};

    fn composer(store: MetadataStore) -> Composer {
        Composer::new(Arc::new(store), CompositionConfig::new())
    }

    #[test]
    fn test_inherited_fields_and_precedence() {
        let mut store = MetadataStore::new();
        let stamp = store
            .declare("Stamp")
            .field("createdAt", FieldOptions::of::<crate::schema::types::Date>())
            .field("title", required())
            .build();
        let base = store
            .declare("Base")
            .field("owner", FieldOptions::of::<String>())
            .build();
        let post = store
            .declare("Post")
            .extends(base)
            .mixin(stamp)
            .field("title", FieldOptions::of::<String>())
            .build();

        let composer = composer(store);
        let compiled = composer.compile(post, DEFAULT_TENANT).unwrap();
        let schema = &compiled.schema;

        assert!(schema.field("createdAt").is_some());
        assert!(schema.field("owner").is_some());
        assert!(!schema.field("title").unwrap().options.is_required());
        assert_eq!(schema.parent().map(|p| p.name()), Some("Base"));
        assert_eq!(compiled.collection(), "posts");
    }

    #[test]
    fn test_compile_is_cached() {
        let mut store = MetadataStore::new();
        let user = store.declare("User").field("name", required()).build();
        let composer = composer(store);

        let first = composer.compile(user, DEFAULT_TENANT).unwrap();
        let second = composer.compile(user, DEFAULT_TENANT).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(composer.is_compiled(user, DEFAULT_TENANT));

        composer.invalidate(user);
        assert!(!composer.is_compiled(user, DEFAULT_TENANT));
        let third = composer.compile(user, DEFAULT_TENANT).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_self_referential_schema_terminates() {
        let mut store = MetadataStore::new();
        let node = store.declare("Node").field("label", FieldOptions::of::<String>()).build();
        store
            .edit(node)
            .unwrap()
            .field("next", FieldOptions::model(node));
        let composer = composer(store);

        let compiled = composer.compile(node, DEFAULT_TENANT).unwrap();
        match compiled.schema.field("next").and_then(FieldDef::field_type) {
            Some(FieldType::Embedded(slot)) => {
                assert!(Arc::ptr_eq(slot.get().unwrap(), &compiled.schema));
            }
            other => panic!("expected embedded type, got {other:?}"),
        }
    }

    #[test]
    fn test_invalidate_keeps_self_referential_schema_alive() {
        let mut store = MetadataStore::new();
        let node = store.declare("Node").build();
        store.edit(node).unwrap().field("next", FieldOptions::model(node));
        let plain = store.declare("Plain").build();
        let composer = composer(store);

        let cyclic = Arc::downgrade(&composer.compile(node, DEFAULT_TENANT).unwrap().schema);
        let acyclic = Arc::downgrade(&composer.compile(plain, DEFAULT_TENANT).unwrap().schema);
        composer.invalidate(node);
        composer.invalidate(plain);

        assert!(cyclic.upgrade().is_some());
        assert!(acyclic.upgrade().is_none());
    }

    #[test]
    fn test_mutually_referential_schemas() {
        let mut store = MetadataStore::new();
        let a = store.declare("A").build();
        let b = store.declare("B").embedded("a", a, FieldOptions::new()).build();
        store.edit(a).unwrap().embedded("b", b, FieldOptions::new());
        let composer = composer(store);

        let compiled_a = composer.compile(a, DEFAULT_TENANT).unwrap();
        let compiled_b = composer.compile(b, DEFAULT_TENANT).unwrap();
        assert!(compiled_a.schema.has_path("b.a"));
        assert!(compiled_b.schema.has_path("a.b"));
    }

    #[test]
    fn test_base_embedding_its_subtype_compiles_in_any_order() {
        fn declare(store: &mut MetadataStore) -> (DeclarationId, DeclarationId) {
            let comment = store.declare("Comment").field("text", FieldOptions::of::<String>()).build();
            let reply = store
                .declare("Reply")
                .extends(comment)
                .field("depth", FieldOptions::of::<i64>())
                .build();
            store.edit(comment).unwrap().embedded("pinned", reply, FieldOptions::new());
            (comment, reply)
        }

        let mut store = MetadataStore::new();
        let (comment, reply) = declare(&mut store);
        let base_first = composer(store);
        let compiled_comment = base_first.compile(comment, DEFAULT_TENANT).unwrap();
        let compiled_reply = base_first.compile(reply, DEFAULT_TENANT).unwrap();
        assert!(compiled_comment.schema.has_path("pinned.depth"));
        assert!(Arc::ptr_eq(compiled_reply.schema.parent().unwrap(), &compiled_comment.schema));

        let mut store = MetadataStore::new();
        let (comment, reply) = declare(&mut store);
        let sub_first = composer(store);
        let compiled_reply = sub_first.compile(reply, DEFAULT_TENANT).unwrap();
        let compiled_comment = sub_first.compile(comment, DEFAULT_TENANT).unwrap();
        assert!(compiled_comment.schema.has_path("pinned.text"));
        assert_eq!(compiled_reply.schema.parent().map(|p| p.name()), Some("Comment"));
    }

    #[test]
    fn test_nested_default_is_empty_instance() {
        let mut store = MetadataStore::new();
        let address = store
            .declare("Address")
            .field("city", FieldOptions::of::<String>().default_value("Porto"))
            .build();
        let person = store
            .declare("Person")
            .embedded("home", address, FieldOptions::new())
            .build();
        let composer = composer(store);

        let compiled = composer.compile(person, DEFAULT_TENANT).unwrap();
        let doc = compiled.schema.instantiate(Fields::new());
        assert_eq!(doc.get("home"), Some(&json!({ "city": "Porto" })));
    }

    #[test]
    fn test_tenant_collections() {
        let mut store = MetadataStore::new();
        let user = store.declare("User").option("collection", "people").build();
        let composer = Composer::new(
            Arc::new(store),
            CompositionConfig::new()
                .with_multi_tenancy(true)
                .with_default_collection_namespace("public"),
        );

        assert_eq!(composer.compile(user, DEFAULT_TENANT).unwrap().collection(), "public.people");
        assert_eq!(composer.compile(user, "acme").unwrap().collection(), "acme.people");
    }

    #[test]
    fn test_virtual_conflict() {
        let mut store = MetadataStore::new();
        let user = store
            .declare("User")
            .field("name", FieldOptions::of::<String>())
            .virtual_field(Virtual::getter("name", |_| Value::Null))
            .build();
        let composer = composer(store);

        assert!(matches!(
            composer.compile(user, DEFAULT_TENANT),
            Err(Error::VirtualConflict { .. })
        ));
        // A failed build leaves nothing behind.
        assert!(!composer.is_compiled(user, DEFAULT_TENANT));
    }

    #[test]
    fn test_unknown_validator_path() {
        let mut store = MetadataStore::new();
        let user = store
            .declare("User")
            .update_validator(UpdateValidator::new("missing", |_, _| true))
            .build();
        let composer = composer(store);

        match composer.compile(user, DEFAULT_TENANT) {
            Err(Error::UnknownPath { path, .. }) => assert_eq!(path, "missing"),
            other => panic!("expected unknown path, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_index_path() {
        let mut store = MetadataStore::new();
        let user = store
            .declare("User")
            .field("name", FieldOptions::of::<String>())
            .index(Index::new().asc("name").desc("age"))
            .build();
        let composer = composer(store);

        assert!(matches!(
            composer.compile(user, DEFAULT_TENANT),
            Err(Error::UnknownPath { .. })
        ));
    }

    #[test]
    fn test_plugin_failure_aborts() {
        let mut store = MetadataStore::new();
        let user = store
            .declare("User")
            .plugin(Plugin::new("strict", |_, _| Err(PluginError("nope".into()))))
            .build();
        let composer = composer(store);

        match composer.compile(user, DEFAULT_TENANT) {
            Err(Error::Plugin { plugin, message, .. }) => {
                assert_eq!(plugin, "strict");
                assert_eq!(message, "nope");
            }
            other => panic!("expected plugin error, got {other:?}"),
        }
    }

    #[test]
    fn test_plugins_see_merged_config() {
        let mut store = MetadataStore::new();
        let user = store
            .declare("User")
            .option("greeting", "hello")
            .plugin(
                Plugin::new("echo", |schema, options| {
                    let greeting = options.get("greeting").cloned().unwrap_or(Value::Null);
                    schema.set_option("echo", greeting);
                    Ok(())
                })
                .with_option("suffix", "!"),
            )
            .build();
        let composer = composer(store);

        let compiled = composer.compile(user, DEFAULT_TENANT).unwrap();
        assert_eq!(compiled.schema.options().get("echo"), Some(&json!("hello")));
    }

    #[test]
    fn test_reserved_members_are_skipped() {
        let mut store = MetadataStore::new();
        let user = store
            .declare("User")
            .method(Method::new("save", |_, _| Ok(Value::Null)))
            .method(Method::new("greet", |_, _| Ok(json!("hi"))))
            .static_fn(StaticMethod::new("name", |_, _| Ok(Value::Null)))
            .static_fn(StaticMethod::new("byName", |_, _| Ok(Value::Null)))
            .pre(SAVE, |_| Ok(()))
            .build();
        let composer = composer(store);

        let schema = composer.compile(user, DEFAULT_TENANT).unwrap().schema.clone();
        assert!(schema.method("save").is_none());
        assert!(schema.method("greet").is_some());
        assert!(schema.static_method("name").is_none());
        assert!(schema.static_method("byName").is_some());
        assert_eq!(schema.hooks(HookStage::Pre, SAVE).count(), 1);
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut store = MetadataStore::new();
        let a = store.declare("A").build();
        let b = store.declare("B").extends(a).build();
        store.edit(a).unwrap().mixin(b);
        let composer = composer(store);

        assert!(matches!(
            composer.compile(b, DEFAULT_TENANT),
            Err(Error::InheritanceCycle { .. })
        ));
    }
}
