//! Built-in capability mixins.

pub mod data_level;
pub mod soft_delete;
pub mod timestamp;

use crate::store::{DeclarationId, MetadataStore};

/// Name of the application base declaration.
pub const A7_MODEL: &str = "A7Model";

/// Ids of the built-in declarations of one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtins {
    /// `createdAt` / `lastUpdateTime` mixin.
    pub timestamp: DeclarationId,
    /// `deleted` flag mixin.
    pub soft_delete: DeclarationId,
    /// Data-level projection mixin.
    pub data_level: DeclarationId,
    /// Application base: timestamps plus data levels.
    pub a7_model: DeclarationId,
}

impl Builtins {
    /// Declare every built-in in `store`.
    pub fn declare(store: &mut MetadataStore) -> Self {
        let timestamp = timestamp::declare(store);
        let soft_delete = soft_delete::declare(store);
        let data_level = data_level::declare(store);
        let a7_model = store
            .declare(A7_MODEL)
            .mixin(timestamp)
            .mixin(data_level)
            .build();

        Self {
            timestamp,
            soft_delete,
            data_level,
            a7_model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{Composer, CompositionConfig, DEFAULT_TENANT};
    use crate::document::{Document, Fields};
    use crate::query::Query;
    use crate::schema::field::FieldOptions;
    use crate::schema::hooks::{HookError, FIND, FIND_ONE_AND_UPDATE, REMOVE, SAVE};
    use crate::schema::{HookStage, Schema, DATA_LEVEL, MAXIMAL, MINIMAL};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn compile(build: impl FnOnce(&mut MetadataStore, Builtins) -> DeclarationId) -> Arc<Schema> {
        let mut store = MetadataStore::new();
        let builtins = Builtins::declare(&mut store);
        let id = build(&mut store, builtins);
        let composer = Composer::new(Arc::new(store), CompositionConfig::new());
        composer.compile(id, DEFAULT_TENANT).unwrap().schema.clone()
    }

    #[test]
    fn test_timestamps() {
        let schema = compile(|store, b| store.declare("Note").mixin(b.timestamp).build());

        let fields = schema.instantiate(Fields::new());
        assert!(fields.get(timestamp::CREATED_AT).is_some_and(Value::is_i64));
        assert!(schema.field(timestamp::LAST_UPDATE_TIME).unwrap().options.is_indexed());

        let mut doc = Document::new("Note", fields);
        schema.run_document_hooks(HookStage::Pre, SAVE, &mut doc).unwrap();
        assert!(doc.get(timestamp::LAST_UPDATE_TIME).is_some());

        let mut query = Query::new();
        schema
            .run_query_hooks(HookStage::Pre, FIND_ONE_AND_UPDATE, &mut query)
            .unwrap();
        assert!(query.update.set.contains_key(timestamp::LAST_UPDATE_TIME));
        assert!(query.update.set_on_insert.contains_key(timestamp::CREATED_AT));
    }

    #[test]
    fn test_soft_delete() {
        let schema = compile(|store, b| store.declare("Note").mixin(b.soft_delete).build());

        let mut doc = Document::new("Note", schema.instantiate(Fields::new()));
        assert_eq!(doc.get(soft_delete::DELETED), Some(&json!(false)));
        assert_eq!(
            schema.run_document_hooks(HookStage::Pre, REMOVE, &mut doc),
            Err(HookError::Rejected(soft_delete::REMOVE_REJECTED.into()))
        );

        assert_eq!(schema.call_method(&mut doc, soft_delete::DELETE_METHOD, &[]), Ok(json!(true)));
        assert_eq!(schema.call_method(&mut doc, soft_delete::DELETE_METHOD, &[]), Ok(json!(false)));
        assert_eq!(doc.get(soft_delete::DELETED), Some(&json!(true)));

        let mut query = Query::new();
        schema.run_query_hooks(HookStage::Pre, FIND, &mut query).unwrap();
        assert_eq!(query.conditions.get(soft_delete::DELETED), Some(&json!(false)));

        let mut query = Query::new().with_deleted();
        schema.run_query_hooks(HookStage::Pre, FIND, &mut query).unwrap();
        assert!(query.conditions.is_empty());

        let mut query = Query::new().eq(soft_delete::DELETED, true);
        schema.run_query_hooks(HookStage::Pre, FIND, &mut query).unwrap();
        assert_eq!(query.conditions.get(soft_delete::DELETED), Some(&json!(true)));
    }

    #[test]
    fn test_data_levels() {
        let schema = compile(|store, b| {
            store
                .declare("Profile")
                .mixin(b.data_level)
                .option(DATA_LEVEL, json!({ "levels": ["SHORT", "DETAIL"], "default": "SHORT" }))
                .field("name", FieldOptions::of::<String>())
                .field("bio", FieldOptions::of::<String>().level("DETAIL"))
                .field("secret", FieldOptions::of::<String>().level("HIDDEN"))
                .build()
        });

        assert_eq!(schema.level_paths(MINIMAL), vec!["_id", "name"]);
        assert_eq!(schema.level_paths("SHORT"), vec!["_id", "name"]);
        assert_eq!(schema.level_paths("DETAIL"), vec!["_id", "name", "bio"]);
        assert_eq!(schema.level_paths(MAXIMAL), vec!["_id", "name", "bio", "secret"]);

        let mut query = Query::new();
        schema.run_query_hooks(HookStage::Pre, FIND, &mut query).unwrap();
        assert_eq!(query.projection, Some(vec!["_id".to_string(), "name".to_string()]));

        let mut query = Query::new().level(MAXIMAL);
        schema.run_query_hooks(HookStage::Pre, "findOne", &mut query).unwrap();
        assert_eq!(query.projection.map(|p| p.len()), Some(4));

        let mut fields = Fields::new();
        fields.insert("name".into(), json!("ana"));
        fields.insert("bio".into(), json!("long"));
        let doc = Document::new("Profile", fields);
        assert_eq!(
            Value::Object(data_level::to_json(&schema, &doc, Some("SHORT"))),
            json!({ "name": "ana" })
        );
        assert_eq!(data_level::to_json(&schema, &doc, None).len(), 2);
    }

    #[test]
    fn test_data_levels_reach_ancestors() {
        let mut store = MetadataStore::new();
        let builtins = Builtins::declare(&mut store);
        let base = store
            .declare("Base")
            .field("title", FieldOptions::of::<String>())
            .build();
        let child = store
            .declare("Child")
            .extends(base)
            .mixin(builtins.data_level)
            .field("extra", FieldOptions::of::<String>())
            .build();
        let composer = Composer::new(Arc::new(store), CompositionConfig::new());

        let compiled = composer.compile(child, DEFAULT_TENANT).unwrap();
        let parent = compiled.schema.parent().unwrap();
        assert!(parent.level_paths(MAXIMAL).contains(&"extra".to_string()));
    }

    #[test]
    fn test_a7_model() {
        let schema = compile(|store, b| {
            store
                .declare("Article")
                .extends(b.a7_model)
                .field("title", FieldOptions::of::<String>())
                .build()
        });
        assert!(schema.field(timestamp::CREATED_AT).is_some());
        assert!(schema.level_paths(MAXIMAL).contains(&"title".to_string()));
        assert_eq!(schema.parent().map(|p| p.name()), Some(A7_MODEL));
    }
}
