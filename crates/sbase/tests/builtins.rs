//! Built-in mixins against the sled driver.

use sbase::base::builtin::{soft_delete, timestamp};
use sbase::base::schema::DATA_LEVEL;
use sbase::prelude::*;

fn fields(value: Value) -> Fields {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_soft_delete_flow() {
    let mut store = MetadataStore::new();
    let builtins = Builtins::declare(&mut store);
    let task = store
        .declare("Task")
        .mixin(builtins.soft_delete)
        .field("title", required())
        .build();
    let registrar = sbase::sled_registrar(store, MultiTenancyConfig::single("mem://builtins-soft"));
    let tasks = registrar.register(task).unwrap();

    let mut doc = tasks.create(fields(json!({ "title": "a" }))).await.unwrap();
    tasks.create(fields(json!({ "title": "b" }))).await.unwrap();

    let err = tasks.remove(doc.clone()).await.unwrap_err();
    assert!(err.to_string().contains(soft_delete::REMOVE_REJECTED));

    let schema = tasks.schema().unwrap();
    assert_eq!(
        schema.call_method(&mut doc, soft_delete::DELETE_METHOD, &[]),
        Ok(json!(true))
    );
    tasks.save(doc).await.unwrap();

    assert_eq!(tasks.count(Query::new()).await.unwrap(), 1);
    assert_eq!(tasks.find(Query::new().with_deleted()).await.unwrap().len(), 2);
    let deleted = tasks
        .find_one(Query::new().eq(soft_delete::DELETED, true))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(deleted.get("title"), Some(&json!("a")));
}

#[tokio::test]
async fn test_timestamps_on_save_and_upsert() {
    let mut store = MetadataStore::new();
    let builtins = Builtins::declare(&mut store);
    let counter = store
        .declare("Counter")
        .mixin(builtins.timestamp)
        .field("key", required())
        .field("value", default_value(0))
        .build();
    let registrar = sbase::sled_registrar(store, MultiTenancyConfig::single("mem://builtins-time"));
    let counters = registrar.register(counter).unwrap();

    let saved = counters.create(fields(json!({ "key": "a" }))).await.unwrap();
    assert!(saved.get(timestamp::CREATED_AT).is_some_and(Value::is_i64));
    assert!(saved.get(timestamp::LAST_UPDATE_TIME).is_some_and(Value::is_i64));

    let upserted = counters
        .find_one_and_update(
            Query::new()
                .eq("key", "b")
                .set("value", 3)
                .upsert()
                .return_new(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(upserted.get("value"), Some(&json!(3)));
    assert!(upserted.get(timestamp::CREATED_AT).is_some());
    assert!(upserted.get(timestamp::LAST_UPDATE_TIME).is_some());

    let indexes = counters.schema().unwrap().indexes();
    assert!(indexes
        .iter()
        .any(|index| index.fields == vec![(timestamp::LAST_UPDATE_TIME.to_string(), 1)]));
}

#[tokio::test]
async fn test_data_level_projection() {
    let mut store = MetadataStore::new();
    let builtins = Builtins::declare(&mut store);
    let profile = store
        .declare("Profile")
        .extends(builtins.a7_model)
        .option(DATA_LEVEL, json!({ "levels": ["CARD", "DETAIL"], "default": "CARD" }))
        .field("name", required())
        .field("bio", FieldOptions::of::<String>().level("DETAIL"))
        .build();
    let registrar = sbase::sled_registrar(store, MultiTenancyConfig::single("mem://builtins-level"));
    let profiles = registrar.register_a7_model(profile).unwrap();

    profiles
        .create(fields(json!({ "name": "ana", "bio": "long story" })))
        .await
        .unwrap();

    let card = profiles.find_one(Query::new()).await.unwrap().unwrap();
    assert_eq!(card.get("name"), Some(&json!("ana")));
    assert!(card.get("bio").is_none());

    let detail = profiles
        .find_one(Query::new().level("DETAIL"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detail.get("bio"), Some(&json!("long story")));
}
