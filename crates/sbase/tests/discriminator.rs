//! Discriminator sub-models sharing their base collection.

use sbase::base::schema::DISCRIMINATOR_KEY;
use sbase::prelude::*;

fn fields(value: Value) -> Fields {
    value.as_object().cloned().unwrap_or_default()
}

fn declare_events(store: &mut MetadataStore) -> (DeclarationId, DeclarationId) {
    let event = store
        .declare("Event")
        .option(DISCRIMINATOR_KEY, "kind")
        .field("at", FieldOptions::of::<i64>())
        .build();
    let click = store
        .declare("ClickEvent")
        .extends(event)
        .field("posX", FieldOptions::of::<i64>())
        .field("posY", FieldOptions::of::<i64>())
        .build();
    (event, click)
}

#[tokio::test]
async fn test_base_and_sub_share_collection() {
    let mut store = MetadataStore::new();
    let (event, click) = declare_events(&mut store);
    let registrar = sbase::sled_registrar(store, MultiTenancyConfig::single("mem://discriminator"));

    let events = registrar.register(event).unwrap();
    let clicks = registrar.discriminator(events.as_ref(), click).unwrap();

    let plain = events.create(fields(json!({ "at": 1, "posX": 10 }))).await.unwrap();
    assert!(plain.get("posX").is_none());

    let clicked = clicks
        .create(fields(json!({ "at": 2, "posX": 20, "posY": 30 })))
        .await
        .unwrap();
    assert_eq!(clicked.get("kind"), Some(&json!("ClickEvent")));
    assert_eq!(clicked.get("posX"), Some(&json!(20)));

    let all = events.find(Query::new()).await.unwrap();
    let mut models: Vec<&str> = all.iter().map(|d| d.model()).collect();
    models.sort_unstable();
    assert_eq!(models, vec!["ClickEvent", "Event"]);

    let click = all.iter().find(|d| d.model() == "ClickEvent").unwrap();
    assert!(click.is_instance_of("ClickEvent"));
    assert_eq!(click.get("posX"), Some(&json!(20)));
    assert_eq!(click.get("posY"), Some(&json!(30)));

    assert_eq!(clicks.count(Query::new()).await.unwrap(), 1);
    let late = clicks
        .find(Query::new().eq("at", json!({ "$gte": 2 })))
        .await
        .unwrap();
    assert_eq!(late.len(), 1);
    assert!(late[0].is_instance_of("ClickEvent"));
}

#[tokio::test]
async fn test_sub_inherits_base_behaviour() {
    let mut store = MetadataStore::new();
    let builtins = Builtins::declare(&mut store);
    let note = store
        .declare("Note")
        .extends(builtins.a7_model)
        .field("text", required())
        .build();
    let pinned = store
        .declare("PinnedNote")
        .extends(note)
        .field("rank", default_value(0))
        .build();
    let registrar = sbase::sled_registrar(store, MultiTenancyConfig::single("mem://discriminator-a7"));

    let notes = registrar.register_a7_model(note).unwrap();
    let pins = registrar.discriminator_a7_model(notes.as_ref(), pinned).unwrap();

    let pin = pins.create(fields(json!({ "text": "hi" }))).await.unwrap();
    assert_eq!(pin.get("rank"), Some(&json!(0)));
    assert!(pin.get("createdAt").is_some());
    assert!(pin.get("lastUpdateTime").is_some());

    let err = pins.create(Fields::new()).await.unwrap_err();
    assert!(err.to_string().contains("text"));
}
