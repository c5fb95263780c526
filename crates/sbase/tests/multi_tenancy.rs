//! Tenant routing end to end.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sbase::prelude::*;
use sbase::tenancy::{Error, Operation};

fn fields(value: Value) -> Fields {
    value.as_object().cloned().unwrap_or_default()
}

struct Setup {
    registrar: ModelRegistrar,
    user: DeclarationId,
    current: Arc<Mutex<String>>,
    contexts: Arc<Mutex<Vec<String>>>,
}

fn setup(uri_prefix: &str) -> Setup {
    let mut store = MetadataStore::new();
    let user = store
        .declare("User")
        .field("name", required())
        .build();

    let current = Arc::new(Mutex::new(DEFAULT_TENANT.to_string()));
    let contexts = Arc::new(Mutex::new(Vec::new()));
    let (resolver, seen) = (current.clone(), contexts.clone());

    let uris = HashMap::from([
        (DEFAULT_TENANT.to_string(), format!("mem://{uri_prefix}-main")),
        ("acme".to_string(), format!("mem://{uri_prefix}-acme")),
    ]);
    let settings = MultiTenancySettings {
        enabled: true,
        tenants: vec!["acme".to_string()],
        ..MultiTenancySettings::default()
    };
    let config = MultiTenancyConfig::new(settings)
        .with_tenant_uris(uris)
        .with_tenancy_fn(move |context| {
            seen.lock().unwrap().push(context.to_string());
            resolver.lock().unwrap().clone()
        });

    Setup {
        registrar: sbase::sled_registrar(store, config),
        user,
        current,
        contexts,
    }
}

fn switch(setup: &Setup, tenant: &str) {
    *setup.current.lock().unwrap() = tenant.to_string();
}

#[tokio::test]
async fn test_documents_stay_in_their_tenant() {
    let setup = setup("isolation");
    let users = setup.registrar.register(setup.user).unwrap();
    assert_eq!(users.tenant_map().tenants().collect::<Vec<_>>(), vec!["default", "acme"]);

    users.create(fields(json!({ "name": "main-user" }))).await.unwrap();
    switch(&setup, "acme");
    users.create(fields(json!({ "name": "acme-user" }))).await.unwrap();
    users.create(fields(json!({ "name": "acme-user-2" }))).await.unwrap();

    assert_eq!(users.count(Query::new()).await.unwrap(), 2);
    switch(&setup, DEFAULT_TENANT);
    let main = users.find(Query::new()).await.unwrap();
    assert_eq!(main.len(), 1);
    assert_eq!(main[0].get("name"), Some(&json!("main-user")));

    let acme_model = users.tenant_map().get("acme").unwrap();
    assert_eq!(acme_model.collection(), "acme.users");
    assert_eq!(users.tenant_map().get(DEFAULT_TENANT).unwrap().collection(), "users");
}

#[tokio::test]
async fn test_tenancy_fn_sees_operation_names() {
    let setup = setup("contexts");
    let users = setup.registrar.register(setup.user).unwrap();

    users.find_one(Query::new()).await.unwrap();
    users.set_property("pageSize", json!(5)).unwrap();
    assert_eq!(users.get_property("pageSize").unwrap(), Some(json!(5)));

    let seen = setup.contexts.lock().unwrap().clone();
    assert_eq!(seen, vec![Operation::FindOne.name(), "pageSize", "pageSize"]);
}

#[tokio::test]
async fn test_listeners_fan_out() {
    let setup = setup("listeners");
    let users = setup.registrar.register(setup.user).unwrap();

    let collections = Arc::new(Mutex::new(Vec::new()));
    let sink = collections.clone();
    let ids = users
        .on(Arc::new(move |event: &sbase::base::ModelEvent| {
            sink.lock().unwrap().push(event.collection.clone())
        }))
        .unwrap();
    assert_eq!(ids, vec![0, 0]);

    users.create(fields(json!({ "name": "a" }))).await.unwrap();
    switch(&setup, "acme");
    users.create(fields(json!({ "name": "b" }))).await.unwrap();

    assert_eq!(*collections.lock().unwrap(), vec!["users", "acme.users"]);
}

#[tokio::test]
async fn test_unknown_tenant_is_an_error() {
    let setup = setup("unknown");
    let users = setup.registrar.register(setup.user).unwrap();

    switch(&setup, "globex");
    let err = users.create(fields(json!({ "name": "x" }))).await.unwrap_err();
    assert!(matches!(err, Error::UnknownTenant(ref t) if t == "globex"));
    assert_eq!(err.to_string(), "unknown tenant `globex`");
}

#[test]
fn test_settings_drive_registration() {
    let settings = MultiTenancySettings::from_json(
        r#"{ "enabled": true, "tenants": ["acme", "globex"], "uris": "mem://settings-shared" }"#,
    )
    .unwrap();

    let mut store = MetadataStore::new();
    let user = store.declare("User").build();
    let registrar = sbase::sled_registrar(store, MultiTenancyConfig::new(settings));
    let users = registrar.register(user).unwrap();

    assert_eq!(users.tenant_map().len(), 3);
    assert_eq!(registrar.registry().len(), 3);
    assert_eq!(
        users.tenant_map().get("globex").map(|m| m.collection().to_string()),
        Some("globex.users".to_string())
    );
}
