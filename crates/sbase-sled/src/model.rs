//! Models bound to a sled tree.
//!
//! Each collection is one [`sled::Tree`] keyed by document id, holding the
//! JSON-encoded field map. Discriminator sub-models share their base's tree
//! and tag documents under the schema's discriminator key.

use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use sbase_core::document::set_path;
use sbase_core::schema::hooks::{COUNT, DELETE_MANY, FIND, FIND_ONE, FIND_ONE_AND_UPDATE, REMOVE, SAVE};
use sbase_core::{
    Document, DriverError, DriverResult, Fields, HookError, HookStage, Listener, ModelEvent,
    ModelEventKind, PhysicalModel, Query, RelationVirtual, Schema, StaticContext, ID_FIELD,
};
use serde_json::Value;
use sled::{Db, Tree};
use tracing::{debug, trace};

use crate::connection::Shared;
use crate::filter;

fn storage(err: sled::Error) -> DriverError {
    DriverError::Storage(err.to_string())
}

/// Models sharing one collection: a base and its discriminators.
struct Family {
    base: String,
    subs: RwLock<Vec<String>>,
}

/// A schema bound to a sled tree.
pub struct SledModel {
    name: String,
    collection: String,
    schema: Arc<Schema>,
    db: Db,
    tree: Tree,
    connection: Weak<Shared>,
    tag: Option<String>,
    family: Arc<Family>,
    listeners: RwLock<Vec<Listener>>,
    properties: DashMap<String, Value>,
}

impl SledModel {
    pub(crate) fn open(
        name: &str,
        schema: Arc<Schema>,
        db: &Db,
        connection: Weak<Shared>,
    ) -> DriverResult<Self> {
        let collection = schema.collection().to_string();
        let tree = db.open_tree(collection.as_bytes()).map_err(storage)?;
        Ok(Self {
            name: name.to_string(),
            collection,
            schema,
            db: db.clone(),
            tree,
            connection,
            tag: None,
            family: Arc::new(Family {
                base: name.to_string(),
                subs: RwLock::new(Vec::new()),
            }),
            listeners: RwLock::new(Vec::new()),
            properties: DashMap::new(),
        })
    }

    /// The discriminator value of this model's documents, for sub-models.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    fn discriminator_key(&self) -> &str {
        self.schema.options().discriminator_key()
    }

    fn connection(&self) -> DriverResult<Arc<Shared>> {
        self.connection
            .upgrade()
            .ok_or_else(|| DriverError::NotConnected(self.collection.clone()))
    }

    fn next_id(&self) -> DriverResult<String> {
        Ok(format!("{:016x}", self.db.generate_id().map_err(storage)?))
    }

    fn in_scope(&self, fields: &Fields) -> bool {
        match &self.tag {
            None => true,
            Some(tag) => fields.get(self.discriminator_key()).and_then(Value::as_str) == Some(tag.as_str()),
        }
    }

    fn hydrate(&self, fields: Fields) -> Document {
        let model = fields
            .get(self.discriminator_key())
            .and_then(Value::as_str)
            .filter(|tag| self.family.subs.read().iter().any(|s| s == tag))
            .map(str::to_string)
            .unwrap_or_else(|| match &self.tag {
                Some(tag) => tag.clone(),
                None => self.family.base.clone(),
            });
        Document::new(model, fields)
    }

    fn load(&self, id: &str) -> DriverResult<Option<Fields>> {
        match self.tree.get(id.as_bytes()).map_err(storage)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write(&self, id: &str, fields: &Fields) -> DriverResult<bool> {
        let bytes = serde_json::to_vec(fields)?;
        let previous = self.tree.insert(id.as_bytes(), bytes).map_err(storage)?;
        Ok(previous.is_some())
    }

    fn scan(&self, conditions: &Fields, limit: Option<usize>) -> DriverResult<Vec<Fields>> {
        let mut out = Vec::new();
        for entry in self.tree.iter() {
            if limit.is_some_and(|limit| out.len() >= limit) {
                break;
            }
            let (_, bytes) = entry.map_err(storage)?;
            let fields: Fields = serde_json::from_slice(&bytes)?;
            if self.in_scope(&fields) && filter::matches(&fields, conditions)? {
                out.push(fields);
            }
        }
        Ok(out)
    }

    fn shape(&self, fields: Fields, query: &Query) -> Document {
        let fields = match &query.projection {
            Some(paths) => filter::project(&fields, paths, self.discriminator_key()),
            None => fields,
        };
        self.hydrate(fields)
    }

    fn emit(&self, kind: ModelEventKind, model: &str, id: &str) {
        let listeners = self.listeners.read().clone();
        if listeners.is_empty() {
            return;
        }
        let event = ModelEvent {
            kind,
            model: model.to_string(),
            collection: self.collection.clone(),
            id: id.to_string(),
        };
        for listener in listeners {
            listener(&event);
        }
    }

    fn tagged(&self, mut fields: Fields) -> Fields {
        if let Some(tag) = &self.tag {
            fields.insert(self.discriminator_key().to_string(), Value::String(tag.clone()));
        }
        fields
    }

    fn query_hooks(&self, stage: HookStage, event: &str, query: &mut Query) -> DriverResult<()> {
        self.schema.run_query_hooks(stage, event, query)?;
        Ok(())
    }

    fn update_one(&self, query: &Query) -> DriverResult<Option<Document>> {
        let existing = self.scan(&query.conditions, Some(1))?.into_iter().next();
        match existing {
            Some(before) => {
                let mut after = before.clone();
                for (path, value) in &query.update.set {
                    set_path(&mut after, path, value.clone());
                }
                let id = after
                    .get(ID_FIELD)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| DriverError::InvalidDocument("stored document has no `_id`".to_string()))?;
                self.write(&id, &after)?;

                let updated = self.hydrate(after.clone());
                self.emit(ModelEventKind::Update, updated.model(), &id);
                let result = if query.options.return_new { after } else { before };
                Ok(Some(self.shape(result, query)))
            }
            None if query.options.upsert => {
                let mut seed = filter::equalities(&query.conditions);
                for (path, value) in query.update.set.iter().chain(&query.update.set_on_insert) {
                    set_path(&mut seed, path, value.clone());
                }
                let mut fields = self.tagged(self.schema.instantiate(seed));
                let id = self.next_id()?;
                fields.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                self.write(&id, &fields)?;
                debug!(model = %self.name, id = %id, "upserted document");

                self.emit(ModelEventKind::Create, &self.name, &id);
                Ok(query
                    .options
                    .return_new
                    .then(|| self.shape(fields, query)))
            }
            None => Ok(None),
        }
    }

    fn populate_path(&self, document: &mut Document, path: &str) -> DriverResult<()> {
        let connection = self.connection()?;

        if let Some(reference) = self
            .schema
            .field(path)
            .and_then(|field| field.options.reference.as_deref())
        {
            let target = connection.model(reference)?;
            let resolved = match document.get(path) {
                Some(Value::String(id)) => target.load(id)?.map(Value::Object).unwrap_or(Value::Null),
                Some(Value::Array(ids)) => {
                    let mut items = Vec::with_capacity(ids.len());
                    for id in ids.iter().filter_map(Value::as_str) {
                        if let Some(fields) = target.load(id)? {
                            items.push(Value::Object(fields));
                        }
                    }
                    Value::Array(items)
                }
                _ => return Ok(()),
            };
            document.set(path, resolved);
            return Ok(());
        }

        if let Some(relation) = self
            .schema
            .virtual_field(path)
            .and_then(|v| v.as_relation())
        {
            let value = self.resolve_relation(&connection, document, relation)?;
            document.set(path, value);
            return Ok(());
        }

        Err(DriverError::InvalidDocument(format!(
            "`{path}` is neither a reference nor a relation of `{}`",
            self.name
        )))
    }

    fn resolve_relation(
        &self,
        connection: &Shared,
        document: &Document,
        relation: &RelationVirtual,
    ) -> DriverResult<Value> {
        let target = connection.model(&relation.reference)?;
        let local = document.get(&relation.local_field).cloned().unwrap_or(Value::Null);

        let mut conditions = relation.conditions.clone().unwrap_or_default();
        let condition = match local {
            Value::Array(values) => {
                let mut operator = Fields::new();
                operator.insert("$in".to_string(), Value::Array(values));
                Value::Object(operator)
            }
            other => other,
        };
        conditions.insert(relation.foreign_field.clone(), condition);

        let limit = relation.just_one.then_some(1);
        let matched = target.scan(&conditions, if relation.count { None } else { limit })?;

        Ok(if relation.count {
            Value::from(matched.len())
        } else if relation.just_one {
            matched.into_iter().next().map(Value::Object).unwrap_or(Value::Null)
        } else {
            Value::Array(matched.into_iter().map(Value::Object).collect())
        })
    }
}

#[async_trait]
impl PhysicalModel for SledModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    async fn create(&self, fields: Fields) -> DriverResult<Document> {
        let fields = self.tagged(self.schema.instantiate(fields));
        self.save(Document::new(self.name.clone(), fields)).await
    }

    async fn insert_many(&self, documents: Vec<Fields>) -> DriverResult<Vec<Document>> {
        let mut created = Vec::with_capacity(documents.len());
        for fields in documents {
            created.push(self.create(fields).await?);
        }
        Ok(created)
    }

    async fn save(&self, mut document: Document) -> DriverResult<Document> {
        self.schema.validate(document.fields())?;
        self.schema
            .run_document_hooks(HookStage::Pre, SAVE, &mut document)?;

        let id = match document.id() {
            Some(id) => id.to_string(),
            None => {
                let id = self.next_id()?;
                document.set(ID_FIELD, Value::String(id.clone()));
                id
            }
        };
        let replaced = self.write(&id, document.fields())?;
        trace!(model = %self.name, id = %id, replaced, "saved document");

        self.schema
            .run_document_hooks(HookStage::Post, SAVE, &mut document)?;
        let kind = if replaced {
            ModelEventKind::Update
        } else {
            ModelEventKind::Create
        };
        self.emit(kind, document.model(), &id);
        Ok(document)
    }

    async fn remove(&self, mut document: Document) -> DriverResult<Document> {
        self.schema
            .run_document_hooks(HookStage::Pre, REMOVE, &mut document)?;

        let id = document
            .id()
            .map(str::to_string)
            .ok_or_else(|| DriverError::NotFound("document has no `_id`".to_string()))?;
        if self.tree.remove(id.as_bytes()).map_err(storage)?.is_none() {
            return Err(DriverError::NotFound(id));
        }

        self.schema
            .run_document_hooks(HookStage::Post, REMOVE, &mut document)?;
        self.emit(ModelEventKind::Delete, document.model(), &id);
        Ok(document)
    }

    async fn find(&self, mut query: Query) -> DriverResult<Vec<Document>> {
        self.query_hooks(HookStage::Pre, FIND, &mut query)?;
        let found = self.scan(&query.conditions, query.options.limit)?;
        trace!(model = %self.name, matched = found.len(), "find");
        let documents = found.into_iter().map(|f| self.shape(f, &query)).collect();
        self.query_hooks(HookStage::Post, FIND, &mut query)?;
        Ok(documents)
    }

    async fn find_one(&self, mut query: Query) -> DriverResult<Option<Document>> {
        self.query_hooks(HookStage::Pre, FIND_ONE, &mut query)?;
        let found = self.scan(&query.conditions, Some(1))?;
        let document = found.into_iter().next().map(|f| self.shape(f, &query));
        self.query_hooks(HookStage::Post, FIND_ONE, &mut query)?;
        Ok(document)
    }

    async fn find_one_and_update(&self, mut query: Query) -> DriverResult<Option<Document>> {
        self.query_hooks(HookStage::Pre, FIND_ONE_AND_UPDATE, &mut query)?;
        if query.options.run_validators {
            for validator in self.schema.validators() {
                validator.validate_update(&query.update)?;
            }
        }
        let result = self.update_one(&query)?;
        self.query_hooks(HookStage::Post, FIND_ONE_AND_UPDATE, &mut query)?;
        Ok(result)
    }

    async fn count(&self, mut query: Query) -> DriverResult<usize> {
        self.query_hooks(HookStage::Pre, COUNT, &mut query)?;
        let count = self.scan(&query.conditions, None)?.len();
        self.query_hooks(HookStage::Post, COUNT, &mut query)?;
        Ok(count)
    }

    async fn delete_many(&self, mut query: Query) -> DriverResult<usize> {
        self.query_hooks(HookStage::Pre, DELETE_MANY, &mut query)?;
        let matched = self.scan(&query.conditions, query.options.limit)?;

        let mut deleted = 0;
        for fields in matched {
            let Some(id) = fields.get(ID_FIELD).and_then(Value::as_str) else {
                continue;
            };
            if self.tree.remove(id.as_bytes()).map_err(storage)?.is_some() {
                deleted += 1;
                let model = self.hydrate(fields.clone());
                self.emit(ModelEventKind::Delete, model.model(), id);
            }
        }
        debug!(model = %self.name, deleted, "deleted documents");
        self.query_hooks(HookStage::Post, DELETE_MANY, &mut query)?;
        Ok(deleted)
    }

    async fn populate(&self, documents: Vec<Document>, paths: &[String]) -> DriverResult<Vec<Document>> {
        let mut out = Vec::with_capacity(documents.len());
        for mut document in documents {
            for path in paths {
                self.populate_path(&mut document, path)?;
            }
            out.push(document);
        }
        Ok(out)
    }

    async fn call_static(&self, name: &str, args: Vec<Value>) -> DriverResult<Value> {
        let method = self
            .schema
            .static_method(name)
            .ok_or_else(|| HookError::UnknownMethod(name.to_string()))?;
        let ctx = StaticContext {
            model: &self.name,
            collection: &self.collection,
            schema: &self.schema,
        };
        Ok((method.func)(&ctx, &args)?)
    }

    fn on(&self, listener: Listener) -> usize {
        let mut listeners = self.listeners.write();
        listeners.push(listener);
        listeners.len() - 1
    }

    fn set_property(&self, key: &str, value: Value) {
        self.properties.insert(key.to_string(), value);
    }

    fn get_property(&self, key: &str) -> Option<Value> {
        self.properties.get(key).map(|entry| entry.clone())
    }

    fn discriminator(&self, name: &str, schema: Arc<Schema>) -> DriverResult<Arc<dyn PhysicalModel>> {
        let connection = self.connection()?;
        let merged = Arc::new(self.schema.merged_with(&schema));

        let sub = Arc::new(SledModel {
            name: name.to_string(),
            collection: self.collection.clone(),
            schema: merged,
            db: self.db.clone(),
            tree: self.tree.clone(),
            connection: self.connection.clone(),
            tag: Some(name.to_string()),
            family: self.family.clone(),
            listeners: RwLock::new(Vec::new()),
            properties: DashMap::new(),
        });
        connection.register(name, sub.clone())?;
        self.family.subs.write().push(name.to_string());

        debug!(
            base = %self.name,
            discriminator = %name,
            collection = %self.collection,
            "created discriminator"
        );
        Ok(sub)
    }
}

impl fmt::Debug for SledModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SledModel")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("tag", &self.tag)
            .finish()
    }
}
