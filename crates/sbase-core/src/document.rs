//! Documents and dotted-path helpers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field map of a document or a query fragment.
pub type Fields = Map<String, Value>;

/// Name of the identity field every stored document carries.
pub const ID_FIELD: &str = "_id";

/// A stored document together with the model it was hydrated as.
///
/// `model` is the runtime type of the document: querying a base model whose
/// collection also holds specialized documents yields documents whose
/// `model` names the specialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    model: String,
    fields: Fields,
}

impl Document {
    /// Create a document of the given model.
    pub fn new(model: impl Into<String>, fields: Fields) -> Self {
        Self {
            model: model.into(),
            fields,
        }
    }

    /// Runtime model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check whether the document was hydrated as `model`.
    pub fn is_instance_of(&self, model: &str) -> bool {
        self.model == model
    }

    /// The document identity, if it has been stored.
    pub fn id(&self) -> Option<&str> {
        self.fields.get(ID_FIELD).and_then(Value::as_str)
    }

    /// Read a (possibly dotted) path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        get_path(&self.fields, path)
    }

    /// Write a (possibly dotted) path, creating intermediate objects.
    pub fn set(&mut self, path: &str, value: Value) {
        set_path(&mut self.fields, path, value);
    }

    /// Borrow the field map.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Mutably borrow the field map.
    pub fn fields_mut(&mut self) -> &mut Fields {
        &mut self.fields
    }

    /// Consume the document, returning its field map.
    pub fn into_fields(self) -> Fields {
        self.fields
    }
}

/// Read a dotted path out of a field map.
pub fn get_path<'a>(fields: &'a Fields, path: &str) -> Option<&'a Value> {
    if let Some(value) = fields.get(path) {
        return Some(value);
    }
    let mut segments = path.split('.');
    let mut current = fields.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write a dotted path into a field map, replacing non-object intermediates.
pub fn set_path(fields: &mut Fields, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            fields.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = fields
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(inner) = entry {
                set_path(inner, rest, value);
            }
        }
    }
}
