//! Field definitions and declaration sugar.

use serde_json::Value;

use super::types::{DefaultValue, FieldType, StaticType};
use crate::document::Fields;
use crate::store::DeclarationId;

/// Options of a single field.
///
/// Every option is optional so that two fragments for the same field can be
/// extended into each other: set options of the later fragment win.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldOptions {
    /// Explicit storage type.
    pub field_type: Option<FieldType>,
    /// Declared type of the property, used when no storage type is given.
    pub declared_type: Option<FieldType>,
    /// Reject documents where the field is missing or null.
    pub required: Option<bool>,
    /// Default applied when the field is missing.
    pub default: Option<DefaultValue>,
    /// Index the field.
    pub index: Option<bool>,
    /// Enforce uniqueness.
    pub unique: Option<bool>,
    /// Allowed string values.
    pub enum_values: Option<Vec<String>>,
    /// Name of the model an id (or id array) refers to.
    pub reference: Option<String>,
    /// Data level the field is first visible at.
    pub level: Option<String>,
    /// Driver-specific options.
    pub extra: Fields,
}

impl FieldOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options with an explicit storage type.
    pub fn typed(field_type: FieldType) -> Self {
        Self {
            field_type: Some(field_type),
            ..Self::default()
        }
    }

    /// Options with a storage type inferred from `T`.
    pub fn of<T: StaticType>() -> Self {
        Self::typed(T::static_type())
    }

    /// Options for a field holding a nested declaration.
    pub fn model(declaration: DeclarationId) -> Self {
        Self::typed(FieldType::Model(declaration))
    }

    /// Set the storage type.
    pub fn with_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    /// Set the declared property type.
    pub fn with_declared_type(mut self, field_type: FieldType) -> Self {
        self.declared_type = Some(field_type);
        self
    }

    /// Mark as required.
    pub fn required(mut self) -> Self {
        self.required = Some(true);
        self
    }

    /// Set a fixed default.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    /// Set any default.
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Mark as indexed.
    pub fn indexed(mut self) -> Self {
        self.index = Some(true);
        self
    }

    /// Mark as unique (implies indexed and required).
    pub fn unique(mut self) -> Self {
        self.index = Some(true);
        self.required = Some(true);
        self.unique = Some(true);
        self
    }

    /// Restrict to a set of string values.
    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Set the referenced model.
    pub fn references(mut self, model: impl Into<String>) -> Self {
        self.reference = Some(model.into());
        self
    }

    /// Set the data level.
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Set a driver-specific option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Extend with a later fragment: options set in `later` overwrite.
    pub fn extend(&mut self, later: FieldOptions) {
        let FieldOptions {
            field_type,
            declared_type,
            required,
            default,
            index,
            unique,
            enum_values,
            reference,
            level,
            extra,
        } = later;

        if field_type.is_some() {
            self.field_type = field_type;
        }
        if declared_type.is_some() {
            self.declared_type = declared_type;
        }
        if required.is_some() {
            self.required = required;
        }
        if default.is_some() {
            self.default = default;
        }
        if index.is_some() {
            self.index = index;
        }
        if unique.is_some() {
            self.unique = unique;
        }
        if enum_values.is_some() {
            self.enum_values = enum_values;
        }
        if reference.is_some() {
            self.reference = reference;
        }
        if level.is_some() {
            self.level = level;
        }
        self.extra.extend(extra);
    }

    /// Check if the field is required.
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(false)
    }

    /// Check if the field is indexed.
    pub fn is_indexed(&self) -> bool {
        self.index.unwrap_or(false) || self.unique.unwrap_or(false)
    }
}

/// A named field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field path.
    pub name: String,
    /// Field options.
    pub options: FieldOptions,
}

impl FieldDef {
    /// Create a field definition.
    pub fn new(name: impl Into<String>, options: FieldOptions) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }

    /// The storage type, once known.
    pub fn field_type(&self) -> Option<&FieldType> {
        self.options.field_type.as_ref()
    }
}

/// A required field.
pub fn required() -> FieldOptions {
    FieldOptions::new().required()
}

/// A unique, indexed, required field.
pub fn unique() -> FieldOptions {
    FieldOptions::new().unique()
}

/// An indexed field.
pub fn index_field() -> FieldOptions {
    FieldOptions::new().indexed()
}

/// A field with a fixed default.
pub fn default_value(value: impl Into<Value>) -> FieldOptions {
    FieldOptions::new().default_value(value)
}

/// A string field restricted to `values`.
pub fn enum_field<I, S>(values: I) -> FieldOptions
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    FieldOptions::typed(FieldType::String).one_of(values)
}

/// A reference to a document of `model`.
pub fn db_ref(model: impl Into<String>) -> FieldOptions {
    FieldOptions::typed(FieldType::ObjectId).references(model)
}

/// An array of references to documents of `model`.
pub fn db_ref_array(model: impl Into<String>) -> FieldOptions {
    FieldOptions::typed(FieldType::array(FieldType::ObjectId)).references(model)
}

/// An array field defaulting to the empty array.
pub fn array_field(item: FieldType) -> FieldOptions {
    FieldOptions::typed(FieldType::array(item)).default_value(Value::Array(Vec::new()))
}

/// A string-keyed map field.
pub fn map_field(value: FieldType) -> FieldOptions {
    FieldOptions::typed(FieldType::map(value))
}
