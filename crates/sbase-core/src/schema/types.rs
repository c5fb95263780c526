//! Storage types, static type inference and field defaults.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use super::Schema;
use crate::store::DeclarationId;

/// Storage type of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// UTF-8 string.
    String,
    /// Any JSON number.
    Number,
    /// Boolean.
    Boolean,
    /// Milliseconds since the Unix epoch.
    Date,
    /// Identity of another document.
    ObjectId,
    /// Untyped value.
    Mixed,
    /// Homogeneous array.
    Array(Box<FieldType>),
    /// String-keyed map.
    Map(Box<FieldType>),
    /// A nested declaration, before composition.
    Model(DeclarationId),
    /// A nested compiled schema, after composition.
    Embedded(SchemaSlot),
}

impl FieldType {
    /// Create an array type.
    pub fn array(inner: FieldType) -> Self {
        FieldType::Array(Box::new(inner))
    }

    /// Create a map type.
    pub fn map(inner: FieldType) -> Self {
        FieldType::Map(Box::new(inner))
    }

    /// The nested declaration, when this is a declaration type.
    pub fn declaration(&self) -> Option<DeclarationId> {
        match self {
            FieldType::Model(id) => Some(*id),
            _ => None,
        }
    }
}

/// Storage-type inference from a Rust type.
///
/// Stands in for reading a property's declared type at definition time.
pub trait StaticType {
    /// The storage type for values of `Self`.
    fn static_type() -> FieldType;
}

/// Marker for date-typed properties.
#[derive(Debug, Clone, Copy)]
pub struct Date;

/// Marker for properties holding another document's identity.
#[derive(Debug, Clone, Copy)]
pub struct ObjectId;

macro_rules! static_type {
    ($field_type:expr => $($ty:ty),+) => {
        $(impl StaticType for $ty {
            fn static_type() -> FieldType {
                $field_type
            }
        })+
    };
}

static_type!(FieldType::String => String, char);
static_type!(FieldType::Boolean => bool);
static_type!(FieldType::Number => i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64);
static_type!(FieldType::Date => Date, SystemTime);
static_type!(FieldType::ObjectId => ObjectId);
static_type!(FieldType::Mixed => Value);

impl<T: StaticType> StaticType for Option<T> {
    fn static_type() -> FieldType {
        T::static_type()
    }
}

impl<T: StaticType> StaticType for Vec<T> {
    fn static_type() -> FieldType {
        FieldType::array(T::static_type())
    }
}

impl<T: StaticType> StaticType for HashMap<String, T> {
    fn static_type() -> FieldType {
        FieldType::map(T::static_type())
    }
}

impl<T: StaticType> StaticType for BTreeMap<String, T> {
    fn static_type() -> FieldType {
        FieldType::map(T::static_type())
    }
}

/// Handle to a compiled schema that may still be under construction.
///
/// The composer hands these out before the referenced schema is finished, so
/// schemas that reference themselves through their fields can be built.
#[derive(Clone, Default)]
pub struct SchemaSlot(Arc<OnceLock<Arc<Schema>>>);

impl SchemaSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a slot holding `schema`.
    pub fn filled(schema: Arc<Schema>) -> Self {
        let slot = Self::new();
        slot.fill(schema);
        slot
    }

    /// The schema, once filled.
    pub fn get(&self) -> Option<&Arc<Schema>> {
        self.0.get()
    }

    /// Check whether the slot has been filled.
    pub fn is_filled(&self) -> bool {
        self.0.get().is_some()
    }

    /// Fill the slot. A slot is filled at most once; later calls are ignored.
    pub(crate) fn fill(&self, schema: Arc<Schema>) {
        let _ = self.0.set(schema);
    }
}

impl PartialEq for SchemaSlot {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SchemaSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(schema) => write!(f, "SchemaSlot({})", schema.name()),
            None => f.write_str("SchemaSlot(<pending>)"),
        }
    }
}

/// Generator for computed defaults.
pub type DefaultFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Default value of a field.
#[derive(Clone)]
pub enum DefaultValue {
    /// A fixed value.
    Value(Value),
    /// The current time in milliseconds.
    Now,
    /// A value computed at document construction.
    Generate(DefaultFn),
    /// An empty instance of a nested schema, carrying that schema's defaults.
    EmptyInstance(SchemaSlot),
}

impl DefaultValue {
    /// Wrap a generator.
    pub fn generate(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        DefaultValue::Generate(Arc::new(f))
    }
}

impl From<Value> for DefaultValue {
    fn from(value: Value) -> Self {
        DefaultValue::Value(value)
    }
}

impl PartialEq for DefaultValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DefaultValue::Value(a), DefaultValue::Value(b)) => a == b,
            (DefaultValue::Now, DefaultValue::Now) => true,
            (DefaultValue::Generate(a), DefaultValue::Generate(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            (DefaultValue::EmptyInstance(a), DefaultValue::EmptyInstance(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(value) => f.debug_tuple("Value").field(value).finish(),
            DefaultValue::Now => f.write_str("Now"),
            DefaultValue::Generate(_) => f.write_str("Generate(..)"),
            DefaultValue::EmptyInstance(slot) => {
                f.debug_tuple("EmptyInstance").field(slot).finish()
            }
        }
    }
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
