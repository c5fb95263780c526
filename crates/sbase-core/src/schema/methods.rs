//! Instance methods and statics.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::hooks::HookError;
use super::Schema;
use crate::document::Document;

/// Instance method body.
pub type MethodFn = Arc<dyn Fn(&mut Document, &[Value]) -> Result<Value, HookError> + Send + Sync>;

/// What a static sees of the model it runs on.
#[derive(Debug, Clone, Copy)]
pub struct StaticContext<'a> {
    /// Model name.
    pub model: &'a str,
    /// Physical collection the model is bound to.
    pub collection: &'a str,
    /// Model schema.
    pub schema: &'a Schema,
}

/// Static body.
pub type StaticFn =
    Arc<dyn Fn(&StaticContext<'_>, &[Value]) -> Result<Value, HookError> + Send + Sync>;

/// A named instance method.
#[derive(Clone)]
pub struct Method {
    /// Method name.
    pub name: String,
    /// Body.
    pub func: MethodFn,
}

impl Method {
    /// Create a method.
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&mut Document, &[Value]) -> Result<Value, HookError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && Arc::as_ptr(&self.func) as *const () == Arc::as_ptr(&other.func) as *const ()
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Method").field(&self.name).finish()
    }
}

/// A named static.
#[derive(Clone)]
pub struct StaticMethod {
    /// Static name.
    pub name: String,
    /// Body.
    pub func: StaticFn,
}

impl StaticMethod {
    /// Create a static.
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&StaticContext<'_>, &[Value]) -> Result<Value, HookError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl PartialEq for StaticMethod {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && Arc::as_ptr(&self.func) as *const () == Arc::as_ptr(&other.func) as *const ()
    }
}

impl fmt::Debug for StaticMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StaticMethod").field(&self.name).finish()
    }
}
