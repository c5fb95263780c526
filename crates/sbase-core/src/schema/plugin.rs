//! Schema plugins and index definitions.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::Schema;
use crate::document::Fields;

/// Failure reported by a plugin.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct PluginError(pub String);

/// Plugin body: receives the schema and the merged config extended with the
/// plugin's own options.
pub type PluginFn = Arc<dyn Fn(&mut Schema, &Fields) -> Result<(), PluginError> + Send + Sync>;

/// A schema plugin.
#[derive(Clone)]
pub struct Plugin {
    /// Plugin name, used in diagnostics.
    pub name: String,
    /// Body.
    pub func: PluginFn,
    /// Plugin-specific options.
    pub options: Fields,
    /// Application order; lower runs first, `None` runs before any number.
    pub priority: Option<i32>,
}

impl Plugin {
    /// Create a plugin without options or priority.
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&mut Schema, &Fields) -> Result<(), PluginError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
            options: Fields::new(),
            priority: None,
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set a plugin option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Apply the plugin with the merged config.
    pub fn apply(&self, schema: &mut Schema, config: &Fields) -> Result<(), PluginError> {
        let mut options = config.clone();
        options.extend(self.options.clone());
        (self.func)(schema, &options)
    }
}

impl PartialEq for Plugin {
    fn eq(&self, other: &Self) -> bool {
        Arc::as_ptr(&self.func) as *const () == Arc::as_ptr(&other.func) as *const ()
            && self.options == other.options
            && self.priority == other.priority
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("options", &self.options)
            .finish()
    }
}

/// A compound index.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    /// Indexed paths with their sort direction (1 or -1).
    pub fields: Vec<(String, i32)>,
    /// Index options (`unique`, `expires`, ...).
    pub options: Fields,
}

impl Index {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            options: Fields::new(),
        }
    }

    /// Add an ascending path.
    pub fn asc(mut self, path: impl Into<String>) -> Self {
        self.fields.push((path.into(), 1));
        self
    }

    /// Add a descending path.
    pub fn desc(mut self, path: impl Into<String>) -> Self {
        self.fields.push((path.into(), -1));
        self
    }

    /// Set an option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Mark as unique.
    pub fn unique(self) -> Self {
        self.with_option("unique", true)
    }
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}
