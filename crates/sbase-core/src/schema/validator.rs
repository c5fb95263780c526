//! Path validators that run both on document save and on update queries.
//!
//! A validator reads sibling fields through a [`FieldView`]. On save the view
//! is the document being saved; on an update it is the pending `$set`
//! payload, which stands in for the document. The two call sites are separate
//! entry points; a validator invoked without either context fails closed.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::document::{get_path, Fields};
use crate::query::Update;

/// Default validator kind.
pub const USER_DEFINED: &str = "user defined";

/// A failed validation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Offending path.
    pub path: String,
    /// Human readable message.
    pub message: String,
    /// Validator kind (`required`, `enum`, `user defined`, ...).
    pub kind: String,
}

impl ValidationError {
    /// Create an error.
    pub fn new(path: impl Into<String>, message: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind: kind.into(),
        }
    }

    /// A missing required field.
    pub fn required(path: &str) -> Self {
        Self::new(path, format!("Path `{path}` is required."), "required")
    }

    /// A value outside the allowed enum values.
    pub fn not_in_enum(path: &str, value: &Value) -> Self {
        Self::new(
            path,
            format!("`{value}` is not a valid enum value for path `{path}`."),
            "enum",
        )
    }
}

/// Where a validator is being run.
#[derive(Debug, Clone, Copy)]
pub enum ValidationContext<'a> {
    /// Saving a document.
    Document(&'a Fields),
    /// Running an update query.
    Update(&'a Update),
    /// Neither; validators fail closed.
    Detached,
}

/// Read access to the fields a validator is allowed to see.
#[derive(Debug, Clone, Copy)]
pub struct FieldView<'a> {
    fields: &'a Fields,
}

impl<'a> FieldView<'a> {
    /// Read a (possibly dotted) path.
    pub fn get(&self, path: &str) -> Option<&'a Value> {
        get_path(self.fields, path)
    }
}

/// Validator body: the value at the path plus a view of its siblings.
pub type ValidatorFn = Arc<dyn Fn(&Value, &FieldView<'_>) -> bool + Send + Sync>;

/// A validator bound to one path.
#[derive(Clone)]
pub struct UpdateValidator {
    /// Validated path.
    pub path: String,
    /// Body.
    pub func: ValidatorFn,
    /// Message on failure.
    pub message: Option<String>,
    /// Validator kind.
    pub kind: Option<String>,
}

impl UpdateValidator {
    /// Create a validator.
    pub fn new(
        path: impl Into<String>,
        func: impl Fn(&Value, &FieldView<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            path: path.into(),
            func: Arc::new(func),
            message: None,
            kind: None,
        }
    }

    /// Set the failure message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Set the validator kind.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Validate a document being saved.
    pub fn validate_document(&self, fields: &Fields) -> Result<(), ValidationError> {
        self.validate(ValidationContext::Document(fields))
    }

    /// Validate an update query against its pending `$set`.
    ///
    /// Paths the update does not touch are not validated.
    pub fn validate_update(&self, update: &Update) -> Result<(), ValidationError> {
        self.validate(ValidationContext::Update(update))
    }

    /// Validate in an explicit context.
    pub fn validate(&self, ctx: ValidationContext<'_>) -> Result<(), ValidationError> {
        let (value, view) = match ctx {
            ValidationContext::Document(fields) => (
                get_path(fields, &self.path).cloned().unwrap_or(Value::Null),
                FieldView { fields },
            ),
            ValidationContext::Update(update) => match get_path(&update.set, &self.path) {
                Some(value) => (value.clone(), FieldView { fields: &update.set }),
                None => return Ok(()),
            },
            ValidationContext::Detached => return Err(self.failure(&Value::Null)),
        };

        if (self.func)(&value, &view) {
            Ok(())
        } else {
            Err(self.failure(&value))
        }
    }

    fn failure(&self, value: &Value) -> ValidationError {
        let message = self.message.clone().unwrap_or_else(|| {
            format!("Validator failed for path `{}` with value `{}`", self.path, value)
        });
        let kind = self.kind.as_deref().unwrap_or(USER_DEFINED);
        ValidationError::new(self.path.clone(), message, kind)
    }
}

impl PartialEq for UpdateValidator {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.message == other.message
            && self.kind == other.kind
            && Arc::as_ptr(&self.func) as *const () == Arc::as_ptr(&other.func) as *const ()
    }
}

impl fmt::Debug for UpdateValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateValidator")
            .field("path", &self.path)
            .field("message", &self.message)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
