//! Lifecycle hooks.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::Schema;
use crate::document::Document;
use crate::query::Query;

/// Document save.
pub const SAVE: &str = "save";
/// Document removal.
pub const REMOVE: &str = "remove";
/// Multi-document query.
pub const FIND: &str = "find";
/// Single-document query.
pub const FIND_ONE: &str = "findOne";
/// Count query.
pub const COUNT: &str = "count";
/// Find-and-update.
pub const FIND_ONE_AND_UPDATE: &str = "findOneAndUpdate";
/// Find-and-remove.
pub const FIND_ONE_AND_REMOVE: &str = "findOneAndRemove";
/// Bulk update.
pub const UPDATE: &str = "update";
/// Bulk delete.
pub const DELETE_MANY: &str = "deleteMany";

/// Query operations that query-scoped plugins hook into.
pub const QUERY_HOOKS: [&str; 6] = [
    FIND,
    FIND_ONE,
    COUNT,
    FIND_ONE_AND_UPDATE,
    FIND_ONE_AND_REMOVE,
    UPDATE,
];

/// Failure reported by a hook, method or static.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HookError {
    /// The callback rejected the operation.
    #[error("{0}")]
    Rejected(String),

    /// No method or static with this name.
    #[error("unknown method `{0}`")]
    UnknownMethod(String),

    /// Bad call arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// The object a hook runs against.
#[derive(Debug)]
pub enum HookTarget<'a> {
    /// Document hooks (`save`, `remove`).
    Document(&'a mut Document),
    /// Query hooks.
    Query(&'a mut Query),
}

/// Everything a hook can see.
#[derive(Debug)]
pub struct HookContext<'a> {
    /// Hook name being run.
    pub event: &'a str,
    /// Schema of the model running the hook.
    pub schema: &'a Schema,
    /// The document or query.
    pub target: HookTarget<'a>,
}

impl<'a> HookContext<'a> {
    /// Context for a document hook.
    pub fn for_document(event: &'a str, schema: &'a Schema, document: &'a mut Document) -> Self {
        Self {
            event,
            schema,
            target: HookTarget::Document(document),
        }
    }

    /// Context for a query hook.
    pub fn for_query(event: &'a str, schema: &'a Schema, query: &'a mut Query) -> Self {
        Self {
            event,
            schema,
            target: HookTarget::Query(query),
        }
    }

    /// The document, for document hooks.
    pub fn document(&mut self) -> Option<&mut Document> {
        match &mut self.target {
            HookTarget::Document(doc) => Some(doc),
            HookTarget::Query(_) => None,
        }
    }

    /// The query, for query hooks.
    pub fn query(&mut self) -> Option<&mut Query> {
        match &mut self.target {
            HookTarget::Query(query) => Some(query),
            HookTarget::Document(_) => None,
        }
    }
}

/// Hook body.
pub type HookFn = Arc<dyn Fn(&mut HookContext<'_>) -> Result<(), HookError> + Send + Sync>;

/// Callback notified when a hook fails.
pub type HookErrorFn = Arc<dyn Fn(&HookError) + Send + Sync>;

/// A pre or post hook bound to one hook name.
#[derive(Clone)]
pub struct Hook {
    /// Hook name (`save`, `find`, ...).
    pub name: String,
    /// Hook body.
    pub func: HookFn,
    /// A failure does not stop the hooks after this one. The chain still
    /// fails once every hook has run.
    pub parallel: bool,
    /// Failure callback.
    pub on_error: Option<HookErrorFn>,
}

impl Hook {
    /// Create a serial hook.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut HookContext<'_>) -> Result<(), HookError> + Send + Sync + 'static,
    {
        Self::from_fn(name, Arc::new(func))
    }

    /// Create a serial hook from a shared body.
    pub fn from_fn(name: impl Into<String>, func: HookFn) -> Self {
        Self {
            name: name.into(),
            func,
            parallel: false,
            on_error: None,
        }
    }

    /// Bind one body to several hook names.
    pub fn many<I, S, F>(names: I, func: F) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&mut HookContext<'_>) -> Result<(), HookError> + Send + Sync + 'static,
    {
        let func: HookFn = Arc::new(func);
        names
            .into_iter()
            .map(|name| Self::from_fn(name, func.clone()))
            .collect()
    }

    /// Mark as parallel.
    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Set the failure callback.
    pub fn on_error(mut self, callback: impl Fn(&HookError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Run the hook, notifying the failure callback on error.
    pub fn run(&self, ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        let result = (self.func)(ctx);
        if let (Err(err), Some(callback)) = (&result, &self.on_error) {
            callback(err);
        }
        result
    }
}

/// Run `hooks` in order through `run`.
///
/// A failing serial hook stops the chain. A failing parallel hook is
/// recorded and the chain goes on. The first failure is returned.
pub(crate) fn run_chain<'h>(
    hooks: impl Iterator<Item = &'h Hook>,
    mut run: impl FnMut(&Hook) -> Result<(), HookError>,
) -> Result<(), HookError> {
    let mut deferred = None;
    for hook in hooks {
        match run(hook) {
            Ok(()) => {}
            Err(err) if hook.parallel => {
                deferred.get_or_insert(err);
            }
            Err(err) => return Err(deferred.unwrap_or(err)),
        }
    }
    deferred.map_or(Ok(()), Err)
}

impl PartialEq for Hook {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.parallel == other.parallel
            && Arc::as_ptr(&self.func) as *const () == Arc::as_ptr(&other.func) as *const ()
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("parallel", &self.parallel)
            .finish_non_exhaustive()
    }
}
