//! Soft deletion: documents are flagged instead of removed.

use serde_json::Value;

use crate::schema::field::FieldOptions;
use crate::schema::hooks::{HookError, QUERY_HOOKS, REMOVE};
use crate::schema::methods::Method;
use crate::store::{DeclarationId, MetadataStore};

/// Declaration name.
pub const NAME: &str = "SoftDeleteModel";
/// Deletion flag field.
pub const DELETED: &str = "deleted";
/// Name of the instance method that flags a document.
pub const DELETE_METHOD: &str = "delete";
/// Message of the rejected `remove` hook.
pub const REMOVE_REJECTED: &str = "remove is not supported, use delete instead";

/// Declare the soft-delete mixin.
///
/// The `delete` method only flags the document and returns whether it
/// changed; saving it is up to the caller.
pub fn declare(store: &mut MetadataStore) -> DeclarationId {
    store
        .declare(NAME)
        .field(DELETED, FieldOptions::of::<bool>().default_value(false))
        .method(Method::new(DELETE_METHOD, |doc, _| {
            if doc.get(DELETED) == Some(&Value::Bool(true)) {
                return Ok(Value::Bool(false));
            }
            doc.set(DELETED, Value::Bool(true));
            Ok(Value::Bool(true))
        }))
        .pre(REMOVE, |_| Err(HookError::Rejected(REMOVE_REJECTED.to_string())))
        .pres(QUERY_HOOKS, |ctx| {
            if let Some(query) = ctx.query() {
                if !query.conditions.contains_key(DELETED) && !query.options.with_deleted {
                    query.conditions.insert(DELETED.to_string(), Value::Bool(false));
                }
            }
            Ok(())
        })
        .build()
}
