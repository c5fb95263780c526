//! Creation and last-update timestamps.

use serde_json::Value;

use crate::schema::field::FieldOptions;
use crate::schema::hooks::{FIND_ONE_AND_UPDATE, SAVE};
use crate::schema::types::{now_millis, Date, DefaultValue};
use crate::store::{DeclarationId, MetadataStore};

/// Declaration name.
pub const NAME: &str = "TimestampModel";
/// Creation time field.
pub const CREATED_AT: &str = "createdAt";
/// Last update time field.
pub const LAST_UPDATE_TIME: &str = "lastUpdateTime";

/// Declare the timestamp mixin.
pub fn declare(store: &mut MetadataStore) -> DeclarationId {
    store
        .declare(NAME)
        .field(
            CREATED_AT,
            FieldOptions::of::<Date>()
                .with_default(DefaultValue::Now)
                .indexed(),
        )
        .field(LAST_UPDATE_TIME, FieldOptions::of::<Date>().indexed())
        .pre(SAVE, |ctx| {
            if let Some(doc) = ctx.document() {
                doc.set(LAST_UPDATE_TIME, Value::from(now_millis()));
            }
            Ok(())
        })
        .pre(FIND_ONE_AND_UPDATE, |ctx| {
            if let Some(query) = ctx.query() {
                let now = Value::from(now_millis());
                query.update.set.insert(LAST_UPDATE_TIME.to_string(), now.clone());
                query.update.set_on_insert.insert(CREATED_AT.to_string(), now);
            }
            Ok(())
        })
        .build()
}
