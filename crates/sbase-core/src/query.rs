//! Query and update descriptions handed to query hooks and the driver.

use serde_json::Value;

use crate::document::Fields;

/// Pending update payload of an update-style operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    /// Values written on every matched document (`$set`).
    pub set: Fields,
    /// Values written only when an upsert inserts (`$setOnInsert`).
    pub set_on_insert: Fields,
}

impl Update {
    /// Check whether the update writes nothing.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.set_on_insert.is_empty()
    }
}

/// Per-query options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Data level used for projection.
    pub level: Option<String>,
    /// Include soft-deleted documents.
    pub with_deleted: bool,
    /// Run update validators against the pending update.
    pub run_validators: bool,
    /// Insert when nothing matches.
    pub upsert: bool,
    /// Return the document after the update instead of before.
    pub return_new: bool,
    /// Maximum number of documents returned.
    pub limit: Option<usize>,
}

/// A query: conditions, projection, pending update and options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Match conditions (`field -> value` or `field -> { "$op": value }`).
    pub conditions: Fields,
    /// Selected fields. `None` selects everything.
    pub projection: Option<Vec<String>>,
    /// Pending update for update-style operations.
    pub update: Update,
    /// Options.
    pub options: QueryOptions,
}

impl Query {
    /// Create a query matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a query from a condition map.
    pub fn filter(conditions: Fields) -> Self {
        Self {
            conditions,
            ..Self::default()
        }
    }

    /// Add an equality condition.
    pub fn eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(path.into(), value.into());
        self
    }

    /// Add a `$set` entry.
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.update.set.insert(path.into(), value.into());
        self
    }

    /// Add a `$setOnInsert` entry.
    pub fn set_on_insert(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.update.set_on_insert.insert(path.into(), value.into());
        self
    }

    /// Select a field.
    pub fn select(mut self, path: impl Into<String>) -> Self {
        self.select_path(path);
        self
    }

    /// Select a field in place, ignoring duplicates.
    pub fn select_path(&mut self, path: impl Into<String>) {
        let path = path.into();
        let projection = self.projection.get_or_insert_with(Vec::new);
        if !projection.contains(&path) {
            projection.push(path);
        }
    }

    /// Project with a data level.
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.options.level = Some(level.into());
        self
    }

    /// Include soft-deleted documents.
    pub fn with_deleted(mut self) -> Self {
        self.options.with_deleted = true;
        self
    }

    /// Validate the pending update.
    pub fn run_validators(mut self) -> Self {
        self.options.run_validators = true;
        self
    }

    /// Insert when nothing matches.
    pub fn upsert(mut self) -> Self {
        self.options.upsert = true;
        self
    }

    /// Return the updated document.
    pub fn return_new(mut self) -> Self {
        self.options.return_new = true;
        self
    }

    /// Limit the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_builder() {
        let query = Query::new()
            .eq("name", "ana")
            .set("age", 3)
            .set_on_insert("createdAt", 1)
            .select("name")
            .select("name")
            .level("DETAIL")
            .run_validators()
            .upsert()
            .limit(5);

        assert_eq!(query.conditions.get("name"), Some(&json!("ana")));
        assert_eq!(query.update.set.get("age"), Some(&json!(3)));
        assert!(!query.update.is_empty());
        assert_eq!(query.projection, Some(vec!["name".to_string()]));
        assert_eq!(query.options.level.as_deref(), Some("DETAIL"));
        assert!(query.options.run_validators);
        assert!(query.options.upsert);
        assert_eq!(query.options.limit, Some(5));
    }
}
