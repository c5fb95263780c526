//! Data levels: named projections of a document.
//!
//! Every field belongs to a level (`MINIMAL` unless its `level` option says
//! otherwise). A field is visible at its own level and at every later level
//! configured in the `dataLevel.levels` option; `MAXIMAL` sees every field.
//! Queries are projected to the level they ask for, or to the configured
//! default level.

use crate::document::{get_path, set_path, Document, Fields, ID_FIELD};
use crate::schema::hooks::{Hook, QUERY_HOOKS};
use crate::schema::plugin::Plugin;
use crate::schema::{Schema, MAXIMAL, MINIMAL};
use crate::store::{DeclarationId, MetadataStore};

/// Declaration name.
pub const NAME: &str = "DataLevelModel";
/// Plugin name.
pub const PLUGIN: &str = "dataLevel";
/// Plugin priority; runs after plugins that add fields.
pub const PRIORITY: i32 = 100;

/// Declare the data-level mixin.
pub fn declare(store: &mut MetadataStore) -> DeclarationId {
    store.declare(NAME).plugin(plugin()).build()
}

/// The data-level plugin.
pub fn plugin() -> Plugin {
    Plugin::new(PLUGIN, |schema, _options| {
        let paths = level_paths(schema);
        register(schema, &paths);
        for event in QUERY_HOOKS {
            schema.pre(Hook::new(event, |ctx| {
                let schema = ctx.schema;
                if let Some(query) = ctx.query() {
                    let level = query
                        .options
                        .level
                        .clone()
                        .or_else(|| schema.options().data_level().and_then(|c| c.default));
                    if let Some(level) = level {
                        for path in schema.level_paths(&level) {
                            query.select_path(path);
                        }
                    }
                }
                Ok(())
            }));
        }
        Ok(())
    })
    .with_priority(PRIORITY)
}

fn level_paths(schema: &Schema) -> Vec<(String, String)> {
    std::iter::once((ID_FIELD.to_string(), MINIMAL.to_string()))
        .chain(schema.fields().iter().map(|field| {
            let level = field.options.level.clone().unwrap_or_else(|| MINIMAL.to_string());
            (field.name.clone(), level)
        }))
        .collect()
}

/// Register paths on `schema` and every ancestor, each using its own levels.
fn register(schema: &Schema, paths: &[(String, String)]) {
    for target in std::iter::once(schema).chain(schema.ancestors().map(|s| s.as_ref())) {
        let levels = target.options().data_level().unwrap_or_default().levels;

        for (path, level) in paths {
            let start = if level == MINIMAL {
                Some(0)
            } else {
                levels.iter().position(|l| l == level)
            };
            if let Some(start) = start {
                for configured in &levels[start..] {
                    target.add_level_path(configured, path);
                }
            }
            if level == MINIMAL {
                target.add_level_path(MINIMAL, path);
            }
            target.add_level_path(MAXIMAL, path);
        }
    }
}

/// The fields of `document` visible at `level`. Without a level every field
/// is returned.
pub fn to_json(schema: &Schema, document: &Document, level: Option<&str>) -> Fields {
    let Some(level) = level else {
        return document.fields().clone();
    };
    let mut picked = Fields::new();
    for path in schema.level_paths(level) {
        if let Some(value) = get_path(document.fields(), &path) {
            set_path(&mut picked, &path, value.clone());
        }
    }
    picked
}
