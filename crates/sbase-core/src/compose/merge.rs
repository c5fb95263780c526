//! Merging of ordered metadata sources.

use crate::document::Fields;
use crate::schema::field::FieldDef;
use crate::schema::hooks::Hook;
use crate::schema::methods::{Method, StaticMethod};
use crate::schema::plugin::{Index, Plugin};
use crate::schema::validator::UpdateValidator;
use crate::schema::virtuals::Virtual;
use crate::store::FragmentBag;

/// The merged metadata of a declaration and everything it inherits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedMetadata {
    /// Fields; later sources replace same-named fields entirely.
    pub fields: Vec<FieldDef>,
    /// Shallow-merged config.
    pub config: Fields,
    /// Pre hooks.
    pub pres: Vec<Hook>,
    /// Post hooks.
    pub posts: Vec<Hook>,
    /// Virtuals.
    pub virtuals: Vec<Virtual>,
    /// Instance methods.
    pub methods: Vec<Method>,
    /// Statics.
    pub statics: Vec<StaticMethod>,
    /// Plugins, in application order.
    pub plugins: Vec<Plugin>,
    /// Compound indexes.
    pub indexes: Vec<Index>,
    /// Path validators.
    pub validators: Vec<UpdateValidator>,
}

impl MergedMetadata {
    /// Merge `sources` in order, then order the plugins by priority.
    pub fn merge<'a>(sources: impl IntoIterator<Item = Source<'a>>) -> Self {
        let mut merged = Self::default();
        for source in sources {
            match source {
                Source::Merged(other) => merged.extend_with(
                    &other.fields,
                    &other.config,
                    Lists {
                        pres: &other.pres,
                        posts: &other.posts,
                        virtuals: &other.virtuals,
                        methods: &other.methods,
                        statics: &other.statics,
                        plugins: &other.plugins,
                        indexes: &other.indexes,
                        validators: &other.validators,
                    },
                ),
                Source::Own(bag) => merged.extend_with(
                    &bag.fields,
                    &bag.config,
                    Lists {
                        pres: &bag.pres,
                        posts: &bag.posts,
                        virtuals: &bag.virtuals,
                        methods: &bag.methods,
                        statics: &bag.statics,
                        plugins: &bag.plugins,
                        indexes: &bag.indexes,
                        validators: &bag.validators,
                    },
                ),
            }
        }
        // Stable: equal priorities keep source order, `None` sorts first.
        merged.plugins.sort_by_key(|plugin| plugin.priority);
        merged
    }

    /// Look up a field.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn extend_with(&mut self, fields: &[FieldDef], config: &Fields, lists: Lists<'_>) {
        for field in fields {
            match self.fields.iter_mut().find(|f| f.name == field.name) {
                Some(existing) => *existing = field.clone(),
                None => self.fields.push(field.clone()),
            }
        }
        self.config
            .extend(config.iter().map(|(k, v)| (k.clone(), v.clone())));

        union_into(&mut self.pres, lists.pres);
        union_into(&mut self.posts, lists.posts);
        union_into(&mut self.virtuals, lists.virtuals);
        union_into(&mut self.methods, lists.methods);
        union_into(&mut self.statics, lists.statics);
        union_into(&mut self.plugins, lists.plugins);
        union_into(&mut self.indexes, lists.indexes);
        union_into(&mut self.validators, lists.validators);
    }
}

/// One merge input.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    /// Merged metadata of a mixin or the parent.
    Merged(&'a MergedMetadata),
    /// Fragments recorded on the declaration itself.
    Own(&'a FragmentBag),
}

struct Lists<'a> {
    pres: &'a [Hook],
    posts: &'a [Hook],
    virtuals: &'a [Virtual],
    methods: &'a [Method],
    statics: &'a [StaticMethod],
    plugins: &'a [Plugin],
    indexes: &'a [Index],
    validators: &'a [UpdateValidator],
}

fn union_into<T: Clone + PartialEq>(target: &mut Vec<T>, items: &[T]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field::{default_value, required, FieldOptions};
    use crate::schema::hooks::SAVE;
    use crate::store::MetadataStore;
    use serde_json::json;

    #[test]
    fn test_later_sources_win() {
        let mut store = MetadataStore::new();
        let mixin = store
            .declare("Mixin")
            .field("name", required())
            .field("shared", FieldOptions::of::<String>())
            .option("collection", "mixed")
            .option("strict", true)
            .build();
        let own = store
            .declare("User")
            .field("name", default_value("x"))
            .option("collection", "users")
            .build();

        let mixin_merged = MergedMetadata::merge([Source::Own(&store.get(mixin).unwrap().fragments)]);
        let merged = MergedMetadata::merge([
            Source::Merged(&mixin_merged),
            Source::Own(&store.get(own).unwrap().fragments),
        ]);

        // The whole field is replaced, not deep-merged.
        let name = merged.field("name").unwrap();
        assert!(!name.options.is_required());
        assert!(name.options.default.is_some());
        assert!(merged.field("shared").is_some());
        assert_eq!(merged.config.get("collection"), Some(&json!("users")));
        assert_eq!(merged.config.get("strict"), Some(&json!(true)));
    }

    #[test]
    fn test_duplicate_hooks_collapse() {
        let hook = Hook::new(SAVE, |_| Ok(()));
        let mut a = MergedMetadata::default();
        a.pres.push(hook.clone());
        let mut b = MergedMetadata::default();
        b.pres.push(hook);
        b.pres.push(Hook::new(SAVE, |_| Ok(())));

        let merged = MergedMetadata::merge([Source::Merged(&a), Source::Merged(&b)]);
        assert_eq!(merged.pres.len(), 2);
    }

    #[test]
    fn test_plugin_priority_order() {
        let low = Plugin::new("low", |_, _| Ok(())).with_priority(10);
        let high = Plugin::new("high", |_, _| Ok(())).with_priority(100);
        let unset = Plugin::new("unset", |_, _| Ok(()));
        let tie = Plugin::new("tie", |_, _| Ok(())).with_priority(10);

        let mut source = MergedMetadata::default();
        source.plugins = vec![high, low, unset, tie];
        let merged = MergedMetadata::merge([Source::Merged(&source)]);

        let names: Vec<_> = merged.plugins.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["unset", "low", "tie", "high"]);
    }
}
