//! Metadata store: per-declaration fragment bags.
//!
//! Declarations live in an arena and are referred to by [`DeclarationId`].
//! Fragments are recorded through a [`DeclarationBuilder`] and are never
//! validated at record time; the composer resolves conflicts later.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::document::Fields;
use crate::error::{Error, Result};
use crate::schema::field::{FieldDef, FieldOptions};
use crate::schema::hooks::{Hook, HookContext, HookError};
use crate::schema::methods::{Method, StaticMethod};
use crate::schema::plugin::{Index, Plugin};
use crate::schema::types::{FieldType, StaticType};
use crate::schema::validator::UpdateValidator;
use crate::schema::virtuals::Virtual;

/// Identity of a declaration inside its [`MetadataStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclarationId(usize);

impl DeclarationId {
    /// Arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for DeclarationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single recorded piece of metadata.
#[derive(Debug, Clone)]
pub enum Fragment {
    /// Bulk field map; replaces same-named fields wholesale.
    Schema(Vec<FieldDef>),
    /// One field; extends the options of a same-named field in place.
    Field(FieldDef),
    /// Config options, shallow-extended.
    Config(Fields),
    /// Pre hook.
    Pre(Hook),
    /// Post hook.
    Post(Hook),
    /// Virtual property.
    Virtual(Virtual),
    /// Instance method.
    Method(Method),
    /// Static.
    Static(StaticMethod),
    /// Plugin.
    Plugin(Plugin),
    /// Compound index.
    Index(Index),
    /// Path validator.
    UpdateValidator(UpdateValidator),
    /// Capability mixin.
    Mixin(DeclarationId),
}

/// Fragments recorded directly on one declaration.
#[derive(Debug, Clone, Default)]
pub struct FragmentBag {
    /// Fields in first-recorded order.
    pub fields: Vec<FieldDef>,
    /// Config options.
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
    /// Plugins.
    pub plugins: Vec<Plugin>,
    /// Compound indexes.
    pub indexes: Vec<Index>,
    /// Path validators.
    pub validators: Vec<UpdateValidator>,
}

impl FragmentBag {
    fn record(&mut self, fragment: Fragment) -> Option<DeclarationId> {
        match fragment {
            Fragment::Schema(fields) => {
                for field in fields {
                    match self.fields.iter_mut().find(|f| f.name == field.name) {
                        Some(existing) => *existing = field,
                        None => self.fields.push(field),
                    }
                }
            }
            Fragment::Field(field) => match self.fields.iter_mut().find(|f| f.name == field.name) {
                Some(existing) => existing.options.extend(field.options),
                None => self.fields.push(field),
            },
            Fragment::Config(config) => self.config.extend(config),
            Fragment::Pre(hook) => self.pres.push(hook),
            Fragment::Post(hook) => self.posts.push(hook),
            Fragment::Virtual(v) => self.virtuals.push(v),
            Fragment::Method(m) => self.methods.push(m),
            Fragment::Static(s) => self.statics.push(s),
            Fragment::Plugin(p) => self.plugins.push(p),
            Fragment::Index(i) => self.indexes.push(i),
            Fragment::UpdateValidator(v) => self.validators.push(v),
            Fragment::Mixin(id) => return Some(id),
        }
        None
    }
}

/// A named, possibly inheriting blueprint.
#[derive(Debug, Clone)]
pub struct ModelDeclaration {
    /// Declaration name.
    pub name: String,
    /// Parent declaration.
    pub parent: Option<DeclarationId>,
    /// Mixins in declared order.
    pub mixins: Vec<DeclarationId>,
    /// Own fragments.
    pub fragments: FragmentBag,
}

impl ModelDeclaration {
    fn new(name: String) -> Self {
        Self {
            name,
            parent: None,
            mixins: Vec::new(),
            fragments: FragmentBag::default(),
        }
    }
}

/// Arena of declarations.
#[derive(Debug, Default)]
pub struct MetadataStore {
    declarations: Vec<ModelDeclaration>,
    by_name: HashMap<String, DeclarationId>,
}

impl MetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or reopen) the declaration named `name`.
    pub fn declare(&mut self, name: impl Into<String>) -> DeclarationBuilder<'_> {
        let name = name.into();
        let id = match self.by_name.get(&name) {
            Some(id) => *id,
            None => {
                let id = DeclarationId(self.declarations.len());
                self.by_name.insert(name.clone(), id);
                self.declarations.push(ModelDeclaration::new(name));
                id
            }
        };
        DeclarationBuilder { store: self, id }
    }

    /// Reopen a declaration to record more fragments.
    pub fn edit(&mut self, id: DeclarationId) -> Result<DeclarationBuilder<'_>> {
        self.get(id)?;
        Ok(DeclarationBuilder { store: self, id })
    }

    /// Record a fragment on a declaration.
    pub fn record_fragment(&mut self, id: DeclarationId, fragment: Fragment) -> Result<()> {
        let declaration = self
            .declarations
            .get_mut(id.0)
            .ok_or(Error::UnknownDeclaration(id))?;
        if let Some(mixin) = declaration.fragments.record(fragment) {
            declaration.mixins.push(mixin);
        }
        Ok(())
    }

    /// Set the parent of a declaration.
    pub fn set_parent(&mut self, id: DeclarationId, parent: DeclarationId) -> Result<()> {
        self.get(parent)?;
        let declaration = self
            .declarations
            .get_mut(id.0)
            .ok_or(Error::UnknownDeclaration(id))?;
        declaration.parent = Some(parent);
        Ok(())
    }

    /// Look up a declaration.
    pub fn get(&self, id: DeclarationId) -> Result<&ModelDeclaration> {
        self.declarations
            .get(id.0)
            .ok_or(Error::UnknownDeclaration(id))
    }

    /// Look up a declaration id by name.
    pub fn find(&self, name: &str) -> Option<DeclarationId> {
        self.by_name.get(name).copied()
    }

    /// Name of a declaration.
    pub fn name(&self, id: DeclarationId) -> Result<&str> {
        self.get(id).map(|d| d.name.as_str())
    }

    /// Number of declarations.
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Check whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

/// Records fragments onto one declaration.
///
/// Each method records exactly one kind of fragment. Ids handed to
/// [`extends`](Self::extends) and [`mixin`](Self::mixin) are checked when the
/// declaration is resolved, not here.
pub struct DeclarationBuilder<'a> {
    store: &'a mut MetadataStore,
    id: DeclarationId,
}

impl<'a> DeclarationBuilder<'a> {
    /// The declaration being built.
    pub fn id(&self) -> DeclarationId {
        self.id
    }

    /// Finish, returning the declaration id.
    pub fn build(self) -> DeclarationId {
        self.id
    }

    fn record(self, fragment: Fragment) -> Self {
        // The id was produced by this store, so recording cannot fail.
        if let Some(declaration) = self.store.declarations.get_mut(self.id.0) {
            if let Some(mixin) = declaration.fragments.record(fragment) {
                declaration.mixins.push(mixin);
            }
        }
        self
    }

    /// Set the parent declaration.
    pub fn extends(self, parent: DeclarationId) -> Self {
        if let Some(declaration) = self.store.declarations.get_mut(self.id.0) {
            declaration.parent = Some(parent);
        }
        self
    }

    /// Add a capability mixin.
    pub fn mixin(self, mixin: DeclarationId) -> Self {
        self.record(Fragment::Mixin(mixin))
    }

    /// Record a bulk field map.
    pub fn schema<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldOptions)>,
        S: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|(name, options)| FieldDef::new(name, options))
            .collect();
        self.record(Fragment::Schema(fields))
    }

    /// Record a single field.
    pub fn field(self, name: impl Into<String>, options: FieldOptions) -> Self {
        self.record(Fragment::Field(FieldDef::new(name, options)))
    }

    /// Record a field whose declared property type is `T`.
    pub fn property<T: StaticType>(self, name: impl Into<String>, options: FieldOptions) -> Self {
        self.field(name, options.with_declared_type(T::static_type()))
    }

    /// Record a field whose declared property type is another declaration.
    pub fn embedded(
        self,
        name: impl Into<String>,
        declaration: DeclarationId,
        options: FieldOptions,
    ) -> Self {
        self.field(
            name,
            options.with_declared_type(FieldType::Model(declaration)),
        )
    }

    /// Record config options.
    pub fn config(self, config: Fields) -> Self {
        self.record(Fragment::Config(config))
    }

    /// Record a single config option.
    pub fn option(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut config = Fields::new();
        config.insert(key.into(), value.into());
        self.config(config)
    }

    /// Record a pre hook.
    pub fn pre<F>(self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut HookContext<'_>) -> std::result::Result<(), HookError> + Send + Sync + 'static,
    {
        self.pre_hook(Hook::new(name, func))
    }

    /// Record a configured pre hook.
    pub fn pre_hook(self, hook: Hook) -> Self {
        self.record(Fragment::Pre(hook))
    }

    /// Record one pre hook body for several hook names.
    pub fn pres<I, S, F>(mut self, names: I, func: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&mut HookContext<'_>) -> std::result::Result<(), HookError> + Send + Sync + 'static,
    {
        for hook in Hook::many(names, func) {
            self = self.pre_hook(hook);
        }
        self
    }

    /// Record a post hook.
    pub fn post<F>(self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut HookContext<'_>) -> std::result::Result<(), HookError> + Send + Sync + 'static,
    {
        self.post_hook(Hook::new(name, func))
    }

    /// Record a configured post hook.
    pub fn post_hook(self, hook: Hook) -> Self {
        self.record(Fragment::Post(hook))
    }

    /// Record one post hook body for several hook names.
    pub fn posts<I, S, F>(mut self, names: I, func: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&mut HookContext<'_>) -> std::result::Result<(), HookError> + Send + Sync + 'static,
    {
        for hook in Hook::many(names, func) {
            self = self.post_hook(hook);
        }
        self
    }

    /// Record a virtual.
    pub fn virtual_field(self, virtual_field: Virtual) -> Self {
        self.record(Fragment::Virtual(virtual_field))
    }

    /// Record an instance method.
    pub fn method(self, method: Method) -> Self {
        self.record(Fragment::Method(method))
    }

    /// Record a static.
    pub fn static_fn(self, method: StaticMethod) -> Self {
        self.record(Fragment::Static(method))
    }

    /// Record a plugin.
    pub fn plugin(self, plugin: Plugin) -> Self {
        self.record(Fragment::Plugin(plugin))
    }

    /// Record a compound index.
    pub fn index(self, index: Index) -> Self {
        self.record(Fragment::Index(index))
    }

    /// Record a path validator.
    pub fn update_validator(self, validator: UpdateValidator) -> Self {
        self.record(Fragment::UpdateValidator(validator))
    }
}
