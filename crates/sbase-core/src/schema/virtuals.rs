//! Virtual properties.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::document::{Document, Fields};

/// Computes a virtual from the document.
pub type GetterFn = Arc<dyn Fn(&Document) -> Value + Send + Sync>;

/// Writes a virtual back into the document.
pub type SetterFn = Arc<dyn Fn(&mut Document, Value) + Send + Sync>;

/// A relation resolved at populate time.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationVirtual {
    /// Model holding the related documents.
    pub reference: String,
    /// Field of this document.
    pub local_field: String,
    /// Field of the related documents matched against `local_field`.
    pub foreign_field: String,
    /// Resolve to a single document instead of an array.
    pub just_one: bool,
    /// Extra conditions on the related documents.
    pub conditions: Option<Fields>,
    /// Resolve to the number of related documents.
    pub count: bool,
}

impl RelationVirtual {
    /// Create a relation to `reference` joined on `local_field == foreign_field`.
    pub fn new(
        reference: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            reference: reference.into(),
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
            just_one: false,
            conditions: None,
            count: false,
        }
    }

    /// Resolve to one document.
    pub fn just_one(mut self) -> Self {
        self.just_one = true;
        self
    }

    /// Restrict the related documents.
    pub fn matching(mut self, conditions: Fields) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Resolve to a count.
    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }
}

/// How a virtual is computed.
#[derive(Clone)]
pub enum VirtualKind {
    /// Getter and/or setter pair.
    Accessor {
        /// Getter.
        get: Option<GetterFn>,
        /// Setter.
        set: Option<SetterFn>,
    },
    /// Reference to other documents.
    Relation(RelationVirtual),
}

/// A named virtual property.
#[derive(Clone)]
pub struct Virtual {
    /// Property name.
    pub name: String,
    /// Computation.
    pub kind: VirtualKind,
}

impl Virtual {
    /// Create a read-only accessor virtual.
    pub fn getter(
        name: impl Into<String>,
        get: impl Fn(&Document) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind: VirtualKind::Accessor {
                get: Some(Arc::new(get)),
                set: None,
            },
        }
    }

    /// Add a setter to an accessor virtual. Relation virtuals are unchanged.
    pub fn with_setter(
        mut self,
        set: impl Fn(&mut Document, Value) + Send + Sync + 'static,
    ) -> Self {
        if let VirtualKind::Accessor { set: slot, .. } = &mut self.kind {
            *slot = Some(Arc::new(set));
        }
        self
    }

    /// Create a relation virtual.
    pub fn relation(name: impl Into<String>, relation: RelationVirtual) -> Self {
        Self {
            name: name.into(),
            kind: VirtualKind::Relation(relation),
        }
    }

    /// Compute the value, for accessor virtuals with a getter.
    pub fn get(&self, doc: &Document) -> Option<Value> {
        match &self.kind {
            VirtualKind::Accessor { get: Some(get), .. } => Some(get(doc)),
            _ => None,
        }
    }

    /// Write the value. Returns false when the virtual has no setter.
    pub fn set(&self, doc: &mut Document, value: Value) -> bool {
        match &self.kind {
            VirtualKind::Accessor { set: Some(set), .. } => {
                set(doc, value);
                true
            }
            _ => false,
        }
    }

    /// The relation, for relation virtuals.
    pub fn as_relation(&self) -> Option<&RelationVirtual> {
        match &self.kind {
            VirtualKind::Relation(relation) => Some(relation),
            VirtualKind::Accessor { .. } => None,
        }
    }
}

fn same_fn<T: ?Sized>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const (),
        (None, None) => true,
        _ => false,
    }
}

impl PartialEq for Virtual {
    fn eq(&self, other: &Self) -> bool {
        if self.name != other.name {
            return false;
        }
        match (&self.kind, &other.kind) {
            (
                VirtualKind::Accessor { get: g1, set: s1 },
                VirtualKind::Accessor { get: g2, set: s2 },
            ) => same_fn(g1, g2) && same_fn(s1, s2),
            (VirtualKind::Relation(a), VirtualKind::Relation(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Virtual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            VirtualKind::Accessor { .. } => "accessor",
            VirtualKind::Relation(_) => "relation",
        };
        f.debug_struct("Virtual")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}
