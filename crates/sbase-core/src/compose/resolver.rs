//! Parent/mixin resolution over the declaration graph.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::store::{DeclarationId, MetadataStore};

/// Ordered metadata sources of one declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSources {
    /// The declaration whose own fragments come last.
    pub declaration: DeclarationId,
    /// Mixins in declared order, without repeats.
    pub mixins: Vec<DeclarationId>,
    /// Parent, merged after the mixins.
    pub parent: Option<DeclarationId>,
}

impl ResolvedSources {
    /// Declarations whose merged metadata precedes the own fragments.
    pub fn inherited(&self) -> impl Iterator<Item = DeclarationId> + '_ {
        self.mixins.iter().copied().chain(self.parent)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Resolve the sources of `id`, failing on unknown ids and cycles.
///
/// The whole graph reachable through parent and mixin edges is checked, so a
/// successful resolve guarantees every inherited declaration is acyclic too.
pub fn resolve(store: &MetadataStore, id: DeclarationId) -> Result<ResolvedSources> {
    let mut marks = HashMap::new();
    let mut path = Vec::new();
    visit(store, id, &mut marks, &mut path)?;

    let declaration = store.get(id)?;
    let mut mixins = Vec::with_capacity(declaration.mixins.len());
    for mixin in &declaration.mixins {
        if !mixins.contains(mixin) {
            mixins.push(*mixin);
        }
    }

    Ok(ResolvedSources {
        declaration: id,
        mixins,
        parent: declaration.parent,
    })
}

fn visit(
    store: &MetadataStore,
    id: DeclarationId,
    marks: &mut HashMap<DeclarationId, Mark>,
    path: &mut Vec<DeclarationId>,
) -> Result<()> {
    match marks.get(&id) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = path.iter().position(|p| *p == id).unwrap_or(0);
            let mut names = Vec::with_capacity(path.len() - start + 1);
            for step in &path[start..] {
                names.push(store.name(*step)?.to_string());
            }
            names.push(store.name(id)?.to_string());
            return Err(Error::InheritanceCycle { path: names });
        }
        None => {}
    }

    let declaration = store.get(id)?;
    marks.insert(id, Mark::Visiting);
    path.push(id);

    for next in declaration.mixins.iter().copied().chain(declaration.parent) {
        visit(store, next, marks, path)?;
    }

    path.pop();
    marks.insert(id, Mark::Done);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_resolves_to_itself() {
        let mut store = MetadataStore::new();
        let user = store.declare("User").build();
        let sources = resolve(&store, user).unwrap();
        assert!(sources.mixins.is_empty());
        assert_eq!(sources.parent, None);
        assert_eq!(sources.inherited().count(), 0);
    }

    #[test]
    fn test_order_and_dedup() {
        let mut store = MetadataStore::new();
        let a = store.declare("A").build();
        let b = store.declare("B").mixin(a).build();
        let base = store.declare("Base").build();
        let user = store
            .declare("User")
            .mixin(b)
            .mixin(a)
            .mixin(b)
            .extends(base)
            .build();

        let sources = resolve(&store, user).unwrap();
        assert_eq!(sources.inherited().collect::<Vec<_>>(), vec![b, a, base]);
    }

    #[test]
    fn test_mixin_cycle() {
        let mut store = MetadataStore::new();
        let a = store.declare("A").build();
        let b = store.declare("B").mixin(a).build();
        store.edit(a).unwrap().mixin(b);
        let c = store.declare("C").extends(a).build();

        match resolve(&store, c) {
            Err(Error::InheritanceCycle { path }) => assert_eq!(path, vec!["A", "B", "A"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_parent() {
        let mut store = MetadataStore::new();
        let a = store.declare("A").build();
        store.edit(a).unwrap().extends(a);
        assert!(matches!(
            resolve(&store, a),
            Err(Error::InheritanceCycle { .. })
        ));
    }
}
