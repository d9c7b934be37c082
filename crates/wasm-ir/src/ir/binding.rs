//! Name → index tables, one per namespace.

use super::types::{Index, Location, Var, VarKind, INVALID_INDEX};
use indexmap::IndexMap;

/// A single name definition: where it was written and the index it denotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub loc: Location,
    pub index: Index,
}

impl Binding {
    pub fn new(loc: Location, index: Index) -> Self {
        Self { loc, index }
    }
}

/// Associates names with indices within one namespace.
///
/// A name may be bound more than once. Lookups see the most recent binding;
/// earlier ones are kept so a validator can report the redefinition via
/// [`BindingHash::duplicates`]. Iteration follows first-insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingHash {
    map: IndexMap<String, Vec<Binding>>,
}

impl BindingHash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, binding: Binding) {
        self.map.entry(name.into()).or_default().push(binding);
    }

    /// The binding currently visible for `name`.
    pub fn find(&self, name: &str) -> Option<&Binding> {
        self.map.get(name).and_then(|bindings| bindings.last())
    }

    /// Index bound to `name`, or `INVALID_INDEX` if unbound.
    pub fn find_index_by_name(&self, name: &str) -> Index {
        self.find(name).map_or(INVALID_INDEX, |b| b.index)
    }

    /// Resolve a var against this namespace: an index var is returned as-is
    /// (no bounds check), a name var is looked up.
    pub fn find_index(&self, var: &Var) -> Index {
        match &var.kind {
            VarKind::Index(index) => *index,
            VarKind::Name(name) => self.find_index_by_name(name),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Visible binding per name, in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.map
            .iter()
            .filter_map(|(name, bindings)| bindings.last().map(|b| (name.as_str(), b)))
    }

    /// Names bound more than once, with every binding in definition order.
    pub fn duplicates(&self) -> impl Iterator<Item = (&str, &[Binding])> {
        self.map
            .iter()
            .filter(|(_, bindings)| bindings.len() > 1)
            .map(|(name, bindings)| (name.as_str(), bindings.as_slice()))
    }

    /// Index → name table of length `len`, for diagnostics and writers.
    ///
    /// Entries with no name (or whose bound index is out of range) are `None`.
    /// When a name is bound to several indices, each index keeps that name.
    pub fn reverse_mapping(&self, len: usize) -> Vec<Option<&str>> {
        let mut names = vec![None; len];
        for (name, bindings) in &self.map {
            for binding in bindings {
                if let Some(slot) = names.get_mut(binding.index as usize) {
                    *slot = Some(name.as_str());
                }
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind(hash: &mut BindingHash, name: &str, index: Index) {
        hash.insert(name, Binding::new(Location::default(), index));
    }

    #[test]
    fn test_find_index_by_var() {
        let mut hash = BindingHash::new();
        bind(&mut hash, "$a", 0);
        bind(&mut hash, "$b", 1);

        assert_eq!(hash.find_index(&Var::name("$b")), 1);
        assert_eq!(hash.find_index(&Var::name("$missing")), INVALID_INDEX);
        // Index vars pass through without a bounds check.
        assert_eq!(hash.find_index(&Var::index(42)), 42);
    }

    #[test]
    fn test_later_binding_shadows_earlier() {
        let mut hash = BindingHash::new();
        bind(&mut hash, "$f", 0);
        bind(&mut hash, "$f", 3);

        assert_eq!(hash.find_index_by_name("$f"), 3);
        assert_eq!(hash.len(), 1);

        let dups: Vec<_> = hash.duplicates().collect();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].0, "$f");
        assert_eq!(
            dups[0].1.iter().map(|b| b.index).collect::<Vec<_>>(),
            vec![0, 3]
        );
    }

    #[test]
    fn test_reverse_mapping() {
        let mut hash = BindingHash::new();
        bind(&mut hash, "$x", 2);
        bind(&mut hash, "$y", 0);
        bind(&mut hash, "$far", 10);

        let names = hash.reverse_mapping(3);
        assert_eq!(names, vec![Some("$y"), None, Some("$x")]);
    }

    #[test]
    fn test_iter_follows_insertion_order() {
        let mut hash = BindingHash::new();
        bind(&mut hash, "$z", 0);
        bind(&mut hash, "$a", 1);
        let names: Vec<_> = hash.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["$z", "$a"]);
        assert!(hash.contains("$a"));
        assert!(!hash.is_empty());
    }
}
