//! Insertion-ordered, grow-only set of excluded type names.

use std::collections::HashSet;

use crate::core::types::TypeName;

/// Type names omitted from every manifest built from now on.
///
/// The set only grows: there is no removal API. Iteration yields names in the
/// order they were first excluded so log output stays stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    order: Vec<TypeName>,
    index: HashSet<TypeName>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from a seed list, copying the names.
    pub fn seeded<I, S>(seed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        set.extend_new(seed);
        set
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    /// Add every name not already present; return the newly added ones in order.
    pub fn extend_new<I, S>(&mut self, names: I) -> Vec<TypeName>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = Vec::new();
        for name in names {
            let name = name.as_ref();
            if self.index.insert(name.to_string()) {
                self.order.push(name.to_string());
                added.push(name.to_string());
            }
        }
        added
    }

    pub fn to_vec(&self) -> Vec<TypeName> {
        self.order.clone()
    }
}
