//! Dependency maps and their transitive closure.

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

/// A dependency value as written in a declaration: nothing, one name, or
/// several names. Normalized to a list before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Deps {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl Deps {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Deps::None => Vec::new(),
            Deps::One(name) => vec![name],
            Deps::Many(names) => names,
        }
    }
}

/// Derived name (append or relation) → names it needs to be computed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DependencyMap {
    entries: BTreeMap<String, Vec<String>>,
}

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name` with its prerequisites. Re-declaring a name replaces
    /// its list.
    pub fn insert<I, S>(&mut self, name: impl Into<String>, deps: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .insert(name.into(), deps.into_iter().map(Into::into).collect());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Union of two maps. Keys present in both get the union of their lists.
    pub fn merged(&self, other: &DependencyMap) -> DependencyMap {
        let mut merged = self.clone();
        for (name, deps) in &other.entries {
            let slot = merged.entries.entry(name.clone()).or_default();
            for dep in deps {
                if !slot.contains(dep) {
                    slot.push(dep.clone());
                }
            }
        }
        merged
    }

    /// Requested names followed by everything they transitively depend on.
    ///
    /// Requested order is preserved and discovered names are appended in
    /// discovery order. Each key is expanded at most once, so cyclic
    /// declarations terminate.
    pub fn closure<I, S>(&self, requested: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut result: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut expanded: HashSet<String> = HashSet::new();

        for name in requested {
            let name = name.as_ref();
            if seen.insert(name.to_string()) {
                result.push(name.to_string());
                if self.contains(name) {
                    queue.push_back(name.to_string());
                }
            }
        }

        while let Some(name) = queue.pop_front() {
            if !expanded.insert(name.clone()) {
                continue;
            }
            for dep in self.get(&name).unwrap_or_default() {
                if seen.insert(dep.clone()) {
                    result.push(dep.clone());
                }
                if self.contains(dep) && !expanded.contains(dep) {
                    queue.push_back(dep.clone());
                }
            }
        }

        result
    }
}

impl<K: Into<String>> FromIterator<(K, Deps)> for DependencyMap {
    fn from_iter<T: IntoIterator<Item = (K, Deps)>>(iter: T) -> Self {
        let mut map = DependencyMap::new();
        for (name, deps) in iter {
            map.insert(name, deps.into_vec());
        }
        map
    }
}
