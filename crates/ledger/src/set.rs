//! Ordered, deduplicated descriptor collection.
//!
//! Identity comes from [`Keyed::key`]: case-insensitive, with the keyless
//! (`None`) descriptor sorting before any keyed one. The backing map keeps
//! a consistent total order so serialization is deterministic regardless of
//! insertion order.

use common::Keyed;
use std::collections::BTreeMap;

/// Normalized ordering key. `None` (assembly-level) sorts first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SetKey(Option<String>);

fn normalize(key: Option<String>) -> SetKey {
    SetKey(key.map(|k| k.to_lowercase()))
}

/// Sorted set of descriptors, unique by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSet<T: Keyed> {
    items: BTreeMap<SetKey, T>,
}

impl<T: Keyed + Clone> DescriptorSet<T> {
    pub fn new() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }

    /// Inserts `item`; returns `false` (set unchanged) when a descriptor
    /// with the same key already exists. One descriptor per key per
    /// snapshot — callers replace explicitly.
    pub fn insert(&mut self, item: T) -> bool {
        let key = normalize(item.key());
        if self.items.contains_key(&key) {
            return false;
        }
        self.items.insert(key, item);
        true
    }

    /// Removes every descriptor matching `pred`; returns the count removed.
    /// Collection-only: backing files are untouched.
    pub fn remove_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> usize {
        let before = self.items.len();
        self.items.retain(|_, item| !pred(item));
        before - self.items.len()
    }

    /// Looks up a descriptor by its (case-insensitive) key.
    pub fn get(&self, key: Option<&str>) -> Option<&T> {
        self.items
            .get(&normalize(key.map(|k| k.to_owned())))
    }

    pub fn contains(&self, key: Option<&str>) -> bool {
        self.get(key).is_some()
    }

    /// Materialized list in comparator order (serialization order).
    pub fn items(&self) -> Vec<T> {
        self.items.values().cloned().collect()
    }

    /// Clears and re-adds each element under the duplicate-rejection rule.
    /// Callers must not feed pre-duplicated data; a duplicate is dropped
    /// with a warning.
    pub fn set_items(&mut self, items: Vec<T>) {
        self.items.clear();
        for item in items {
            if !self.insert(item) {
                tracing::warn!("duplicate descriptor key dropped during set_items");
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::AssemblyDependencyDescriptor;
    use common::GeneratedUnitDescriptor;
    use std::path::{Path, PathBuf};

    fn descriptor(path: Option<&str>) -> GeneratedUnitDescriptor {
        GeneratedUnitDescriptor {
            source_file_path: path.map(PathBuf::from),
            last_modified: None,
            generated_asset_keys: vec![],
        }
    }

    #[test]
    fn test_insert_rejects_case_insensitive_duplicate() {
        let mut set = DescriptorSet::new();
        assert!(set.insert(descriptor(Some("src/Foo.rs"))));
        assert!(!set.insert(descriptor(Some("src/foo.rs"))));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_none_sorts_before_some() {
        let mut set = DescriptorSet::new();
        set.insert(descriptor(Some("a.rs")));
        set.insert(descriptor(None));
        let items = set.items();
        assert!(items[0].source_file_path.is_none());
        assert_eq!(items[1].source_file_path.as_deref(), Some(Path::new("a.rs")));
    }

    #[test]
    fn test_items_in_comparator_order_regardless_of_insertion() {
        let mut set = DescriptorSet::new();
        set.insert(descriptor(Some("zeta.rs")));
        set.insert(descriptor(Some("Alpha.rs")));
        set.insert(descriptor(Some("midway.rs")));
        let keys: Vec<_> = set
            .items()
            .iter()
            .map(|d| d.source_file_path.clone().unwrap())
            .collect();
        assert_eq!(
            keys,
            vec![
                PathBuf::from("Alpha.rs"),
                PathBuf::from("midway.rs"),
                PathBuf::from("zeta.rs")
            ]
        );
    }

    #[test]
    fn test_remove_where_counts() {
        let mut set = DescriptorSet::new();
        set.insert(descriptor(Some("a.rs")));
        set.insert(descriptor(Some("b.rs")));
        set.insert(descriptor(Some("c.rs")));
        let removed = set.remove_where(|d| {
            d.source_file_path
                .as_deref()
                .is_some_and(|p| p != Path::new("b.rs"))
        });
        assert_eq!(removed, 2);
        assert_eq!(set.len(), 1);
        assert!(set.contains(Some("b.rs")));
    }

    #[test]
    fn test_dependency_descriptor_key_is_path() {
        let mut set = DescriptorSet::new();
        assert!(set.insert(AssemblyDependencyDescriptor::new("/opt/gen/libacme.so")));
        assert!(!set.insert(AssemblyDependencyDescriptor::new("/opt/gen/LIBACME.SO")));
        assert_eq!(set.len(), 1);
    }
}
