//! A bucket is a flat namespace of key/value items, plus whatever secondary
//! indexes have been declared on it. The bucket named `""` is the root
//! bucket: it always exists and can never be deleted.
//!
//! `Bucket` has no back-reference to the database that owns it — unlike the
//! source's `bucket.db` pointer, which existed only so `isRoot` could ask
//! the database whether `self` was its root. Ownership is one-directional
//! here ([crate::db::Database] owns a map of buckets outright), and "is this
//! the root" is just a name comparison anyone already holding the bucket can
//! make themselves.

use std::collections::HashMap;

use crate::index::Index;
use crate::item::Item;

/// Name of the bucket that always exists and cannot be deleted.
pub const ROOT: &str = "";

#[derive(Clone)]
pub(crate) struct Bucket {
    name: String,
    data: HashMap<String, Item>,
    indexes: HashMap<String, Index>,
}

impl Bucket {
    pub(crate) fn new(name: impl Into<String>) -> Bucket {
        Bucket { name: name.into(), data: HashMap::new(), indexes: HashMap::new() }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_root(&self) -> bool {
        self.name == ROOT
    }

    pub(crate) fn get(&self, key: &str) -> Option<&Item> {
        self.data.get(key)
    }

    pub(crate) fn exists(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Item> {
        self.data.values()
    }

    /// Inserts or overwrites `item`, keeping every index consistent: any
    /// stale entry under the previous value is dropped and a fresh one is
    /// added wherever the new item now matches.
    pub(crate) fn insert(&mut self, item: Item) {
        let previous = self.data.insert(item.key.clone(), item.clone());
        for index in self.indexes.values_mut() {
            if let Some(previous) = &previous {
                index.remove(previous);
            }
            if index.matches(&item) {
                index.add(item.clone());
            }
        }
    }

    /// Removes `key`, dropping it from every index it matched. Returns the
    /// removed item, if any.
    pub(crate) fn delete(&mut self, key: &str) -> Option<Item> {
        let item = self.data.remove(key)?;
        for index in self.indexes.values_mut() {
            if index.matches(&item) {
                index.remove(&item);
            }
        }
        Some(item)
    }

    pub(crate) fn clear(&mut self) {
        self.data.clear();
        for index in self.indexes.values_mut() {
            index.clear();
        }
    }

    pub(crate) fn add_index(&mut self, mut index: Index) -> bool {
        if self.indexes.contains_key(index.name()) {
            return false;
        }
        for item in self.data.values() {
            if index.matches(item) {
                index.add(item.clone());
            }
        }
        self.indexes.insert(index.name().to_string(), index);
        true
    }

    pub(crate) fn delete_index(&mut self, name: &str) -> bool {
        self.indexes.remove(name).is_some()
    }

    pub(crate) fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.get(name)
    }

    pub(crate) fn index_names(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(|s| s.as_str())
    }

    /// Replays an undo journal in a single pass: a `None` prior means the
    /// key didn't exist before the transaction touched it, so it's deleted;
    /// `Some(item)` means the prior value is reinserted, overwriting
    /// whatever the transaction left behind.
    pub(crate) fn rollback(&mut self, items: HashMap<String, Option<Item>>) {
        for (key, prior) in items {
            match prior {
                None => {
                    self.delete(&key);
                }
                Some(item) => {
                    self.insert(item);
                }
            }
        }
    }
}
