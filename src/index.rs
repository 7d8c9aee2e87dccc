//! Secondary indexes: a name, a match predicate, and a degree-3 [Btree]
//! keyed by whatever the predicate matched against.

use std::sync::Arc;

use crate::btree::{Btree, Comparator};
use crate::error::{Error, Result};
use crate::item::Item;

/// Which half of an [Item] an index is built over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexKind {
    Key,
    Value,
}

/// A predicate over the projected string (`item.key` or `item.value`,
/// depending on [IndexKind]).
pub type Matcher = Arc<dyn Fn(&str) -> bool + Send + Sync>;

pub fn prefix_matcher(prefix: impl Into<String>) -> Matcher {
    let prefix = prefix.into();
    Arc::new(move |s: &str| s.starts_with(prefix.as_str()))
}

pub fn wildcard_matcher() -> Matcher {
    Arc::new(|_s: &str| true)
}

pub fn regex_matcher(pattern: &str) -> Result<Matcher> {
    let re = regex::Regex::new(pattern)?;
    Ok(Arc::new(move |s: &str| re.is_match(s)))
}

fn natural_order() -> Comparator<String> {
    Arc::new(|a: &String, b: &String| a.cmp(b))
}

/// An index's own B-tree is always degree 3. Larger degrees only pay off
/// for much larger trees than a single bucket's secondary index tends to
/// hold.
const INDEX_DEGREE: usize = 3;

#[derive(Clone)]
pub struct Index {
    name: String,
    kind: IndexKind,
    matcher: Matcher,
    tree: Btree<String, Item>,
}

impl Index {
    pub fn new(name: impl Into<String>, kind: IndexKind, matcher: Matcher) -> Result<Index> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidIndexName);
        }
        let tree = Btree::with_comparator(INDEX_DEGREE, natural_order())?;
        Ok(Index { name, kind, matcher, tree })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    /// The string an item is matched and keyed on: its key for a
    /// [IndexKind::Key] index, its value for a [IndexKind::Value] index.
    fn projection<'a>(&self, item: &'a Item) -> &'a str {
        match self.kind {
            IndexKind::Key => &item.key,
            IndexKind::Value => &item.value,
        }
    }

    pub fn matches(&self, item: &Item) -> bool {
        (self.matcher)(self.projection(item))
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Empties the index's tree while keeping its name, kind and matcher.
    pub fn clear(&mut self) {
        self.tree = Btree::with_comparator(INDEX_DEGREE, natural_order())
            .expect("index degree is a compile-time constant known to be valid");
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Adds `item` to this index's tree. Caller is responsible for checking
    /// [Index::matches] first.
    pub fn add(&mut self, item: Item) {
        let key = self.projection(&item).to_string();
        self.tree.insert(key, item);
    }

    /// Removes the entry for this item, identified by its bucket key (the
    /// item's `key` field uniquely identifies it within its bucket even for
    /// a value-typed index, where several items can share the same
    /// projected value).
    pub fn remove(&mut self, item: &Item) {
        let key = self.projection(item).to_string();
        self.tree.remove_where(&key, |stored| stored.key == item.key);
    }

    /// All items in projection order.
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.tree.iter().map(|(_, v)| v)
    }
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_index_matches_on_key_not_value() {
        let index = Index::new("by-prefix", IndexKind::Key, prefix_matcher("user:")).unwrap();
        assert!(index.matches(&Item::new("user:1", "anything")));
        assert!(!index.matches(&Item::new("order:1", "user:1")));
    }

    #[test]
    fn value_index_matches_on_value_not_key() {
        let index = Index::new("by-value", IndexKind::Value, prefix_matcher("user:")).unwrap();
        assert!(!index.matches(&Item::new("user:1", "anything")));
        assert!(index.matches(&Item::new("order:1", "user:1")));
    }

    #[test]
    fn add_and_iterate_in_projection_order() {
        let mut index = Index::new("by-value", IndexKind::Value, wildcard_matcher()).unwrap();
        index.add(Item::new("k3", "c"));
        index.add(Item::new("k1", "a"));
        index.add(Item::new("k2", "b"));
        let values: Vec<&str> = index.iter().map(|i| i.value.as_str()).collect();
        assert_eq!(values, vec!["a", "b", "c"]);
    }

    #[test]
    fn remove_only_drops_the_matching_item_not_siblings_sharing_a_value() {
        let mut index = Index::new("by-value", IndexKind::Value, wildcard_matcher()).unwrap();
        index.add(Item::new("k1", "shared"));
        index.add(Item::new("k2", "shared"));
        index.remove(&Item::new("k1", "shared"));
        let keys: Vec<&str> = index.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["k2"]);
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(Index::new("", IndexKind::Key, wildcard_matcher()), Err(Error::InvalidIndexName)));
    }
}
