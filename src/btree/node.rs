//! Node and element representation for [super::Btree].

use std::cmp::Ordering;

use super::Comparator;

/// One sorted slot in a node: a key plus every value inserted under that key,
/// in arrival order (the "overflow list").
#[derive(Clone)]
pub(crate) struct Element<K, V> {
    pub(crate) key: K,
    pub(crate) values: Vec<V>,
}

#[derive(Clone)]
pub(crate) struct Node<K, V> {
    pub(crate) elements: Vec<Element<K, V>>,
    pub(crate) children: Vec<Box<Node<K, V>>>,
}

impl<K, V> Node<K, V> {
    pub(crate) fn leaf() -> Node<K, V> {
        Node { elements: Vec::new(), children: Vec::new() }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Index of the first element whose key is not-less-than `key`.
    pub(crate) fn lower_bound(&self, key: &K, cmp: &Comparator<K>) -> usize {
        let mut lo = 0usize;
        let mut hi = self.elements.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match cmp(&self.elements[mid].key, key) {
                Ordering::Less => lo = mid + 1,
                _ => hi = mid,
            }
        }
        lo
    }

    /// Exact position of `key` among this node's own elements, if present here.
    pub(crate) fn find_exact(&self, key: &K, cmp: &Comparator<K>) -> Option<usize> {
        let idx = self.lower_bound(key, cmp);
        if idx < self.elements.len() && cmp(&self.elements[idx].key, key) == Ordering::Equal {
            Some(idx)
        } else {
            None
        }
    }
}
