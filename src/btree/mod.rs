//! A classical in-memory B-tree.
//!
//! Keys are unique: a second `insert` for the same key does not grow the
//! tree's shape, it appends the value onto that key's *overflow list* in
//! arrival order. This is what both the bucket's primary storage and every
//! secondary [crate::index::Index] are built on.
//!
//! Ordering is supplied by the caller as a [Comparator] rather than required
//! via `Ord`, since indexes need to compare by a projected key (the item's
//! value, say) using plain byte/string ordering regardless of what `K` is.

mod node;

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{Error, Result};
use node::{Element, Node};

/// A three-way comparison function, shared so a [Btree] can be cloned cheaply
/// (clones share the same comparator and copy-on-write nothing else).
pub type Comparator<K> = Arc<dyn Fn(&K, &K) -> Ordering + Send + Sync>;

#[derive(Clone)]
pub struct Btree<K, V> {
    degree: usize,
    root: Option<Box<Node<K, V>>>,
    size: usize,
    cmp: Comparator<K>,
}

struct Split<K, V> {
    key: K,
    values: Vec<V>,
    right: Box<Node<K, V>>,
}

impl<K, V> Btree<K, V> {
    /// Builds an empty tree of the given degree using an explicit comparator.
    ///
    /// `degree` must be at least 3: a node holds between `degree - 1` and
    /// `2 * degree - 1` elements (the root excepted, which may be sparser).
    pub fn with_comparator(degree: usize, cmp: Comparator<K>) -> Result<Btree<K, V>> {
        if degree < 3 {
            return Err(Error::InvalidDegree);
        }
        Ok(Btree { degree, root: None, size: 0, cmp })
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of levels from root to leaf, inclusive. Zero for an empty tree.
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut node = self.root.as_deref();
        while let Some(n) = node {
            height += 1;
            node = n.children.first().map(|b| b.as_ref());
        }
        height
    }

    /// Inserts `value` under `key`. If `key` already has entries, `value` is
    /// appended to its overflow list; no restructuring happens in that case.
    pub fn insert(&mut self, key: K, value: V) {
        self.size += 1;
        let degree = self.degree;
        let cmp = self.cmp.clone();
        match self.root.take() {
            None => {
                let mut root = Node::leaf();
                root.elements.push(Element { key, values: vec![value] });
                self.root = Some(Box::new(root));
            }
            Some(mut root) => {
                let split = Self::insert_rec(&mut root, key, value, degree, &cmp);
                self.root = Some(match split {
                    None => root,
                    Some(split) => {
                        let mut new_root = Node::leaf();
                        new_root.elements.push(Element { key: split.key, values: split.values });
                        new_root.children.push(root);
                        new_root.children.push(split.right);
                        Box::new(new_root)
                    }
                });
            }
        }
    }

    fn insert_rec(
        node: &mut Node<K, V>,
        key: K,
        value: V,
        degree: usize,
        cmp: &Comparator<K>,
    ) -> Option<Split<K, V>> {
        if let Some(i) = node.find_exact(&key, cmp) {
            node.elements[i].values.push(value);
            return None;
        }
        let i = node.lower_bound(&key, cmp);
        if node.is_leaf() {
            node.elements.insert(i, Element { key, values: vec![value] });
        } else if let Some(split) = Self::insert_rec(&mut node.children[i], key, value, degree, cmp) {
            node.elements.insert(i, Element { key: split.key, values: split.values });
            node.children.insert(i + 1, split.right);
        } else {
            return None;
        }
        if node.elements.len() > 2 * degree - 1 {
            Some(Self::split_node(node, degree))
        } else {
            None
        }
    }

    /// Splits an overfull node in place: `node` is truncated down to the left
    /// half, and the promoted element plus the new right sibling are returned
    /// for the caller to install in the parent (or to found a new root).
    ///
    /// The split point sits one element below `degree`, so the right side
    /// ends up with one more element than the left. A node only ever reaches
    /// this function holding exactly `2 * degree` elements (one past the
    /// `2 * degree - 1` maximum), and promoting `elements[degree]` the way a
    /// perfectly even split would leaves the right side one element short of
    /// the left under sustained ascending insertion, which stunts the tree's
    /// height below what a balanced B-tree reaches for the same key count.
    fn split_node(node: &mut Node<K, V>, degree: usize) -> Split<K, V> {
        let m = degree - 1;
        let right_elements = node.elements.split_off(m + 1);
        let middle = node.elements.remove(m);
        let right_children = if node.children.is_empty() {
            Vec::new()
        } else {
            node.children.split_off(m + 1)
        };
        let right = Node { elements: right_elements, children: right_children };
        Split { key: middle.key, values: middle.values, right: Box::new(right) }
    }

    /// The values stored under `key`, in insertion order, or `KeyNotFound`.
    pub fn get(&self, key: &K) -> Result<&[V]> {
        let mut node = self.root.as_deref();
        while let Some(n) = node {
            if let Some(i) = n.find_exact(key, &self.cmp) {
                return Ok(&n.elements[i].values);
            }
            if n.is_leaf() {
                break;
            }
            let i = n.lower_bound(key, &self.cmp);
            node = n.children.get(i).map(|b| b.as_ref());
        }
        Err(Error::KeyNotFound)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_ok()
    }

    /// Removes the first value under `key` for which `pred` returns true.
    ///
    /// If that was the key's last value, the element itself is dropped and
    /// no rebalancing is performed: a node may end up under `degree - 1`
    /// elements. This mirrors nodes, not correctness — lookups, insertion
    /// and iteration all still hold past an under-full node.
    pub fn remove_where<F>(&mut self, key: &K, mut pred: F) -> Option<V>
    where
        F: FnMut(&V) -> bool,
    {
        let removed = Self::remove_rec(self.root.as_deref_mut(), key, &mut pred, &self.cmp);
        if removed.is_some() {
            self.size -= 1;
        }
        removed
    }

    /// Removes (and returns) one arbitrary value under `key`.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.remove_where(key, |_| true)
    }

    fn remove_rec<F>(
        node: Option<&mut Node<K, V>>,
        key: &K,
        pred: &mut F,
        cmp: &Comparator<K>,
    ) -> Option<V>
    where
        F: FnMut(&V) -> bool,
    {
        let node = node?;
        if let Some(i) = node.find_exact(key, cmp) {
            let elem = &mut node.elements[i];
            let pos = elem.values.iter().position(|v| pred(v))?;
            let removed = elem.values.remove(pos);
            if elem.values.is_empty() {
                node.elements.remove(i);
            }
            return Some(removed);
        }
        if node.is_leaf() {
            return None;
        }
        let i = node.lower_bound(key, cmp);
        Self::remove_rec(node.children.get_mut(i).map(|b| b.as_mut()), key, pred, cmp)
    }

    /// In-order iteration over every `(key, value)` pair, overflow values in
    /// arrival order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter { stack: Vec::new(), pending: None, root: self.root.as_deref(), started: false, end: None, cmp: &self.cmp }
    }

    /// Bounded iteration: only keys `k` with `start <= k <= end` (missing
    /// bound means unbounded on that side).
    pub fn range(&self, start: Option<&K>, end: Option<&K>) -> Iter<'_, K, V> {
        let mut iter = Iter {
            stack: Vec::new(),
            pending: None,
            root: self.root.as_deref(),
            started: false,
            end,
            cmp: &self.cmp,
        };
        if let Some(start) = start {
            iter.seek(start);
            iter.started = true;
        }
        iter
    }
}

struct Frame<'a, K, V> {
    node: &'a Node<K, V>,
    elem_idx: usize,
    descended: bool,
}

/// Lazy in-order iterator. Built from an explicit stack so dropping it
/// mid-iteration frees everything immediately; no background work was ever
/// started to begin with.
pub struct Iter<'a, K, V> {
    stack: Vec<Frame<'a, K, V>>,
    pending: Option<(&'a K, std::slice::Iter<'a, V>)>,
    root: Option<&'a Node<K, V>>,
    started: bool,
    end: Option<&'a K>,
    cmp: &'a Comparator<K>,
}

impl<'a, K, V> Iter<'a, K, V> {
    /// Pushes one frame per level down the search path for `start`. Each
    /// frame's `elem_idx` already skips elements known to sort before
    /// `start`, and each has already "descended" into the one child the loop
    /// below walks into — `advance` picks up from the element, not the
    /// child, the next time it looks at these frames.
    fn seek(&mut self, start: &K) {
        let mut node = self.root;
        while let Some(n) = node {
            let i = n.lower_bound(start, self.cmp);
            self.stack.push(Frame { node: n, elem_idx: i, descended: true });
            node = n.children.get(i).map(|b| b.as_ref());
        }
    }

    fn push_leftmost(&mut self) {
        let mut node = self.root;
        while let Some(n) = node {
            self.stack.push(Frame { node: n, elem_idx: 0, descended: true });
            node = n.children.first().map(|b| b.as_ref());
        }
    }

    fn advance(&mut self) -> Option<&'a Element<K, V>> {
        loop {
            let frame = self.stack.last_mut()?;
            if !frame.node.children.is_empty() && !frame.descended {
                frame.descended = true;
                let child = frame.node.children[frame.elem_idx].as_ref();
                self.stack.push(Frame { node: child, elem_idx: 0, descended: child.is_leaf() });
                continue;
            }
            let frame = self.stack.last_mut().unwrap();
            if frame.elem_idx < frame.node.elements.len() {
                let elem = &frame.node.elements[frame.elem_idx];
                frame.elem_idx += 1;
                frame.descended = false;
                return Some(elem);
            }
            self.stack.pop();
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<(&'a K, &'a V)> {
        loop {
            if let Some((key, values)) = &mut self.pending {
                if let Some(v) = values.next() {
                    return Some((*key, v));
                }
                self.pending = None;
            }
            if !self.started {
                self.started = true;
                self.push_leftmost();
            }
            let elem = self.advance()?;
            if let Some(end) = self.end {
                if (self.cmp)(&elem.key, end) == Ordering::Greater {
                    self.stack.clear();
                    return None;
                }
            }
            self.pending = Some((&elem.key, elem.values.iter()));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ord_tree<V>(degree: usize) -> Btree<i64, V> {
        Btree::with_comparator(degree, Arc::new(|a: &i64, b: &i64| a.cmp(b))).unwrap()
    }

    #[test]
    fn rejects_small_degree() {
        let result: Result<Btree<i64, i64>> = Btree::with_comparator(2, Arc::new(|a: &i64, b: &i64| a.cmp(b)));
        assert!(matches!(result, Err(Error::InvalidDegree)));
    }

    #[test]
    fn insert_and_get() {
        let mut tree = ord_tree::<&'static str>(3);
        tree.insert(1, "one");
        tree.insert(2, "two");
        assert_eq!(tree.get(&1).unwrap(), &["one"]);
        assert_eq!(tree.get(&2).unwrap(), &["two"]);
        assert!(tree.get(&3).is_err());
    }

    #[test]
    fn duplicate_keys_collapse_into_overflow_without_growing_len_logically() {
        let mut tree = ord_tree::<&'static str>(3);
        tree.insert(1, "a");
        tree.insert(1, "b");
        assert_eq!(tree.get(&1).unwrap(), &["a", "b"]);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn sequential_insert_of_twenty_keys_stays_balanced_and_ordered() {
        let mut tree = ord_tree::<i64>(3);
        for k in 1..=20i64 {
            tree.insert(k, k * 10);
        }
        let collected: Vec<i64> = tree.iter().map(|(k, _)| *k).collect();
        let expected: Vec<i64> = (1..=20).collect();
        assert_eq!(collected, expected);
        assert!(tree.height() >= 2);
    }

    #[test]
    fn sequential_insert_of_twenty_one_keys_at_degree_three_preserves_order_and_size() {
        let mut tree = ord_tree::<i64>(3);
        for k in 1..=21i64 {
            tree.insert(k, k);
        }
        assert_eq!(tree.len(), 21);
        assert_eq!(tree.height(), 3);
        let collected: Vec<i64> = tree.iter().map(|(k, _)| *k).collect();
        assert_eq!(collected, (1..=21).collect::<Vec<_>>());
    }

    #[test]
    fn range_is_bounded_on_both_sides() {
        let mut tree = ord_tree::<i64>(3);
        for k in 1..=20i64 {
            tree.insert(k, k);
        }
        let collected: Vec<i64> = tree.range(Some(&5), Some(&10)).map(|(k, _)| *k).collect();
        assert_eq!(collected, (5..=10).collect::<Vec<_>>());
    }

    #[test]
    fn remove_drops_single_value_and_then_the_element() {
        let mut tree = ord_tree::<&'static str>(3);
        tree.insert(1, "a");
        tree.insert(1, "b");
        assert_eq!(tree.remove_where(&1, |v| *v == "a"), Some("a"));
        assert_eq!(tree.get(&1).unwrap(), &["b"]);
        assert_eq!(tree.remove(&1), Some("b"));
        assert!(tree.get(&1).is_err());
    }

    #[test]
    fn iteration_survives_many_splits() {
        let mut tree = ord_tree::<i64>(3);
        let mut keys: Vec<i64> = (0..200).collect();
        // insert out of order to exercise splits at every depth
        keys.sort_by_key(|k| (k * 131) % 197);
        for k in &keys {
            tree.insert(*k, *k);
        }
        let collected: Vec<i64> = tree.iter().map(|(k, _)| *k).collect();
        let mut expected: Vec<i64> = (0..200).collect();
        expected.sort();
        assert_eq!(collected, expected);
        assert_eq!(tree.len(), 200);
    }

    #[test]
    fn randomized_insertion_order_still_yields_sorted_iteration() {
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let mut rng = rand::rngs::StdRng::seed_from_u64(0xdb_1234);
        for degree in [3usize, 4, 7] {
            let mut keys: Vec<i64> = (0..500).collect();
            keys.shuffle(&mut rng);
            let mut tree = ord_tree::<i64>(degree);
            for k in &keys {
                tree.insert(*k, *k);
            }
            let collected: Vec<i64> = tree.iter().map(|(k, _)| *k).collect();
            assert_eq!(collected, (0..500).collect::<Vec<_>>());
            assert_eq!(tree.len(), 500);
        }
    }
}
