//! Transactions: the only way application code touches a [crate::db::Database].
//!
//! A transaction holds the database's bucket-map lock for its entire
//! duration (a read lock for `Read`, a write lock for `ReadWrite`), plus an
//! undo journal (`rollbacks`, `rollback_buckets`) and a `commits` map that
//! the owning database drains on success to feed persistence and pub/sub.

use std::collections::HashMap;
use std::sync::{RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use crate::bucket::{self, Bucket};
use crate::error::{Error, Result};
use crate::index::{Index, IndexKind, Matcher};
use crate::item::{Item, SetMetadata};

pub(crate) struct RollbackInfo {
    /// `None` means the key did not exist before this transaction touched
    /// it, so rolling back means deleting it.
    items: HashMap<String, Option<Item>>,
}

impl RollbackInfo {
    fn new() -> RollbackInfo {
        RollbackInfo { items: HashMap::new() }
    }
}

pub(crate) enum Guard<'db> {
    Read(RwLockReadGuard<'db, HashMap<String, Bucket>>),
    Write(RwLockWriteGuard<'db, HashMap<String, Bucket>>),
}

/// A transaction in progress. Borrowed mutably by the closure passed to
/// [Database::read] / [Database::read_write] and nowhere else — it cannot
/// outlive the call that created it.
pub struct Transaction<'db> {
    pub(crate) id: u128,
    write: bool,
    guard: Guard<'db>,
    pub(crate) rollbacks: HashMap<String, RollbackInfo>,
    pub(crate) rollback_buckets: HashMap<String, Option<Bucket>>,
    pub(crate) commits: HashMap<String, Option<Item>>,
    pub(crate) hooks: Vec<Box<dyn FnOnce() + 'db>>,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(id: u128, write: bool, guard: Guard<'db>) -> Transaction<'db> {
        Transaction {
            id,
            write,
            guard,
            rollbacks: HashMap::new(),
            rollback_buckets: HashMap::new(),
            commits: HashMap::new(),
            hooks: Vec::new(),
        }
    }

    pub fn is_write(&self) -> bool {
        self.write
    }

    pub(crate) fn buckets(&self) -> &HashMap<String, Bucket> {
        match &self.guard {
            Guard::Read(g) => g,
            Guard::Write(g) => g,
        }
    }

    fn buckets_mut(&mut self) -> Result<&mut HashMap<String, Bucket>> {
        match &mut self.guard {
            Guard::Write(g) => Ok(g),
            Guard::Read(_) => Err(Error::NotWriteTransaction),
        }
    }

    fn require_write(&self) -> Result<()> {
        if self.write {
            Ok(())
        } else {
            Err(Error::NotWriteTransaction)
        }
    }

    fn add_rollback(&mut self, bucket: &str, key: &str, prior: Option<Item>) {
        if !self.write {
            return;
        }
        // First mutation of a key within a transaction wins: later sets of
        // the same key must roll back to the value from *before the
        // transaction started*, not to an intermediate value it passed
        // through.
        self.rollbacks
            .entry(bucket.to_string())
            .or_insert_with(RollbackInfo::new)
            .items
            .entry(key.to_string())
            .or_insert(prior);
    }

    fn add_rollback_bucket(&mut self, name: &str, prior: Option<Bucket>) {
        self.rollback_buckets.entry(name.to_string()).or_insert(prior);
    }

    fn add_commit(&mut self, key: String, item: Option<Item>) {
        self.commits.insert(key, item);
    }

    fn ensure_bucket(&mut self, name: &str) -> Result<()> {
        if !self.buckets().contains_key(name) {
            self.add_bucket(name)?;
        }
        Ok(())
    }

    /// Adds post-commit hooks, run in order immediately after a successful
    /// commit (before persistence and pub/sub). Hooks run even on a read
    /// transaction.
    pub fn hook(&mut self, f: impl FnOnce() + 'db) {
        self.hooks.push(Box::new(f));
    }

    /// A key whose TTL has lapsed reads as absent even before the
    /// background sweeper gets around to deleting it.
    pub fn get(&self, bucket: &str, key: &str) -> Result<String> {
        let now = SystemTime::now();
        self.buckets()
            .get(bucket)
            .and_then(|b| b.get(key))
            .filter(|item| !item.is_expired_at(now))
            .map(|item| item.value.clone())
            .ok_or(Error::KeyNotFound)
    }

    pub fn exists(&self, bucket: &str, key: &str) -> bool {
        let now = SystemTime::now();
        self.buckets()
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|item| !item.is_expired_at(now))
            .unwrap_or(false)
    }

    /// Sets `key` to `value` in `bucket`, auto-creating the bucket if it
    /// doesn't exist yet.
    pub fn set(&mut self, bucket: &str, key: &str, value: &str, metadata: SetMetadata) -> Result<()> {
        self.require_write()?;
        self.ensure_bucket(bucket)?;
        let prior = self.buckets().get(bucket).and_then(|b| b.get(key)).cloned();
        self.add_rollback(bucket, key, prior);
        let item = Item { key: key.to_string(), value: value.to_string(), metadata: metadata.to_metadata(SystemTime::now()) };
        self.buckets_mut()?.get_mut(bucket).expect("just ensured to exist").insert(item.clone());
        self.add_commit(key.to_string(), Some(item));
        Ok(())
    }

    /// Deletes `key` from `bucket`. Fails with [Error::KeyNotFound] if absent.
    pub fn delete(&mut self, bucket: &str, key: &str) -> Result<()> {
        self.require_write()?;
        let prior = match self.buckets().get(bucket).and_then(|b| b.get(key)).cloned() {
            Some(item) => item,
            None => return Err(Error::KeyNotFound),
        };
        self.add_rollback(bucket, key, Some(prior));
        if let Some(b) = self.buckets_mut()?.get_mut(bucket) {
            b.delete(key);
        }
        self.add_commit(key.to_string(), None);
        Ok(())
    }

    /// Empties every key (and index) out of `bucket`. Not journaled:
    /// rolling back a transaction that cleared a bucket does not restore
    /// its contents, matching the source's behavior.
    pub fn clear(&mut self, bucket: &str) -> Result<()> {
        self.require_write()?;
        if let Some(b) = self.buckets_mut()?.get_mut(bucket) {
            b.clear();
        }
        Ok(())
    }

    /// Creates `bucket` if absent. Returns whether it was created.
    pub fn add_bucket(&mut self, name: &str) -> Result<bool> {
        self.require_write()?;
        let created = {
            let buckets = self.buckets_mut()?;
            if buckets.contains_key(name) {
                false
            } else {
                buckets.insert(name.to_string(), Bucket::new(name));
                true
            }
        };
        if created {
            self.add_rollback_bucket(name, None);
        }
        Ok(created)
    }

    /// Deletes `bucket`. The root bucket can never be deleted.
    pub fn delete_bucket(&mut self, name: &str) -> Result<bool> {
        self.require_write()?;
        if name == bucket::ROOT {
            return Err(Error::CannotDeleteRootBucket);
        }
        let removed = self.buckets_mut()?.remove(name);
        match removed {
            Some(b) => {
                self.add_rollback_bucket(name, Some(b));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// All bucket names, root first.
    pub fn bucket_names(&self) -> Vec<&str> {
        let mut names = vec![bucket::ROOT];
        for name in self.buckets().keys() {
            if name != bucket::ROOT {
                names.push(name.as_str());
            }
        }
        names
    }

    pub fn add_index(&mut self, bucket: &str, name: &str, kind: IndexKind, matcher: Matcher) -> Result<()> {
        self.require_write()?;
        self.ensure_bucket(bucket)?;
        let index = Index::new(name, kind, matcher)?;
        let added = self.buckets_mut()?.get_mut(bucket).expect("just ensured to exist").add_index(index);
        if !added {
            return Err(Error::IndexAlreadyExists);
        }
        Ok(())
    }

    pub fn delete_index(&mut self, bucket: &str, name: &str) -> Result<bool> {
        self.require_write()?;
        Ok(self.buckets_mut()?.get_mut(bucket).map(|b| b.delete_index(name)).unwrap_or(false))
    }

    /// Every item in `bucket`, in arbitrary order.
    pub fn iter(&self, bucket: &str) -> impl Iterator<Item = &Item> {
        self.buckets().get(bucket).into_iter().flat_map(|b| b.iter())
    }

    /// Every item in the named index, in the index's projection order.
    pub fn iterate_index(&self, bucket: &str, index_name: &str) -> Result<impl Iterator<Item = &Item>> {
        let b = self.buckets().get(bucket).ok_or(Error::IndexDoesNotExist)?;
        let index = b.index(index_name).ok_or(Error::IndexDoesNotExist)?;
        Ok(index.iter())
    }

    pub(crate) fn take_rollback_buckets(&mut self) -> HashMap<String, Option<Bucket>> {
        std::mem::take(&mut self.rollback_buckets)
    }

    pub(crate) fn take_rollbacks(&mut self) -> HashMap<String, RollbackInfo> {
        std::mem::take(&mut self.rollbacks)
    }

    pub(crate) fn buckets_mut_for_rollback(&mut self) -> &mut HashMap<String, Bucket> {
        match &mut self.guard {
            Guard::Write(g) => g,
            Guard::Read(_) => unreachable!("rollback only runs against write transactions"),
        }
    }
}

impl RollbackInfo {
    pub(crate) fn into_items(self) -> HashMap<String, Option<Item>> {
        self.items
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::RwLock;
    use std::time::Duration;

    fn fresh_buckets() -> RwLock<HashMap<String, Bucket>> {
        let mut map = HashMap::new();
        map.insert(bucket::ROOT.to_string(), Bucket::new(bucket::ROOT));
        RwLock::new(map)
    }

    #[test]
    fn set_auto_creates_a_named_bucket() {
        let lock = fresh_buckets();
        let guard = lock.write().unwrap();
        let mut tx = Transaction::new(1, true, Guard::Write(guard));
        tx.set("orders", "o1", "shipped", SetMetadata::default()).unwrap();
        assert_eq!(tx.get("orders", "o1").unwrap(), "shipped");
    }

    #[test]
    fn repeated_set_within_one_transaction_keeps_only_the_first_rollback_snapshot() {
        let lock = fresh_buckets();
        let guard = lock.write().unwrap();
        let mut tx = Transaction::new(1, true, Guard::Write(guard));
        tx.set(bucket::ROOT, "k", "v0", SetMetadata::default()).unwrap();
        tx.set(bucket::ROOT, "k", "v1", SetMetadata::default()).unwrap();
        tx.set(bucket::ROOT, "k", "v2", SetMetadata::default()).unwrap();
        let snapshot = &tx.rollbacks[bucket::ROOT].items["k"];
        assert!(snapshot.is_none(), "the key didn't exist before this transaction touched it");
    }

    #[test]
    fn repeated_add_bucket_within_one_transaction_keeps_only_the_first_rollback_entry() {
        let lock = fresh_buckets();
        let guard = lock.write().unwrap();
        let mut tx = Transaction::new(1, true, Guard::Write(guard));
        assert!(tx.add_bucket("b1").unwrap());
        tx.delete_bucket("b1").unwrap();
        assert!(tx.add_bucket("b1").unwrap());
        assert_eq!(tx.rollback_buckets.len(), 1);
    }

    #[test]
    fn delete_of_absent_key_fails_with_key_not_found() {
        let lock = fresh_buckets();
        let guard = lock.write().unwrap();
        let mut tx = Transaction::new(1, true, Guard::Write(guard));
        assert!(matches!(tx.delete(bucket::ROOT, "missing"), Err(Error::KeyNotFound)));
    }

    #[test]
    fn write_ops_on_a_read_transaction_fail() {
        let lock = fresh_buckets();
        let guard = lock.read().unwrap();
        let mut tx = Transaction::new(1, false, Guard::Read(guard));
        assert!(matches!(
            tx.set(bucket::ROOT, "k", "v", SetMetadata::default()),
            Err(Error::NotWriteTransaction)
        ));
    }

    #[test]
    fn expired_key_reads_as_absent_before_the_sweeper_runs() {
        let lock = fresh_buckets();
        let guard = lock.write().unwrap();
        let mut tx = Transaction::new(1, true, Guard::Write(guard));
        tx.set(bucket::ROOT, "k", "v", SetMetadata::with_ttl_ms(1)).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(matches!(tx.get(bucket::ROOT, "k"), Err(Error::KeyNotFound)));
        assert!(!tx.exists(bucket::ROOT, "k"));
    }
}
