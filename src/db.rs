//! The top-level handle applications open: owns the bucket registry behind
//! a multi-reader/single-writer lock, the persistence log, the subscription
//! registry, and the background TTL sweeper.
//!
//! [Database] is cheaply `Send + Sync` and meant to be held behind an `Arc`
//! (or just moved across threads directly) the way the rest of this
//! lineage's top-level index handles are used.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::{Duration, SystemTime};

use crate::bucket::{self, Bucket};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::item::{Item, SetMetadata};
use crate::persistence::{LogEntry, Persistence};
use crate::pubsub::{ChannelId, Subscriptions};
use crate::tx::{Guard, Transaction};

/// An in-process key/value store with transactional semantics, secondary
/// indexes, TTL expiration, pub/sub and an append-only persistence log.
///
/// Dropping the last handle joins the background sweeper thread, if one was
/// started, instead of leaking it.
pub struct Database {
    inner: Arc<Inner>,
    sweeper: Option<SweeperHandle>,
}

struct Inner {
    buckets: RwLock<HashMap<String, Bucket>>,
    config: Config,
    subscriptions: Mutex<Subscriptions>,
    persistence: Option<Mutex<Persistence>>,
    next_txid: AtomicU64,
}

struct SweeperHandle {
    shutdown: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl Database {
    /// Opens (or creates) a database per `config`. When `config.in_memory`
    /// is unset, replays the persistence log into the root bucket before
    /// returning.
    pub fn open(config: Config) -> Result<Database> {
        let mut buckets = HashMap::new();
        buckets.insert(bucket::ROOT.to_string(), Bucket::new(bucket::ROOT));

        let persistence = if config.in_memory {
            None
        } else {
            let path = config
                .data_file
                .clone()
                .unwrap_or_else(|| std::path::PathBuf::from("xisdb.data"));
            let mut persistence = match Persistence::open(&path) {
                Ok(p) => p,
                Err(err) => return Err(err),
            };
            let root = buckets.get_mut(bucket::ROOT).expect("root bucket just inserted");
            for entry in persistence.load(config.skip_database_file_errors)? {
                match entry {
                    LogEntry::Set(item) => {
                        root.insert(item);
                    }
                    LogEntry::Delete(key) => {
                        root.delete(&key);
                    }
                }
            }
            Some(Mutex::new(persistence))
        };

        let inner = Arc::new(Inner {
            buckets: RwLock::new(buckets),
            config: config.clone(),
            subscriptions: Mutex::new(Subscriptions::new()),
            persistence,
            next_txid: AtomicU64::new(1),
        });

        let sweeper = if config.sweeper_enabled() && !config.disable_expiration {
            let interval_ms = config.background_interval_ms.max(0) as u64;
            Some(spawn_sweeper(inner.clone(), interval_ms))
        } else {
            None
        };

        Ok(Database { inner, sweeper })
    }

    /// Runs `f` against a read-only transaction. Multiple reads may proceed
    /// concurrently with each other, but never alongside a write.
    pub fn read<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction) -> Result<T>,
    {
        self.inner.read(f)
    }

    /// Runs `f` against a write transaction. `f`'s writes are committed
    /// (hooks, persistence, pub/sub, in that order) if it returns `Ok`, and
    /// rolled back if it returns `Err`. Fails with [Error::DatabaseReadOnly]
    /// if the database was opened read-only.
    pub fn read_write<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction) -> Result<T>,
    {
        self.inner.read_write(f)
    }

    /// `get` against the root bucket.
    pub fn get(&self, key: &str) -> Result<String> {
        self.read(|tx| tx.get(bucket::ROOT, key))
    }

    /// `set` against the root bucket, with no expiration.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_with_metadata(key, value, SetMetadata::default())
    }

    /// `set` against the root bucket with explicit TTL/metadata.
    pub fn set_with_metadata(&self, key: &str, value: &str, metadata: SetMetadata) -> Result<()> {
        self.read_write(|tx| tx.set(bucket::ROOT, key, value, metadata))
    }

    /// `delete` against the root bucket. Fails with [Error::KeyNotFound] if absent.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.read_write(|tx| tx.delete(bucket::ROOT, key))
    }

    /// `exists` against the root bucket.
    pub fn exists(&self, key: &str) -> Result<bool> {
        self.read(|tx| Ok(tx.exists(bucket::ROOT, key)))
    }

    /// Creates `name` if absent. Returns whether it was created.
    pub fn add_bucket(&self, name: &str) -> Result<bool> {
        self.read_write(|tx| tx.add_bucket(name))
    }

    /// Deletes `name`. Fails with [Error::CannotDeleteRootBucket] for the
    /// root bucket.
    pub fn delete_bucket(&self, name: &str) -> Result<bool> {
        self.read_write(|tx| tx.delete_bucket(name))
    }

    /// Registers a new bounded channel that receives every committed item
    /// whose key starts with `prefix`.
    pub fn subscribe(&self, prefix: impl Into<String>, capacity: usize) -> (ChannelId, Receiver<Item>) {
        self.inner.subscriptions.lock().expect("subscriptions lock poisoned").subscribe(prefix, capacity)
    }

    /// Drops one channel (`Some(id)`) or every channel (`None`) registered
    /// under `prefix`.
    pub fn unsubscribe(&self, prefix: &str, channel: Option<ChannelId>) {
        self.inner.subscriptions.lock().expect("subscriptions lock poisoned").unsubscribe(prefix, channel)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.shutdown.store(true, Ordering::SeqCst);
            let _ = sweeper.handle.join();
        }
    }
}

impl Inner {
    fn next_txid(&self) -> u128 {
        self.next_txid.fetch_add(1, Ordering::SeqCst) as u128
    }

    fn read<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction) -> Result<T>,
    {
        let guard = self.buckets.read().expect("bucket lock poisoned");
        let id = self.next_txid();
        let mut tx = Transaction::new(id, false, Guard::Read(guard));
        let result = f(&mut tx);
        // Hooks run on every committed-or-not read, per the source's
        // "hooks run once per transaction, in append order, even for
        // read-only commits" rule.
        self.run_hooks(&mut tx);
        result
    }

    fn read_write<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction) -> Result<T>,
    {
        if self.config.read_only {
            return Err(Error::DatabaseReadOnly);
        }
        let guard = self.buckets.write().expect("bucket lock poisoned");
        let id = self.next_txid();
        let mut tx = Transaction::new(id, true, Guard::Write(guard));
        match f(&mut tx) {
            Ok(value) => match self.commit(&mut tx) {
                Ok(()) => Ok(value),
                Err(commit_err) => {
                    self.rollback(&mut tx)?;
                    Err(commit_err)
                }
            },
            Err(user_err) => {
                self.rollback(&mut tx)?;
                Err(user_err)
            }
        }
    }

    fn run_hooks(&self, tx: &mut Transaction<'_>) {
        for hook in std::mem::take(&mut tx.hooks) {
            hook();
        }
    }

    /// Hooks, then (for transactions that actually wrote something)
    /// persistence append followed by pub/sub fan-out, in that order.
    fn commit(&self, tx: &mut Transaction<'_>) -> Result<()> {
        self.run_hooks(tx);
        if tx.commits.is_empty() {
            return Ok(());
        }
        if let Some(persistence) = &self.persistence {
            persistence.lock().expect("persistence lock poisoned").append(tx.id, &tx.commits)?;
        }
        let mut subs = self.subscriptions.lock().expect("subscriptions lock poisoned");
        for (key, item) in tx.commits.iter() {
            let published = item.clone().unwrap_or_else(|| Item::tombstone(key.clone()));
            subs.publish(&published);
        }
        log::debug!("transaction {} committed {} change(s)", tx.id, tx.commits.len());
        Ok(())
    }

    /// Replays `rollback_buckets` first (restoring bucket create/delete to
    /// how it was before the transaction began), then replays each
    /// bucket's item-level undo journal.
    fn rollback(&self, tx: &mut Transaction<'_>) -> Result<()> {
        if !tx.is_write() {
            return Err(Error::CannotRollbackReadTransaction);
        }
        let rollback_buckets = tx.take_rollback_buckets();
        {
            let buckets = tx.buckets_mut_for_rollback();
            for (name, prior) in rollback_buckets {
                match prior {
                    None => {
                        buckets.remove(&name);
                    }
                    Some(bucket) => {
                        buckets.insert(name, bucket);
                    }
                }
            }
        }
        let rollbacks = tx.take_rollbacks();
        let buckets = tx.buckets_mut_for_rollback();
        for (name, info) in rollbacks {
            if let Some(bucket) = buckets.get_mut(&name) {
                bucket.rollback(info.into_items());
            }
        }
        log::warn!("transaction {} rolled back", tx.id);
        Ok(())
    }

    /// One sweep cycle: delete every item, in every bucket, whose
    /// expiration is in the past. Runs as an ordinary write transaction, so
    /// its deletions are journaled, persisted and published exactly like a
    /// user-initiated delete.
    fn sweep_expired(&self) -> Result<()> {
        self.read_write(|tx| {
            let now = SystemTime::now();
            let names: Vec<String> = tx.bucket_names().into_iter().map(str::to_string).collect();
            for name in names {
                let expired: Vec<String> = tx
                    .iter(&name)
                    .filter(|item| item.is_expired_at(now))
                    .map(|item| item.key.clone())
                    .collect();
                for key in expired {
                    tx.delete(&name, &key)?;
                }
            }
            Ok(())
        })
    }
}

/// Spawns the background sweeper. Sleeps in short ticks rather than one
/// long `thread::sleep(interval)` so shutdown is noticed promptly instead of
/// after a potentially long final cycle.
fn spawn_sweeper(inner: Arc<Inner>, interval_ms: u64) -> SweeperHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_thread = shutdown.clone();
    let interval = Duration::from_millis(interval_ms.max(1));
    let tick = Duration::from_millis(interval_ms.max(1).min(20));
    let handle = thread::Builder::new()
        .name("xisdb-sweeper".to_string())
        .spawn(move || loop {
            let mut waited = Duration::from_millis(0);
            while waited < interval {
                if shutdown_thread.load(Ordering::SeqCst) {
                    return;
                }
                thread::sleep(tick);
                waited += tick;
            }
            if shutdown_thread.load(Ordering::SeqCst) {
                return;
            }
            if let Err(err) = inner.sweep_expired() {
                log::error!("background sweeper cycle failed: {}", err);
            }
        })
        .expect("failed to spawn background sweeper thread");
    SweeperHandle { shutdown, handle }
}
