//! Drives parsed [Statement]s against an attached [Database], streaming
//! results through a bounded channel on a background thread so the caller
//! gets a [Receiver] back immediately instead of blocking on the whole
//! query.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;

use crate::bucket::ROOT;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::item::{Item, SetMetadata};

use super::ast::Statement;

/// Channel capacity [QueryEngine::execute] falls back to when the caller
/// doesn't have a specific one in mind.
pub const DEFAULT_RESULT_CAPACITY: usize = 64;

/// A query context that may or may not have a database attached yet —
/// mirroring a shell's lifecycle, where a `QueryEngine` can be constructed
/// (and even used to parse statements) before it is bound to one.
/// `execute` fails with [Error::NoDatabase] until [QueryEngine::attach] has
/// been called.
#[derive(Clone, Default)]
pub struct QueryEngine {
    db: Option<Arc<Database>>,
}

impl QueryEngine {
    pub fn new() -> QueryEngine {
        QueryEngine { db: None }
    }

    /// A `QueryEngine` already bound to `db`.
    pub fn attach(db: Arc<Database>) -> QueryEngine {
        QueryEngine { db: Some(db) }
    }

    /// Runs `statements` in order against the attached database on a
    /// background thread. Each `GET`/`SELECT` result and each `SET`/`DEL`
    /// write is sent as an `Item` into the returned channel; the channel
    /// closes once every statement has run or the first one fails.
    pub fn execute(&self, statements: Vec<Statement>, capacity: usize) -> Result<Receiver<Item>> {
        let db = self.db.clone().ok_or(Error::NoDatabase)?;
        let (tx, rx) = sync_channel(capacity.max(1));
        thread::spawn(move || {
            for statement in statements {
                if run_statement(&db, &statement, &tx).is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

fn run_statement(db: &Database, statement: &Statement, tx: &SyncSender<Item>) -> Result<()> {
    match statement {
        Statement::Get { keys } => {
            for key in keys {
                match db.get(key) {
                    Ok(value) => {
                        let _ = tx.send(Item::new(key.clone(), value));
                    }
                    Err(Error::KeyNotFound) => {}
                    Err(err) => return Err(err),
                }
            }
            Ok(())
        }
        Statement::Set { pairs } => {
            db.read_write(|write_tx| {
                for (key, value) in pairs {
                    write_tx.set(ROOT, key, value, SetMetadata::default())?;
                }
                Ok(())
            })?;
            for (key, value) in pairs {
                let _ = tx.send(Item::new(key.clone(), value.clone()));
            }
            Ok(())
        }
        Statement::Del { keys } => {
            db.read_write(|write_tx| {
                for key in keys {
                    write_tx.delete(ROOT, key)?;
                }
                Ok(())
            })?;
            for key in keys {
                let _ = tx.send(Item::tombstone(key.clone()));
            }
            Ok(())
        }
        Statement::Select { buckets, indexes, limit } => {
            if buckets.len() > 1 {
                return Err(Error::CanOnlySelectSingleBucket);
            }
            let bucket_name = buckets.first().map(String::as_str).unwrap_or(ROOT).to_string();
            let limit = limit.map(|n| n.max(0) as usize);
            db.read(|read_tx| {
                let mut sent = 0usize;
                let mut emit = |item: &Item| -> bool {
                    if let Some(l) = limit {
                        if sent >= l {
                            return false;
                        }
                    }
                    let _ = tx.send(item.clone());
                    sent += 1;
                    true
                };
                if indexes.is_empty() {
                    for item in read_tx.iter(&bucket_name) {
                        if !emit(item) {
                            break;
                        }
                    }
                } else {
                    'indexes: for index_name in indexes {
                        for item in read_tx.iterate_index(&bucket_name, index_name)? {
                            if !emit(item) {
                                break 'indexes;
                            }
                        }
                    }
                }
                Ok(())
            })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::index::{wildcard_matcher, IndexKind};
    use std::time::Duration;

    fn db() -> Arc<Database> {
        Arc::new(Database::open(Config::default().in_memory(true)).unwrap())
    }

    #[test]
    fn execute_without_attaching_a_database_fails() {
        let engine = QueryEngine::new();
        let statements = super::super::parse("get k1;").unwrap();
        assert!(matches!(engine.execute(statements, 4), Err(Error::NoDatabase)));
    }

    #[test]
    fn get_emits_existing_keys_and_skips_missing_ones() {
        let db = db();
        db.set("k1", "v1").unwrap();
        let engine = QueryEngine::attach(db);
        let statements = super::super::parse("get k1 missing;").unwrap();
        let rx = engine.execute(statements, DEFAULT_RESULT_CAPACITY).unwrap();
        let item = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!((item.key.as_str(), item.value.as_str()), ("k1", "v1"));
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn set_writes_through_and_emits_each_pair() {
        let db = db();
        let engine = QueryEngine::attach(db.clone());
        let statements = super::super::parse("set k1 v1 k2 v2;").unwrap();
        let rx = engine.execute(statements, DEFAULT_RESULT_CAPACITY).unwrap();
        let mut seen = vec![rx.recv_timeout(Duration::from_secs(1)).unwrap(), rx.recv_timeout(Duration::from_secs(1)).unwrap()];
        seen.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(seen[0].key, "k1");
        assert_eq!(seen[1].key, "k2");
        assert_eq!(db.get("k1").unwrap(), "v1");
        assert_eq!(db.get("k2").unwrap(), "v2");
    }

    #[test]
    fn del_removes_the_key_and_emits_a_tombstone() {
        let db = db();
        db.set("k1", "v1").unwrap();
        let engine = QueryEngine::attach(db.clone());
        let statements = super::super::parse("del k1;").unwrap();
        let rx = engine.execute(statements, DEFAULT_RESULT_CAPACITY).unwrap();
        let item = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(item.key, "k1");
        assert!(matches!(db.get("k1"), Err(Error::KeyNotFound)));
    }

    #[test]
    fn select_from_bucket_respects_limit() {
        let db = db();
        db.add_bucket("b1").unwrap();
        db.read_write(|tx| {
            for i in 0..5 {
                tx.set("b1", &format!("k{}", i), "v", SetMetadata::default())?;
            }
            Ok(())
        })
        .unwrap();
        let engine = QueryEngine::attach(db);
        let statements = super::super::parse("select from bucket b1 limit 2;").unwrap();
        let rx = engine.execute(statements, DEFAULT_RESULT_CAPACITY).unwrap();
        let mut count = 0;
        while rx.recv_timeout(Duration::from_secs(1)).is_ok() {
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn select_use_index_streams_in_projection_order() {
        let db = db();
        db.add_bucket("b1").unwrap();
        db.read_write(|tx| {
            tx.add_index("b1", "by_value", IndexKind::Value, wildcard_matcher())?;
            tx.set("b1", "k1", "b", SetMetadata::default())?;
            tx.set("b1", "k2", "a", SetMetadata::default())?;
            Ok(())
        })
        .unwrap();
        let engine = QueryEngine::attach(db);
        let statements = super::super::parse("select from bucket b1 use index by_value;").unwrap();
        let rx = engine.execute(statements, DEFAULT_RESULT_CAPACITY).unwrap();
        let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.value, "a");
        assert_eq!(second.value, "b");
    }
}
