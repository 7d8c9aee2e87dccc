//! An embeddable, in-process key/value store with transactional semantics,
//! ordered secondary indexes, optional TTL expiration, a publish/subscribe
//! mechanism, an append-only persistence log, and a small SQL-like query
//! language.
//!
//! Data lives in named **buckets** (think tables); a bucket named `""` —
//! the **root bucket** — always exists and can never be deleted. Every
//! mutation happens inside a [Transaction], reached through
//! [Database::read] or [Database::read_write], which journals enough to
//! undo itself if the caller's closure returns an error.
//!
//! ```no_run
//! use xisdb::{Config, Database};
//!
//! let db = Database::open(Config::default().in_memory(true))?;
//! db.set("hello", "world")?;
//! assert_eq!(db.get("hello")?, "world");
//! # Ok::<(), xisdb::Error>(())
//! ```

mod btree;
mod bucket;
mod config;
mod db;
mod error;
mod index;
mod item;
mod persistence;
mod ql;
mod pubsub;
mod tx;

pub use crate::config::Config;
pub use crate::db::Database;
pub use crate::error::{Error, Result};
pub use crate::index::{prefix_matcher, regex_matcher, wildcard_matcher, IndexKind, Matcher};
pub use crate::item::{Item, Metadata, SetMetadata};
pub use crate::pubsub::ChannelId;
pub use crate::ql::{parse, tokenize, QueryEngine, Statement, Token, DEFAULT_RESULT_CAPACITY};
pub use crate::tx::Transaction;

pub mod buckets {
    //! Well-known bucket names.
    pub use crate::bucket::ROOT;
}
