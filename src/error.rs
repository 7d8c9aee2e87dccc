//! Crate-wide error type.
//!
//! Every fallible operation in this crate returns [Result], a thin alias over
//! `std::result::Result<T, Error>`. There is no panic-as-control-flow anywhere
//! outside of documented constructor invariants (for example [crate::btree::Btree::new]
//! rejecting a degree below 3).

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All error kinds produced by this crate: the storage engine, the B-tree,
/// the persistence log and the query language.
#[derive(Debug, Error)]
pub enum Error {
    /// A transaction was used after its database reference was detached (e.g. after close).
    #[error("transaction has no database")]
    NoDatabase,

    /// Lookup for an absent key.
    #[error("key not found")]
    KeyNotFound,

    /// A write was attempted against a database opened read-only.
    #[error("database is read-only")]
    DatabaseReadOnly,

    /// A persistence-log line could not be parsed.
    #[error("incorrect database file format: {0}")]
    IncorrectDatabaseFileFormat(String),

    /// A mutation was attempted against a read-only transaction.
    #[error("not a write transaction")]
    NotWriteTransaction,

    /// An index was created with an empty name.
    #[error("invalid index name")]
    InvalidIndexName,

    /// An index with this name already exists on the bucket.
    #[error("index already exists")]
    IndexAlreadyExists,

    /// No index by this name exists on the bucket.
    #[error("index does not exist")]
    IndexDoesNotExist,

    /// The root bucket (name `""`) can never be deleted.
    #[error("cannot delete root bucket")]
    CannotDeleteRootBucket,

    /// Only write transactions may be rolled back.
    #[error("cannot rollback a read-only transaction")]
    CannotRollbackReadTransaction,

    /// A B-tree was constructed with degree < 3.
    #[error("degree must be >= 3")]
    InvalidDegree,

    /// Wraps an I/O failure while touching the persistence file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wraps a TOML configuration parse failure.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Wraps a TOML configuration serialization failure.
    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Wraps an invalid regular expression passed to a value/key matcher.
    #[error("invalid matcher pattern: {0}")]
    InvalidMatcher(#[from] regex::Error),

    // --- query language -------------------------------------------------
    /// The lexer hit a character it doesn't recognize.
    #[error("illegal token")]
    IllegalToken,

    /// The query text was empty (after trimming whitespace).
    #[error("cannot parse an empty query")]
    EmptyQuery,

    /// Generic parse failure: the first token of a statement wasn't recognized.
    #[error("cannot parse statement")]
    CannotParseStatement,

    /// A statement kind is recognized by the lexer but not implemented by the executor.
    #[error("unsupported statement")]
    UnsupportedStatement,

    /// Failed to pull the expected run of IDENTIFIER tokens out of a statement.
    #[error("cannot extract identifiers from statement")]
    CannotFindIdentifiers,

    /// A bucket identifier was structurally invalid.
    #[error("invalid bucket identifier")]
    InvalidBucketIdentifier,

    /// `FROM BUCKET` was given with no identifiers following it.
    #[error("must provide a bucket identifier")]
    NoBucketIdentifier,

    /// `SELECT` named more than one bucket; only one is supported.
    #[error("can only select from a single bucket")]
    CanOnlySelectSingleBucket,

    /// `LIMIT` had no value following it.
    #[error("limit clause requires a value")]
    NoLimitProvided,

    /// `LIMIT` was followed by something other than an integer.
    #[error("limit value must be a non-negative integer")]
    LimitMustBeInteger,

    /// An identifier appeared somewhere the grammar didn't expect it.
    #[error("an identifier wasn't accounted for")]
    UnparsedIdentifier,

    /// A token appeared where no production could consume it.
    #[error("unknown token in statement")]
    UnknownToken,

    /// `USE INDEX` was given with no identifiers following it.
    #[error("no indexes provided")]
    NoIndexIdentifiers,

    /// `FROM` was not followed by the `BUCKET` keyword.
    #[error("illegal FROM clause")]
    IllegalFromClause,

    /// `USE` was not followed by the `INDEX` keyword.
    #[error("illegal USE clause")]
    IllegalUseClause,

    /// A statement ended before its grammar was satisfied.
    #[error("incomplete statement")]
    IncompleteStatement,

    /// `SET` was given an odd number of identifiers (key without a matching value).
    #[error("SET requires both key and value")]
    BothKeyValueRequired,
}
