//! The statement shapes the parser produces and the executor consumes.

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    /// `GET id [id...]` — look up each key in the root bucket.
    Get { keys: Vec<String> },
    /// `SET id id [id id...]` — each pair is a key/value write to the root bucket.
    Set { pairs: Vec<(String, String)> },
    /// `DEL id [id...]` — delete each key from the root bucket.
    Del { keys: Vec<String> },
    /// `SELECT [FROM BUCKET id] [USE INDEX id...] [LIMIT n]`.
    Select { buckets: Vec<String>, indexes: Vec<String>, limit: Option<i64> },
}
