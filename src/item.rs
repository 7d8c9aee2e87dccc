//! The unit of storage: a key/value pair plus optional expiration metadata.

use std::time::{Duration, SystemTime};

/// A key/value pair as stored in a [crate::bucket::Bucket].
///
/// Keys are unique within a bucket. `metadata` is `None` for items written
/// without a TTL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    pub key: String,
    pub value: String,
    pub metadata: Option<Metadata>,
}

impl Item {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Item {
        Item { key: key.into(), value: value.into(), metadata: None }
    }

    /// A tombstone is how a delete is represented on the wire and in `commits`:
    /// same key, empty value, no metadata.
    pub fn tombstone(key: impl Into<String>) -> Item {
        Item { key: key.into(), value: String::new(), metadata: None }
    }

    /// True if this item carries an expiration that is in the past relative to `now`.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        match &self.metadata {
            Some(Metadata { expires_at: Some(at) }) => now > *at,
            _ => false,
        }
    }
}

/// Non key/value properties of an [Item]. Currently only expiration, but kept
/// as its own type so future per-item properties don't widen [Item] itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Metadata {
    pub expires_at: Option<SystemTime>,
}

impl Metadata {
    pub fn none() -> Metadata {
        Metadata { expires_at: None }
    }
}

/// User-supplied metadata for a `set`, mirroring the source's `SetMetadata`.
///
/// `ttl` is milliseconds from now; zero or negative means "no expiration".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetMetadata {
    pub ttl_ms: i64,
}

impl SetMetadata {
    pub fn with_ttl_ms(ttl_ms: i64) -> SetMetadata {
        SetMetadata { ttl_ms }
    }

    pub(crate) fn to_metadata(self, now: SystemTime) -> Option<Metadata> {
        if self.ttl_ms > 0 {
            Some(Metadata { expires_at: Some(now + Duration::from_millis(self.ttl_ms as u64)) })
        } else {
            None
        }
    }
}
