//! Versioned key/value record store
//!
//! Every key carries a monotonically increasing version. Writes are guarded by
//! the version the writer last observed; `expected = 0` means the key must not
//! currently exist. A [`WriteSet`] bundles the writes of one logical operation
//! and is applied all-or-nothing.
use chrono::{DateTime, Utc};

pub mod sled_store;

pub use sled_store::SledStore;

pub type Version = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub value: Vec<u8>,
    pub version: Version,
}

/// One modification of a key, as recorded in its history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub tx_ref: String,
    pub timestamp: DateTime<Utc>,
    pub is_delete: bool,
    pub value: Vec<u8>, // empty for deletes
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("version conflict on {key}: expected {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: Version,
        actual: Version,
    },
    #[error("corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("{0}")]
    Host(String),
}

impl From<sled::Error> for StoreError {
    fn from(value: sled::Error) -> Self {
        StoreError::Host(format!("sled: {value}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Put {
        key: String,
        value: Vec<u8>,
        expected: Version,
    },
    Delete {
        key: String,
        expected: Version,
    },
}

impl Mutation {
    pub fn key(&self) -> &str {
        match self {
            Mutation::Put { key, .. } | Mutation::Delete { key, .. } => key,
        }
    }

    pub fn expected(&self) -> Version {
        match self {
            Mutation::Put { expected, .. } | Mutation::Delete { expected, .. } => *expected,
        }
    }
}

/// The writes belonging to a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSet {
    pub tx_ref: String,
    pub timestamp: DateTime<Utc>,
    pub mutations: Vec<Mutation>,
}

impl WriteSet {
    pub fn new(tx_ref: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            tx_ref: tx_ref.into(),
            timestamp,
            mutations: vec![],
        }
    }
    pub fn put(mut self, key: impl Into<String>, value: Vec<u8>, expected: Version) -> Self {
        self.mutations.push(Mutation::Put {
            key: key.into(),
            value,
            expected,
        });
        self
    }
    pub fn delete(mut self, key: impl Into<String>, expected: Version) -> Self {
        self.mutations.push(Mutation::Delete {
            key: key.into(),
            expected,
        });
        self
    }
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

pub type RangeIter<'a> = Box<dyn Iterator<Item = Result<(String, Vec<u8>), StoreError>> + 'a>;
pub type HistoryIter<'a> = Box<dyn Iterator<Item = Result<Modification, StoreError>> + 'a>;

pub trait RecordStore: Send + Sync {
    /// Current live value and version of `key`, `None` if absent or deleted.
    fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError>;

    /// Apply every mutation of `writes` atomically, returning the new version of
    /// each mutated key in order. Any version mismatch aborts the whole set.
    fn commit(&self, writes: WriteSet) -> Result<Vec<Version>, StoreError>;

    /// Live entries with `start <= key < end` in lexicographic order. An empty
    /// bound is unbounded on that side.
    fn range(&self, start: &str, end: &str) -> Result<RangeIter<'_>, StoreError>;

    /// Every modification of `key`, oldest first.
    fn history(&self, key: &str) -> Result<HistoryIter<'_>, StoreError>;

    fn put_if_version(
        &self,
        key: &str,
        value: Vec<u8>,
        expected: Version,
        tx_ref: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Version, StoreError> {
        let versions = self.commit(WriteSet::new(tx_ref, timestamp).put(key, value, expected))?;
        versions
            .first()
            .copied()
            .ok_or_else(|| StoreError::Host(format!("commit of {key} returned no version")))
    }
}

/// Checks a guarded write against the key's state: `live` is the version of the
/// current value, if any; `counter` is the highest version ever assigned.
pub(crate) fn check_version(
    key: &str,
    expected: Version,
    live: Option<Version>,
    counter: Version,
) -> Result<Version, StoreError> {
    let ok = match live {
        Some(version) => expected == version,
        None => expected == 0,
    };
    if !ok {
        return Err(StoreError::VersionConflict {
            key: key.to_string(),
            expected,
            actual: live.unwrap_or(0),
        });
    }
    Ok(counter + 1)
}
