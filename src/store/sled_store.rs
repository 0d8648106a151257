//! sled-backed record store
//!
//! Three trees are kept in step by a single sled transaction:
//! `state` (key -> current value), `versions` (key -> version counter, survives
//! deletes) and `history` (key ‖ 0x00 ‖ version -> CBOR encoded modification).
use super::{
    HistoryIter, Modification, Mutation, RangeIter, RecordStore, StoreError, Version, Versioned,
    WriteSet, check_version,
};
use chrono::{DateTime, Utc};
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};
use std::ops::Bound;
use std::path::Path;

const STATE_TREE: &str = "state";
const VERSIONS_TREE: &str = "versions";
const HISTORY_TREE: &str = "history";

#[derive(Clone)]
pub struct SledStore {
    state: sled::Tree,
    versions: sled::Tree,
    history: sled::Tree,
}

#[derive(Debug, PartialEq, Eq, Clone)]
struct TimeStamp(DateTime<Utc>);

#[derive(Debug, minicbor::Encode, minicbor::Decode)]
struct HistoryEntry {
    #[n(0)]
    version: u64,
    #[n(1)]
    tx_ref: String,
    #[n(2)]
    timestamp: TimeStamp,
    #[n(3)]
    is_delete: bool,
    #[n(4)]
    #[cbor(with = "minicbor::bytes")]
    value: Vec<u8>,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::from_db(&db)
    }

    pub fn from_db(db: &sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            state: db.open_tree(STATE_TREE)?,
            versions: db.open_tree(VERSIONS_TREE)?,
            history: db.open_tree(HISTORY_TREE)?,
        })
    }

    /// Open a store backed by a temporary database that is removed on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(&db)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.state.flush()?;
        self.versions.flush()?;
        self.history.flush()?;
        Ok(())
    }
}

fn history_prefix(key: &str) -> Vec<u8> {
    let mut prefix = key.as_bytes().to_vec();
    prefix.push(0);
    prefix
}

fn history_key(key: &str, version: Version) -> Vec<u8> {
    let mut hk = history_prefix(key);
    hk.extend_from_slice(&version.to_be_bytes());
    hk
}

fn decode_version(key: &str, raw: &[u8]) -> Result<Version, StoreError> {
    let bytes: [u8; 8] = raw.try_into().map_err(|_| StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("version counter has {} bytes", raw.len()),
    })?;
    Ok(Version::from_be_bytes(bytes))
}

fn decode_key(raw: &[u8]) -> Result<String, StoreError> {
    String::from_utf8(raw.to_vec()).map_err(|e| StoreError::Corrupt {
        key: String::from_utf8_lossy(raw).into_owned(),
        reason: format!("key is not utf-8: {e}"),
    })
}

fn bound(key: &str) -> Bound<Vec<u8>> {
    if key.is_empty() {
        Bound::Unbounded
    } else {
        Bound::Included(key.as_bytes().to_vec())
    }
}

fn exclusive_bound(key: &str) -> Bound<Vec<u8>> {
    if key.is_empty() {
        Bound::Unbounded
    } else {
        Bound::Excluded(key.as_bytes().to_vec())
    }
}

impl RecordStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        // both trees are written in one transaction; read them from a consistent pair
        let read: TransactionResult<_, StoreError> = (&self.state, &self.versions)
            .transaction(|(state, versions)| Ok((state.get(key)?, versions.get(key)?)));
        let (value, version) = read.map_err(|e| match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => e.into(),
        })?;

        match (value, version) {
            (Some(value), Some(version)) => Ok(Some(Versioned {
                value: value.to_vec(),
                version: decode_version(key, &version)?,
            })),
            (Some(_), None) => Err(StoreError::Corrupt {
                key: key.to_string(),
                reason: "value present without a version counter".into(),
            }),
            (None, _) => Ok(None),
        }
    }

    fn commit(&self, writes: WriteSet) -> Result<Vec<Version>, StoreError> {
        if writes.is_empty() {
            return Ok(vec![]);
        }
        let timestamp = TimeStamp(writes.timestamp);

        let result = (&self.state, &self.versions, &self.history).transaction(
            |(state, versions, history)| {
                let mut assigned = Vec::with_capacity(writes.mutations.len());

                for mutation in &writes.mutations {
                    let key = mutation.key();
                    let counter = match versions.get(key)? {
                        Some(raw) => decode_version(key, &raw)
                            .map_err(ConflictableTransactionError::Abort)?,
                        None => 0,
                    };
                    let live = state.get(key)?.map(|_| counter);

                    let version = check_version(key, mutation.expected(), live, counter)
                        .map_err(ConflictableTransactionError::Abort)?;

                    let entry = match mutation {
                        Mutation::Put { value, .. } => {
                            state.insert(key.as_bytes(), value.as_slice())?;
                            HistoryEntry {
                                version,
                                tx_ref: writes.tx_ref.clone(),
                                timestamp: timestamp.clone(),
                                is_delete: false,
                                value: value.clone(),
                            }
                        }
                        Mutation::Delete { expected, .. } => {
                            if live.is_none() {
                                return Err(ConflictableTransactionError::Abort(
                                    StoreError::VersionConflict {
                                        key: key.to_string(),
                                        expected: *expected,
                                        actual: 0,
                                    },
                                ));
                            }
                            state.remove(key.as_bytes())?;
                            HistoryEntry {
                                version,
                                tx_ref: writes.tx_ref.clone(),
                                timestamp: timestamp.clone(),
                                is_delete: true,
                                value: vec![],
                            }
                        }
                    };

                    let encoded = minicbor::to_vec(&entry).map_err(|e| {
                        ConflictableTransactionError::Abort(StoreError::Host(format!(
                            "failed to encode history entry for {key}: {e}"
                        )))
                    })?;
                    versions.insert(key.as_bytes(), version.to_be_bytes().to_vec())?;
                    history.insert(history_key(key, version), encoded)?;
                    assigned.push(version);
                }

                Ok(assigned)
            },
        );

        result.map_err(|e| match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => e.into(),
        })
    }

    fn range(&self, start: &str, end: &str) -> Result<RangeIter<'_>, StoreError> {
        if !start.is_empty() && !end.is_empty() && start >= end {
            return Ok(Box::new(std::iter::empty()));
        }
        let iter = self
            .state
            .range::<Vec<u8>, _>((bound(start), exclusive_bound(end)))
            .map(|item| -> Result<(String, Vec<u8>), StoreError> {
                let (key, value) = item?;
                Ok((decode_key(&key)?, value.to_vec()))
            });
        Ok(Box::new(iter))
    }

    fn history(&self, key: &str) -> Result<HistoryIter<'_>, StoreError> {
        let owner = key.to_string();
        let iter = self
            .history
            .scan_prefix(history_prefix(key))
            .map(move |item| -> Result<Modification, StoreError> {
                let (_, raw) = item?;
                let entry: HistoryEntry =
                    minicbor::decode(&raw).map_err(|e| StoreError::Corrupt {
                        key: owner.clone(),
                        reason: format!("undecodable history entry: {e}"),
                    })?;
                Ok(Modification {
                    tx_ref: entry.tx_ref,
                    timestamp: entry.timestamp.0,
                    is_delete: entry.is_delete,
                    value: entry.value,
                })
            });
        Ok(Box::new(iter))
    }
}

// [seconds, subsecond nanos] so every representable timestamp encodes
impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.array(2)?
            .i64(self.0.timestamp())?
            .u32(self.0.timestamp_subsec_nanos())?
            .ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        if d.array()? != Some(2) {
            return Err(minicbor::decode::Error::message(
                "timestamp must be a [secs, nanos] pair",
            ));
        }
        let secs = d.i64()?;
        let nanos = d.u32()?;

        DateTime::from_timestamp(secs, nanos)
            .map(TimeStamp)
            .ok_or(minicbor::decode::Error::message(
                "failed to convert timestamp to utc",
            ))
    }
}
