//! Ledger host adapter
//!
//! A ledger host (for example a blockchain peer) offers plain get/put/range/history
//! primitives and commits a transaction's write set atomically, but does not expose
//! per-key versions. [`HostAdapter`] derives versions from the length of each key's
//! modification history and hands the observed versions to the host as a read set,
//! so the host's own MVCC validation rejects stale writes.
use crate::store::{
    HistoryIter, Modification, Mutation, RangeIter, RecordStore, StoreError, Version, Versioned,
    WriteSet, check_version,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(thiserror::Error, Debug)]
pub enum HostError {
    #[error("mvcc read conflict on key {0}")]
    MvccReadConflict(String),
    #[error(transparent)]
    Unavailable(#[from] anyhow::Error),
}

/// A modification of a key as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyModification {
    pub tx_id: String,
    pub value: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    pub is_delete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostWrite {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

/// A transaction proposal: the versions it read and the writes it wants applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTransaction {
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    pub read_set: Vec<(String, Version)>,
    pub writes: Vec<HostWrite>,
}

pub type HostRangeIter<'a> = Box<dyn Iterator<Item = Result<(String, Vec<u8>), HostError>> + 'a>;

/// The primitives of the external execution environment.
pub trait LedgerHost: Send + Sync {
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, HostError>;
    fn get_state_by_range(&self, start: &str, end: &str) -> Result<HostRangeIter<'_>, HostError>;
    fn get_history_for_key(&self, key: &str) -> Result<Vec<KeyModification>, HostError>;
    /// Validate the read set against the committed history and apply every write, or none.
    fn submit(&self, tx: HostTransaction) -> Result<(), HostError>;
}

fn host_failure(err: HostError) -> StoreError {
    StoreError::Host(err.to_string())
}

pub struct HostAdapter<H> {
    host: H,
}

impl<H: LedgerHost> HostAdapter<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Live value and version counter of `key`, both taken from one history read
    /// so the value is always the one written at that version.
    fn snapshot(&self, key: &str) -> Result<(Option<Vec<u8>>, Version), StoreError> {
        let history = self.host.get_history_for_key(key).map_err(host_failure)?;
        let version = history.len() as Version;
        let value = history
            .into_iter()
            .last()
            .filter(|m| !m.is_delete)
            .map(|m| m.value);
        Ok((value, version))
    }
}

impl<H: LedgerHost> RecordStore for HostAdapter<H> {
    fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        let (value, version) = self.snapshot(key)?;
        Ok(value.map(|value| Versioned { value, version }))
    }

    fn commit(&self, writes: WriteSet) -> Result<Vec<Version>, StoreError> {
        if writes.is_empty() {
            return Ok(vec![]);
        }
        // (live, counter) per key, including the effect of earlier mutations in this set
        let mut seen: HashMap<String, (bool, Version)> = HashMap::new();
        let mut read_set = Vec::new();
        let mut host_writes = Vec::with_capacity(writes.mutations.len());
        let mut assigned = Vec::with_capacity(writes.mutations.len());

        for mutation in writes.mutations {
            let key = mutation.key().to_string();
            let (live, counter) = match seen.get(&key) {
                Some(state) => *state,
                None => {
                    let (value, counter) = self.snapshot(&key)?;
                    read_set.push((key.clone(), counter));
                    (value.is_some(), counter)
                }
            };

            let live_version = live.then_some(counter);
            let version = check_version(&key, mutation.expected(), live_version, counter)?;

            match mutation {
                Mutation::Put { value, .. } => {
                    host_writes.push(HostWrite::Put {
                        key: key.clone(),
                        value,
                    });
                    seen.insert(key, (true, version));
                }
                Mutation::Delete { expected, .. } => {
                    if !live {
                        return Err(StoreError::VersionConflict {
                            key,
                            expected,
                            actual: 0,
                        });
                    }
                    host_writes.push(HostWrite::Delete { key: key.clone() });
                    seen.insert(key, (false, version));
                }
            }
            assigned.push(version);
        }

        let tx = HostTransaction {
            tx_id: writes.tx_ref,
            timestamp: writes.timestamp,
            read_set: read_set.clone(),
            writes: host_writes,
        };

        match self.host.submit(tx) {
            Ok(()) => Ok(assigned),
            Err(HostError::MvccReadConflict(key)) => {
                let expected = read_set
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| *v)
                    .unwrap_or_default();
                let (_, actual) = self.snapshot(&key)?;
                Err(StoreError::VersionConflict {
                    key,
                    expected,
                    actual,
                })
            }
            Err(e) => Err(host_failure(e)),
        }
    }

    fn range(&self, start: &str, end: &str) -> Result<RangeIter<'_>, StoreError> {
        let entries = self
            .host
            .get_state_by_range(start, end)
            .map_err(host_failure)?;
        Ok(Box::new(entries.map(|item| item.map_err(host_failure))))
    }

    fn history(&self, key: &str) -> Result<HistoryIter<'_>, StoreError> {
        let modifications = self.host.get_history_for_key(key).map_err(host_failure)?;
        Ok(Box::new(modifications.into_iter().map(|m| {
            Ok(Modification {
                tx_ref: m.tx_id,
                timestamp: m.timestamp,
                is_delete: m.is_delete,
                value: m.value,
            })
        })))
    }
}

#[derive(Debug, Default)]
struct WorldState {
    state: BTreeMap<String, Vec<u8>>,
    history: HashMap<String, Vec<KeyModification>>,
}

/// In-process ledger host. Commits are serialised behind one lock.
#[derive(Debug, Default)]
pub struct MemoryHost {
    world: Mutex<WorldState>,
    reject_submits: AtomicBool,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `submit` fail as if the host were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.reject_submits.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, WorldState>, HostError> {
        self.world
            .lock()
            .map_err(|_| HostError::Unavailable(anyhow::anyhow!("world state lock poisoned")))
    }
}

impl LedgerHost for MemoryHost {
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, HostError> {
        Ok(self.lock()?.state.get(key).cloned())
    }

    /// Iterates a copy of the range taken under the lock, so a long scan never
    /// blocks commits.
    fn get_state_by_range(&self, start: &str, end: &str) -> Result<HostRangeIter<'_>, HostError> {
        let world = self.lock()?;
        if !start.is_empty() && !end.is_empty() && start >= end {
            return Ok(Box::new(std::iter::empty()));
        }
        let lower = if start.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(start)
        };
        let upper = if end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(end)
        };
        let entries: Vec<(String, Vec<u8>)> = world
            .state
            .range::<str, _>((lower, upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Box::new(entries.into_iter().map(Ok)))
    }

    fn get_history_for_key(&self, key: &str) -> Result<Vec<KeyModification>, HostError> {
        Ok(self.lock()?.history.get(key).cloned().unwrap_or_default())
    }

    fn submit(&self, tx: HostTransaction) -> Result<(), HostError> {
        if self.reject_submits.load(Ordering::SeqCst) {
            return Err(HostError::Unavailable(anyhow::anyhow!(
                "host rejected transaction {}",
                tx.tx_id
            )));
        }
        let mut world = self.lock()?;

        for (key, observed) in &tx.read_set {
            let committed = world.history.get(key).map_or(0, Vec::len) as Version;
            if committed != *observed {
                return Err(HostError::MvccReadConflict(key.clone()));
            }
        }

        for write in tx.writes {
            let (key, modification) = match write {
                HostWrite::Put { key, value } => {
                    world.state.insert(key.clone(), value.clone());
                    (key, KeyModification {
                        tx_id: tx.tx_id.clone(),
                        value,
                        timestamp: tx.timestamp,
                        is_delete: false,
                    })
                }
                HostWrite::Delete { key } => {
                    world.state.remove(&key);
                    (key, KeyModification {
                        tx_id: tx.tx_id.clone(),
                        value: vec![],
                        timestamp: tx.timestamp,
                        is_delete: true,
                    })
                }
            };
            world.history.entry(key).or_default().push(modification);
        }
        Ok(())
    }
}
