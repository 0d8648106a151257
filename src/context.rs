//! Per-transaction context handed to every ledger operation
use super::store::{RecordStore, WriteSet};
use super::utils;
use chrono::{DateTime, Utc};

/// The store a transaction runs against, plus the identity and clock of that
/// transaction. Every timestamp written by one operation comes from here.
pub struct TxContext<'a> {
    store: &'a dyn RecordStore,
    tx_id: String,
    timestamp: DateTime<Utc>,
}

impl<'a> TxContext<'a> {
    pub fn new(store: &'a dyn RecordStore, tx_id: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            store,
            tx_id,
            timestamp,
        }
    }

    /// Start a transaction with a fresh id, stamped now.
    pub fn begin(store: &'a dyn RecordStore) -> Self {
        let timestamp = Utc::now();
        Self::new(store, utils::new_tx_id(&timestamp), timestamp)
    }

    pub fn store(&self) -> &'a dyn RecordStore {
        self.store
    }

    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// An empty write set stamped with this transaction.
    pub fn write_set(&self) -> WriteSet {
        WriteSet::new(self.tx_id.clone(), self.timestamp)
    }
}
