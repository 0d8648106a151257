//! Read-side queries over the booking namespace
use super::booking::{BookingRequest, DocType};
use super::codec;
use super::error::{BookingError, FieldError};
use super::store::RecordStore;
use chrono::{DateTime, Utc};

/// One page of booking requests. `bookmark` is the key to resume from, empty
/// once the namespace is exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<BookingRequest>,
    pub fetched_records_count: usize,
    pub bookmark: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryRecord {
    Live(BookingRequest),
    /// Tombstone, only the ID survives.
    Deleted { id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub tx_ref: String,
    pub timestamp: DateTime<Utc>,
    pub record: HistoryRecord,
}

impl HistoryEntry {
    pub fn is_delete(&self) -> bool {
        matches!(self.record, HistoryRecord::Deleted { .. })
    }
}

/// Decode a stored document, yielding `None` for documents that are not booking requests.
fn booking_request_at(key: &str, bytes: &[u8]) -> Result<Option<BookingRequest>, BookingError> {
    let (doc_type, value) = codec::decode_document(key, bytes)?;
    match doc_type {
        DocType::BookingRequest => codec::from_document(key, value).map(Some),
        DocType::BookingConfirmation => Ok(None),
    }
}

/// Every booking request in key order. A single undecodable document fails the call.
pub fn get_all(store: &dyn RecordStore) -> Result<Vec<BookingRequest>, BookingError> {
    let mut requests = Vec::new();
    for item in store.range("", "")? {
        let (key, bytes) = item?;
        if let Some(request) = booking_request_at(&key, &bytes)? {
            requests.push(request);
        }
    }
    Ok(requests)
}

pub fn get_page(
    store: &dyn RecordStore,
    page_size: usize,
    bookmark: &str,
) -> Result<Page, BookingError> {
    if page_size == 0 {
        return Err(BookingError::ValidationFailed(vec![FieldError::new(
            "pageSize",
            "must be greater than zero",
        )]));
    }

    let mut records = Vec::with_capacity(page_size);
    let mut next = String::new();
    for item in store.range(bookmark, "")? {
        let (key, bytes) = item?;
        let Some(request) = booking_request_at(&key, &bytes)? else {
            continue;
        };
        if records.len() == page_size {
            next = key;
            break;
        }
        records.push(request);
    }

    Ok(Page {
        fetched_records_count: records.len(),
        records,
        bookmark: next,
    })
}

/// Every recorded version of `id`, oldest first. Empty if `id` was never written,
/// `NotFound` if the key holds some other kind of document.
pub fn get_history(store: &dyn RecordStore, id: &str) -> Result<Vec<HistoryEntry>, BookingError> {
    let mut entries = Vec::new();
    for item in store.history(id)? {
        let modification = item?;
        let record = if modification.is_delete || modification.value.is_empty() {
            HistoryRecord::Deleted { id: id.to_string() }
        } else {
            match booking_request_at(id, &modification.value)? {
                Some(request) => HistoryRecord::Live(request),
                None => return Err(BookingError::NotFound(format!("booking request {id}"))),
            }
        };
        entries.push(HistoryEntry {
            tx_ref: modification.tx_ref,
            timestamp: modification.timestamp,
            record,
        });
    }
    Ok(entries)
}
