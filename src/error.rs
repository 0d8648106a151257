use std::fmt;

use crate::booking::DocumentStatus;
use crate::store::{StoreError, Version};

/// A single validation violation: which field, and what is wrong with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// One of the confirmation checks run before a booking is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Compliance,
    Credit,
    SpecialCargo,
    Completeness,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckKind::Compliance => "compliance",
            CheckKind::Credit => "credit",
            CheckKind::SpecialCargo => "special cargo",
            CheckKind::Completeness => "completeness",
        };
        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BookingError {
    #[error("{0} does not exist")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("concurrent modification of {key}: expected version {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: Version,
        actual: Version,
    },
    #[error("cannot {operation} booking request {id} in status {status}")]
    InvalidState {
        id: String,
        status: DocumentStatus,
        operation: &'static str,
    },
    #[error("validation failed: {}", join(.0))]
    ValidationFailed(Vec<FieldError>),
    #[error("{kind} check failed for booking request {booking_request_id}{}", missing_suffix(.missing))]
    CheckFailed {
        kind: CheckKind,
        booking_request_id: String,
        missing: Vec<String>,
    },
    #[error("record {key} is corrupt: {reason}")]
    CorruptRecord { key: String, reason: String },
    #[error("ledger host failure: {0}")]
    HostFailure(String),
}

impl BookingError {
    /// Missing information reported by a failed completeness check, empty otherwise.
    pub fn missing_fields(&self) -> &[String] {
        match self {
            BookingError::CheckFailed { missing, .. } => missing,
            _ => &[],
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::VersionConflict {
                key,
                expected,
                actual,
            } => BookingError::VersionConflict {
                key,
                expected,
                actual,
            },
            StoreError::Corrupt { key, reason } => BookingError::CorruptRecord { key, reason },
            StoreError::Host(msg) => BookingError::HostFailure(msg),
        }
    }
}

fn join(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn missing_suffix(missing: &[String]) -> String {
    if missing.is_empty() {
        String::new()
    } else {
        format!(" (missing: {})", missing.join(", "))
    }
}
