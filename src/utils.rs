//! Utility functions for identifiers and references

use bech32::Bech32m;
use chrono::{DateTime, Utc};
use uuid7::uuid7;

// construct a unique reference then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// A fresh booking request ID.
pub fn new_booking_id() -> String {
    uuid7().to_string()
}

/// Transaction ids are the sha256 digest of a uuid7 and the transaction time.
pub fn new_tx_id(timestamp: &DateTime<Utc>) -> String {
    sha256::digest(format!("{}:{}", uuid7(), timestamp.to_rfc3339()))
}
