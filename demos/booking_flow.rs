//! Walks a booking through the ledger: seed, create, confirm, list and history.
//!
//! Run with `RUST_LOG=debug` to see every transaction, and point
//! `BOOKING_LEDGER_DATA_DIR` somewhere else to keep the ledger between runs.

use anyhow::Context;
use booking_ledger::{
    booking::{BookingRequest, ConfirmationFields, sample_booking_details},
    config::LedgerConfig,
    context::TxContext,
    contract::{BookingContract, SAMPLE_BOOKING_ID},
    error::BookingError,
    query::HistoryRecord,
    telemetry,
};

fn main() -> anyhow::Result<()> {
    telemetry::init();

    let config = LedgerConfig::from_env()?;
    let store = config.open_store()?;
    let contract = BookingContract::new(config, Default::default());

    // seeding twice is harmless, the second attempt is rejected
    match contract.init_ledger(&TxContext::begin(&store)) {
        Ok(receipt) => println!("seeded {} as {}", receipt.id, receipt.carrier_booking_request_reference),
        Err(BookingError::AlreadyExists(_)) => println!("ledger already seeded"),
        Err(e) => return Err(e).context("failed to seed ledger"),
    }

    let mut details = sample_booking_details();
    details.credit_amount = 12_000;
    let receipt = contract
        .create_booking_request(&TxContext::begin(&store), BookingRequest::new("", details))
        .context("failed to create low-credit booking")?;
    println!("created {} with status {}", receipt.id, receipt.document_status);

    let fields = ConfirmationFields {
        transport_plan: "MV Northern Star, voyage 042E".into(),
        space_allocation: "1 x 40HC".into(),
        empty_equipment_release: "Depot 7".into(),
        carrier_haulage_order: "CHO-99812".into(),
        additional_services: "".into(),
        pricing_confirmation: "USD 3150".into(),
        restricted_party_screening_check: "passed".into(),
    };
    match contract.confirm_booking_request(&TxContext::begin(&store), SAMPLE_BOOKING_ID, fields) {
        Ok(confirmation) => println!("confirmed as {}", confirmation.id),
        Err(e) => println!("not confirmed: {e}"),
    }

    let ctx = TxContext::begin(&store);
    for request in contract.get_all_booking_requests(&ctx)? {
        println!(
            "{:<40} {:<10} credit {}",
            request.id, request.document_status, request.details.credit_amount
        );
    }

    for entry in contract.get_booking_request_history(&ctx, SAMPLE_BOOKING_ID)? {
        let status = match &entry.record {
            HistoryRecord::Live(request) => request.document_status.to_string(),
            HistoryRecord::Deleted { .. } => "DELETED".to_string(),
        };
        let tx = entry.tx_ref.get(..12).unwrap_or(&entry.tx_ref);
        println!("{} {tx} {status}", entry.timestamp);
    }

    store.flush()?;
    Ok(())
}
