//! End-to-end booking scenarios against an on-disk sled ledger and the host adapter

use anyhow::Context;
use booking_ledger::{
    booking::{BookingRequest, ConfirmationFields, DocumentStatus, sample_booking_details},
    checks::{CompletenessChecker, ConfirmationChecks, CreditChecker},
    codec,
    config::LedgerConfig,
    context::TxContext,
    contract::{BookingContract, BookingUpdate, SAMPLE_BOOKING_ID},
    error::{BookingError, CheckKind},
    host::{
        HostAdapter, HostError, HostRangeIter, HostTransaction, HostWrite, KeyModification,
        LedgerHost, MemoryHost,
    },
    query::HistoryRecord,
    store::{RecordStore, SledStore},
};
use chrono::Utc;
use std::sync::Mutex;

use tempfile::tempdir; // Use for test db cleanup.

fn confirmation_fields() -> ConfirmationFields {
    ConfirmationFields {
        transport_plan: "MV Northern Star, voyage 042E".into(),
        space_allocation: "1 x 40HC".into(),
        empty_equipment_release: "Depot 7, Rotterdam".into(),
        carrier_haulage_order: "CHO-99812".into(),
        additional_services: "".into(),
        pricing_confirmation: "USD 3150 all-in".into(),
        restricted_party_screening_check: "passed".into(),
    }
}

struct RejectCredit;

impl CreditChecker for RejectCredit {
    fn check_credit(&self, _: &BookingRequest) -> bool {
        false
    }
}

struct NeedsCustomsBroker;

impl CompletenessChecker for NeedsCustomsBroker {
    fn missing_information(&self, _: &BookingRequest, _: &ConfirmationFields) -> Vec<String> {
        vec!["customsBroker".into()]
    }
}

/// A host on which another transaction, once armed, commits just before the
/// next history read of `key`.
struct ContendedHost {
    inner: MemoryHost,
    key: String,
    competitor: Mutex<Option<HostTransaction>>,
}

impl ContendedHost {
    fn new(key: &str) -> Self {
        Self {
            inner: MemoryHost::new(),
            key: key.to_string(),
            competitor: Mutex::new(None),
        }
    }

    fn arm(&self, tx: HostTransaction) {
        *self.competitor.lock().unwrap() = Some(tx);
    }
}

impl LedgerHost for ContendedHost {
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, HostError> {
        self.inner.get_state(key)
    }
    fn get_state_by_range(&self, start: &str, end: &str) -> Result<HostRangeIter<'_>, HostError> {
        self.inner.get_state_by_range(start, end)
    }
    fn get_history_for_key(&self, key: &str) -> Result<Vec<KeyModification>, HostError> {
        if key == self.key {
            if let Some(tx) = self.competitor.lock().unwrap().take() {
                self.inner.submit(tx)?;
            }
        }
        self.inner.get_history_for_key(key)
    }
    fn submit(&self, tx: HostTransaction) -> Result<(), HostError> {
        self.inner.submit(tx)
    }
}

#[test]
fn create_and_confirm_booking() -> anyhow::Result<()> {
    // Sled holds a file lock on the database, so each test gets its own
    // database under a temp dir which is removed when the test ends.
    let temp_dir = tempdir()?;
    let store = SledStore::open(temp_dir.path().join("create_and_confirm.db"))?;
    let contract = BookingContract::default();

    let receipt = contract
        .init_ledger(&TxContext::begin(&store))
        .context("Booking Failed on Create: ")?;

    assert_eq!(receipt.id, SAMPLE_BOOKING_ID);
    assert_eq!(receipt.document_status, DocumentStatus::Received);
    assert!(!receipt.carrier_booking_request_reference.is_empty());
    assert_eq!(receipt.created_at, receipt.updated_at);
    assert_eq!(receipt.version, 1);

    // the stored record matches what create reported
    let ctx = TxContext::begin(&store);
    let stored = contract.read_booking_request(&ctx, SAMPLE_BOOKING_ID)?;
    assert_eq!(stored.details.credit_amount, 75_000);
    assert_eq!(stored.details.cargo_gross_weight, 1500.75);
    assert_eq!(
        stored.carrier_booking_request_reference,
        receipt.carrier_booking_request_reference
    );

    // with the request received we can confirm it
    let confirmation = contract
        .confirm_booking_request(&ctx, SAMPLE_BOOKING_ID, confirmation_fields())
        .context("Booking Failed on Confirm: ")?;
    assert_eq!(confirmation.id, "booking1-confirmation");
    assert_eq!(confirmation.booking_request_id, SAMPLE_BOOKING_ID);
    assert_eq!(confirmation.confirmed_at, ctx.timestamp());

    let ctx = TxContext::begin(&store);
    let fetched = contract.get_booking_confirmation(&ctx, "booking1-confirmation")?;
    assert_eq!(fetched, confirmation);

    let confirmed = contract.read_booking_request(&ctx, SAMPLE_BOOKING_ID)?;
    assert_eq!(confirmed.document_status, DocumentStatus::Confirmed);

    // the confirmation document is not listed as a booking request
    let all = contract.get_all_booking_requests(&ctx)?;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, SAMPLE_BOOKING_ID);

    Ok(())
}

#[test]
fn low_credit_request_is_cancelled_and_cannot_be_confirmed() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = SledStore::open(temp_dir.path().join("low_credit.db"))?;
    let contract = BookingContract::default();

    let mut details = sample_booking_details();
    details.credit_amount = 49_999;
    let ctx = TxContext::begin(&store);
    let receipt = contract.create_booking_request(&ctx, BookingRequest::new("b-low", details))?;

    // a cancelled request is still a successful create
    assert_eq!(receipt.document_status, DocumentStatus::Cancelled);
    assert!(!receipt.is_received());

    let err = contract
        .confirm_booking_request(&ctx, "b-low", confirmation_fields())
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::InvalidState {
            status: DocumentStatus::Cancelled,
            operation: "confirm",
            ..
        }
    ));
    assert!(store.get("b-low-confirmation")?.is_none());

    Ok(())
}

#[test]
fn credit_at_threshold_is_received() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = SledStore::open(temp_dir.path().join("threshold.db"))?;
    let contract = BookingContract::default();

    let mut details = sample_booking_details();
    details.credit_amount = 50_000;
    let receipt = contract
        .create_booking_request(&TxContext::begin(&store), BookingRequest::new("b-edge", details))?;

    assert_eq!(receipt.document_status, DocumentStatus::Received);
    Ok(())
}

#[test]
fn duplicate_create_is_rejected_without_writing() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = SledStore::open(temp_dir.path().join("duplicate.db"))?;
    let contract = BookingContract::default();

    contract.init_ledger(&TxContext::begin(&store))?;
    let before = store.get(SAMPLE_BOOKING_ID)?.context("missing seed")?;

    let err = contract
        .init_ledger(&TxContext::begin(&store))
        .unwrap_err();
    assert!(matches!(err, BookingError::AlreadyExists(_)));

    let after = store.get(SAMPLE_BOOKING_ID)?.context("missing seed")?;
    assert_eq!(before, after);
    assert_eq!(store.history(SAMPLE_BOOKING_ID)?.count(), 1);

    Ok(())
}

#[test]
fn missing_records_are_not_found() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = SledStore::open(temp_dir.path().join("not_found.db"))?;
    let contract = BookingContract::default();
    let ctx = TxContext::begin(&store);

    assert!(matches!(
        contract.read_booking_request(&ctx, "nope"),
        Err(BookingError::NotFound(_))
    ));
    assert!(matches!(
        contract.update_booking_request(&ctx, "nope", BookingUpdate::new(sample_booking_details())),
        Err(BookingError::NotFound(_))
    ));
    assert!(matches!(
        contract.confirm_booking_request(&ctx, "nope", confirmation_fields()),
        Err(BookingError::NotFound(_))
    ));
    assert!(matches!(
        contract.get_booking_confirmation(&ctx, "nope-confirmation"),
        Err(BookingError::NotFound(_))
    ));
    assert!(matches!(
        contract.delete_booking_request(&ctx, "nope"),
        Err(BookingError::NotFound(_))
    ));
    assert!(!contract.booking_request_exists(&ctx, "nope")?);
    assert!(contract.get_booking_request_history(&ctx, "nope")?.is_empty());

    Ok(())
}

#[test]
fn confirmed_request_is_immutable() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = SledStore::open(temp_dir.path().join("immutable.db"))?;
    let contract = BookingContract::default();

    contract.init_ledger(&TxContext::begin(&store))?;
    contract.confirm_booking_request(
        &TxContext::begin(&store),
        SAMPLE_BOOKING_ID,
        confirmation_fields(),
    )?;
    let before = store.get(SAMPLE_BOOKING_ID)?.context("missing booking")?;

    let mut details = sample_booking_details();
    details.credit_amount = 90_000;
    let err = contract
        .update_booking_request(
            &TxContext::begin(&store),
            SAMPLE_BOOKING_ID,
            BookingUpdate::new(details),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::InvalidState {
            status: DocumentStatus::Confirmed,
            operation: "update",
            ..
        }
    ));

    // confirming twice fails too
    let err = contract
        .confirm_booking_request(
            &TxContext::begin(&store),
            SAMPLE_BOOKING_ID,
            confirmation_fields(),
        )
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidState { .. }));

    let after = store.get(SAMPLE_BOOKING_ID)?.context("missing booking")?;
    assert_eq!(before, after);

    Ok(())
}

#[test]
fn update_regenerates_reference_and_keeps_created_at() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = SledStore::open(temp_dir.path().join("update.db"))?;
    let contract = BookingContract::default();

    let created = contract.init_ledger(&TxContext::begin(&store))?;

    let mut details = sample_booking_details();
    details.commodity.quantity = 5;
    let updated = contract.update_booking_request(
        &TxContext::begin(&store),
        SAMPLE_BOOKING_ID,
        BookingUpdate::new(details).if_version(created.version),
    )?;

    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at >= created.updated_at);
    assert_ne!(
        updated.carrier_booking_request_reference,
        created.carrier_booking_request_reference
    );
    assert_eq!(updated.version, created.version + 1);
    assert_eq!(updated.document_status, DocumentStatus::Received);

    let stored = contract.read_booking_request(&TxContext::begin(&store), SAMPLE_BOOKING_ID)?;
    assert_eq!(stored.details.commodity.quantity, 5);

    Ok(())
}

#[test]
fn stale_update_is_a_version_conflict() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = SledStore::open(temp_dir.path().join("stale.db"))?;
    let contract = BookingContract::default();

    contract.init_ledger(&TxContext::begin(&store))?;
    let (_, read_version) = contract
        .read_booking_request_versioned(&TxContext::begin(&store), SAMPLE_BOOKING_ID)?;

    // someone else updates first
    contract.update_booking_request(
        &TxContext::begin(&store),
        SAMPLE_BOOKING_ID,
        BookingUpdate::new(sample_booking_details()),
    )?;

    let err = contract
        .update_booking_request(
            &TxContext::begin(&store),
            SAMPLE_BOOKING_ID,
            BookingUpdate::new(sample_booking_details()).if_version(read_version),
        )
        .unwrap_err();

    match err {
        BookingError::VersionConflict {
            key,
            expected,
            actual,
        } => {
            assert_eq!(key, SAMPLE_BOOKING_ID);
            assert_eq!(expected, 1);
            assert_eq!(actual, 2);
        }
        other => anyhow::bail!("expected a version conflict, got {other}"),
    }

    Ok(())
}

#[test]
fn failed_check_leaves_ledger_untouched() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = SledStore::open(temp_dir.path().join("failed_check.db"))?;
    let contract = BookingContract::new(
        LedgerConfig::default(),
        ConfirmationChecks::new().set_credit(RejectCredit),
    );

    contract.init_ledger(&TxContext::begin(&store))?;
    let err = contract
        .confirm_booking_request(
            &TxContext::begin(&store),
            SAMPLE_BOOKING_ID,
            confirmation_fields(),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        BookingError::CheckFailed {
            kind: CheckKind::Credit,
            ..
        }
    ));
    let ctx = TxContext::begin(&store);
    assert_eq!(
        contract
            .read_booking_request(&ctx, SAMPLE_BOOKING_ID)?
            .document_status,
        DocumentStatus::Received
    );
    assert!(store.get("booking1-confirmation")?.is_none());

    Ok(())
}

#[test]
fn incomplete_confirmation_lists_missing_information() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = SledStore::open(temp_dir.path().join("incomplete.db"))?;
    let contract = BookingContract::new(
        LedgerConfig::default(),
        ConfirmationChecks::new().set_completeness(NeedsCustomsBroker),
    );

    contract.init_ledger(&TxContext::begin(&store))?;
    let err = contract
        .confirm_booking_request(
            &TxContext::begin(&store),
            SAMPLE_BOOKING_ID,
            confirmation_fields(),
        )
        .unwrap_err();

    assert_eq!(err.missing_fields(), ["customsBroker"]);
    assert!(err.to_string().contains("customsBroker"));

    // the default completeness check wants the transport plan
    let contract = BookingContract::default();
    let mut fields = confirmation_fields();
    fields.transport_plan.clear();
    let err = contract
        .confirm_booking_request(&TxContext::begin(&store), SAMPLE_BOOKING_ID, fields)
        .unwrap_err();
    assert_eq!(err.missing_fields(), ["TransportPlan"]);

    Ok(())
}

#[test]
fn delete_keeps_history_with_tombstone() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = SledStore::open(temp_dir.path().join("delete.db"))?;
    let contract = BookingContract::default();

    contract.init_ledger(&TxContext::begin(&store))?;
    contract.update_booking_request(
        &TxContext::begin(&store),
        SAMPLE_BOOKING_ID,
        BookingUpdate::new(sample_booking_details()),
    )?;
    let delete_ctx = TxContext::begin(&store);
    contract.delete_booking_request(&delete_ctx, SAMPLE_BOOKING_ID)?;

    let ctx = TxContext::begin(&store);
    assert!(!contract.booking_request_exists(&ctx, SAMPLE_BOOKING_ID)?);
    assert!(contract.get_all_booking_requests(&ctx)?.is_empty());

    let history = contract.get_booking_request_history(&ctx, SAMPLE_BOOKING_ID)?;
    assert_eq!(history.len(), 3);
    assert!(matches!(history[0].record, HistoryRecord::Live(_)));
    assert!(matches!(history[1].record, HistoryRecord::Live(_)));
    assert!(history[2].is_delete());
    assert_eq!(history[2].tx_ref, delete_ctx.tx_id());

    // the ID can be reused, and versions carry on from the history
    let receipt = contract.init_ledger(&TxContext::begin(&store))?;
    assert_eq!(receipt.version, 4);

    Ok(())
}

#[test]
fn ledger_survives_reopen() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db_path = temp_dir.path().join("reopen.db");
    let contract = BookingContract::default();

    {
        let store = SledStore::open(&db_path)?;
        contract.init_ledger(&TxContext::begin(&store))?;
        store.flush()?;
    }

    let store = SledStore::open(&db_path)?;
    let request = contract.read_booking_request(&TxContext::begin(&store), SAMPLE_BOOKING_ID)?;
    assert_eq!(request.document_status, DocumentStatus::Received);

    Ok(())
}

#[test]
fn pages_walk_the_whole_namespace() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = SledStore::open(temp_dir.path().join("pages.db"))?;
    let contract = BookingContract::default();

    for id in ["b1", "b2", "b3", "b4", "b5"] {
        contract.create_booking_request(
            &TxContext::begin(&store),
            BookingRequest::new(id, sample_booking_details()),
        )?;
    }
    // a confirmation in the middle of the namespace is skipped
    contract.confirm_booking_request(&TxContext::begin(&store), "b2", confirmation_fields())?;

    let ctx = TxContext::begin(&store);
    let mut bookmark = String::new();
    let mut seen = vec![];
    loop {
        let page = contract.get_booking_requests_page(&ctx, Some(2), &bookmark)?;
        assert!(page.fetched_records_count <= 2);
        seen.extend(page.records.into_iter().map(|r| r.id));
        if page.bookmark.is_empty() {
            break;
        }
        bookmark = page.bookmark;
    }
    assert_eq!(seen, ["b1", "b2", "b3", "b4", "b5"]);

    assert!(matches!(
        contract.get_booking_requests_page(&ctx, Some(0), ""),
        Err(BookingError::ValidationFailed(_))
    ));

    Ok(())
}

#[test]
fn host_adapter_runs_the_same_workflow() -> anyhow::Result<()> {
    let store = HostAdapter::new(MemoryHost::new());
    let contract = BookingContract::default();

    let receipt = contract.init_ledger(&TxContext::begin(&store))?;
    assert_eq!(receipt.version, 1);

    contract.confirm_booking_request(
        &TxContext::begin(&store),
        SAMPLE_BOOKING_ID,
        confirmation_fields(),
    )?;

    let ctx = TxContext::begin(&store);
    assert_eq!(
        contract
            .read_booking_request(&ctx, SAMPLE_BOOKING_ID)?
            .document_status,
        DocumentStatus::Confirmed
    );
    assert_eq!(contract.get_all_booking_requests(&ctx)?.len(), 1);
    assert_eq!(contract.get_booking_request_history(&ctx, SAMPLE_BOOKING_ID)?.len(), 2);

    Ok(())
}

#[test]
fn host_failure_during_confirm_writes_nothing() -> anyhow::Result<()> {
    let store = HostAdapter::new(MemoryHost::new());
    let contract = BookingContract::default();
    contract.init_ledger(&TxContext::begin(&store))?;

    store.host().set_unavailable(true);
    let err = contract
        .confirm_booking_request(
            &TxContext::begin(&store),
            SAMPLE_BOOKING_ID,
            confirmation_fields(),
        )
        .unwrap_err();
    assert!(matches!(err, BookingError::HostFailure(_)));
    store.host().set_unavailable(false);

    // neither the confirmation nor the status change landed
    let ctx = TxContext::begin(&store);
    assert!(store.get("booking1-confirmation")?.is_none());
    assert_eq!(
        contract
            .read_booking_request(&ctx, SAMPLE_BOOKING_ID)?
            .document_status,
        DocumentStatus::Received
    );

    Ok(())
}

#[test]
fn concurrent_commit_on_host_is_never_lost() -> anyhow::Result<()> {
    let store = HostAdapter::new(ContendedHost::new(SAMPLE_BOOKING_ID));
    let contract = BookingContract::default();
    contract.init_ledger(&TxContext::begin(&store))?;

    // another transaction raises the quantity while we are reading
    let mut theirs = contract.read_booking_request(&TxContext::begin(&store), SAMPLE_BOOKING_ID)?;
    theirs.details.commodity.quantity = 999;
    store.host().arm(HostTransaction {
        tx_id: "competitor".into(),
        timestamp: Utc::now(),
        read_set: vec![(SAMPLE_BOOKING_ID.to_string(), 1)],
        writes: vec![HostWrite::Put {
            key: SAMPLE_BOOKING_ID.to_string(),
            value: codec::to_canonical_json(SAMPLE_BOOKING_ID, &theirs)?,
        }],
    });

    // the version we are handed belongs to the value we are handed
    let (seen, version) =
        contract.read_booking_request_versioned(&TxContext::begin(&store), SAMPLE_BOOKING_ID)?;
    assert_eq!(version, 2);
    assert_eq!(seen.details.commodity.quantity, 999);

    // a write based on the pre-race read is refused
    let err = contract
        .update_booking_request(
            &TxContext::begin(&store),
            SAMPLE_BOOKING_ID,
            BookingUpdate::new(sample_booking_details()).if_version(1),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::VersionConflict {
            expected: 1,
            actual: 2,
            ..
        }
    ));

    let stored = contract.read_booking_request(&TxContext::begin(&store), SAMPLE_BOOKING_ID)?;
    assert_eq!(stored.details.commodity.quantity, 999);

    Ok(())
}

#[test]
fn create_then_read_returns_the_submitted_details() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = SledStore::open(temp_dir.path().join("round_trip.db"))?;
    let contract = BookingContract::default();

    let mut details = sample_booking_details();
    details.cargo_gross_weight = 156380.89013436507;
    let receipt = contract.create_booking_request(
        &TxContext::begin(&store),
        BookingRequest::new("b-exact", details.clone()),
    )?;

    let stored = contract.read_booking_request(&TxContext::begin(&store), &receipt.id)?;
    assert_eq!(stored.details, details);
    assert_eq!(
        stored.details.cargo_gross_weight.to_bits(),
        details.cargo_gross_weight.to_bits()
    );

    Ok(())
}

#[test]
fn confirmation_key_has_no_request_history() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = SledStore::open(temp_dir.path().join("confirmation_history.db"))?;
    let contract = BookingContract::default();

    contract.init_ledger(&TxContext::begin(&store))?;
    contract.confirm_booking_request(
        &TxContext::begin(&store),
        SAMPLE_BOOKING_ID,
        confirmation_fields(),
    )?;

    let err = contract
        .get_booking_request_history(&TxContext::begin(&store), "booking1-confirmation")
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound(_)));

    Ok(())
}
