//! Booking workflow: create, update, confirm and delete booking requests
//!
//! Every mutating operation reads through the transaction context, decides the
//! full outcome, and then issues a single version-guarded [`WriteSet`]. Nothing is
//! written unless every precondition and check has passed, and a multi-record
//! outcome (a confirmation plus the confirmed request) lands in one commit.
//!
//! [`WriteSet`]: crate::store::WriteSet
use super::booking::{
    BookingConfirmation, BookingDetails, BookingRequest, ConfirmationFields, DocType,
    DocumentStatus, confirmation_key, sample_booking_details,
};
use super::checks::ConfirmationChecks;
use super::codec;
use super::config::LedgerConfig;
use super::context::TxContext;
use super::error::BookingError;
use super::query::{self, HistoryEntry, Page};
use super::store::{StoreError, Version};
use super::utils;
use super::validation::validate_booking_request;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// ID of the booking request written by [`BookingContract::init_ledger`].
pub const SAMPLE_BOOKING_ID: &str = "booking1";

/// Outcome of a create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingReceipt {
    pub id: String,
    pub carrier_booking_request_reference: String,
    pub document_status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: Version,
}

impl BookingReceipt {
    fn new(request: &BookingRequest, version: Version) -> Self {
        Self {
            id: request.id.clone(),
            carrier_booking_request_reference: request.carrier_booking_request_reference.clone(),
            document_status: request.document_status,
            created_at: request.created_at,
            updated_at: request.updated_at,
            version,
        }
    }

    /// False when the low-credit rule cancelled the request.
    pub fn is_received(&self) -> bool {
        self.document_status == DocumentStatus::Received
    }
}

/// Replacement details for an existing request. `if_version` makes the update
/// conditional on the version the caller last read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingUpdate {
    pub details: BookingDetails,
    pub if_version: Option<Version>,
}

impl BookingUpdate {
    pub fn new(details: BookingDetails) -> Self {
        Self {
            details,
            if_version: None,
        }
    }
    pub fn if_version(mut self, version: Version) -> Self {
        self.if_version = Some(version);
        self
    }
}

#[derive(Clone, Default)]
pub struct BookingContract {
    config: LedgerConfig,
    checks: ConfirmationChecks,
}

impl BookingContract {
    pub fn new(config: LedgerConfig, checks: ConfirmationChecks) -> Self {
        Self { config, checks }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Seed the ledger with the sample booking request.
    pub fn init_ledger(&self, ctx: &TxContext<'_>) -> Result<BookingReceipt, BookingError> {
        let request = BookingRequest::new(SAMPLE_BOOKING_ID, sample_booking_details());
        self.create_booking_request(ctx, request)
    }

    /// Create a booking request. The server assigns the reference and timestamps,
    /// and the ID when the caller left it empty.
    pub fn create_booking_request(
        &self,
        ctx: &TxContext<'_>,
        request: BookingRequest,
    ) -> Result<BookingReceipt, BookingError> {
        let mut request = request;
        if request.id.trim().is_empty() {
            request.id = utils::new_booking_id();
        }
        request.doc_type = DocType::BookingRequest;
        request.carrier_booking_request_reference = self.new_reference()?;
        request.created_at = ctx.timestamp();
        request.updated_at = ctx.timestamp();
        request.document_status = DocumentStatus::Received;

        let errors = validate_booking_request(&request);
        if !errors.is_empty() {
            return Err(BookingError::ValidationFailed(errors));
        }

        if request.details.credit_amount < self.config.credit_threshold {
            request.document_status = DocumentStatus::Cancelled;
        }

        if ctx.store().get(&request.id)?.is_some() {
            return Err(already_exists(&request.id));
        }

        let bytes = codec::to_canonical_json(&request.id, &request)?;
        let writes = ctx.write_set().put(request.id.clone(), bytes, 0);
        let version = match ctx.store().commit(writes) {
            Ok(versions) => first_version(&request.id, &versions)?,
            Err(StoreError::VersionConflict { .. }) => return Err(already_exists(&request.id)),
            Err(e) => return Err(e.into()),
        };

        if request.document_status == DocumentStatus::Cancelled {
            warn!(
                booking_id = %request.id,
                tx_id = ctx.tx_id(),
                credit_amount = request.details.credit_amount,
                "booking request created cancelled: credit amount below threshold"
            );
        } else {
            info!(booking_id = %request.id, tx_id = ctx.tx_id(), "booking request created");
        }

        Ok(BookingReceipt::new(&request, version))
    }

    pub fn booking_request_exists(&self, ctx: &TxContext<'_>, id: &str) -> Result<bool, BookingError> {
        match self.load_request(ctx, id) {
            Ok(_) => Ok(true),
            Err(BookingError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn read_booking_request(
        &self,
        ctx: &TxContext<'_>,
        id: &str,
    ) -> Result<BookingRequest, BookingError> {
        self.load_request(ctx, id).map(|(request, _)| request)
    }

    /// The request together with its current version, for conditional updates.
    pub fn read_booking_request_versioned(
        &self,
        ctx: &TxContext<'_>,
        id: &str,
    ) -> Result<(BookingRequest, Version), BookingError> {
        self.load_request(ctx, id)
    }

    /// Replace the details of a request that has not been confirmed yet. The
    /// reference is regenerated and the low-credit rule applied again.
    pub fn update_booking_request(
        &self,
        ctx: &TxContext<'_>,
        id: &str,
        update: BookingUpdate,
    ) -> Result<BookingReceipt, BookingError> {
        let (current, version) = self.load_request(ctx, id)?;

        if let Some(expected) = update.if_version {
            if expected != version {
                return Err(BookingError::VersionConflict {
                    key: id.to_string(),
                    expected,
                    actual: version,
                });
            }
        }
        if current.document_status == DocumentStatus::Confirmed {
            return Err(invalid_state(&current, "update"));
        }

        let mut next = current.clone();
        next.details = update.details;
        next.carrier_booking_request_reference = self.new_reference()?;
        next.updated_at = ctx.timestamp().max(current.updated_at);

        let errors = validate_booking_request(&next);
        if !errors.is_empty() {
            return Err(BookingError::ValidationFailed(errors));
        }

        if next.document_status == DocumentStatus::Received
            && next.details.credit_amount < self.config.credit_threshold
        {
            next.document_status = DocumentStatus::Cancelled;
            warn!(
                booking_id = id,
                tx_id = ctx.tx_id(),
                credit_amount = next.details.credit_amount,
                "booking request cancelled on update: credit amount below threshold"
            );
        }

        let bytes = codec::to_canonical_json(id, &next)?;
        let versions = ctx.store().commit(ctx.write_set().put(id, bytes, version))?;
        let version = first_version(id, &versions)?;

        info!(booking_id = id, tx_id = ctx.tx_id(), version, "booking request updated");
        Ok(BookingReceipt::new(&next, version))
    }

    /// Run the confirmation checks and, if all pass, store the confirmation and
    /// mark the request confirmed in the same commit.
    pub fn confirm_booking_request(
        &self,
        ctx: &TxContext<'_>,
        id: &str,
        fields: ConfirmationFields,
    ) -> Result<BookingConfirmation, BookingError> {
        let (mut request, version) = self.load_request(ctx, id)?;

        if request.document_status.is_terminal() {
            return Err(invalid_state(&request, "confirm"));
        }

        let key = confirmation_key(id);
        if ctx.store().get(&key)?.is_some() {
            return Err(BookingError::AlreadyExists(format!("booking confirmation {key}")));
        }

        if let Err(failure) = self.checks.run(&request, &fields) {
            debug!(booking_id = id, check = %failure.kind, missing = ?failure.missing, "confirmation check failed");
            return Err(BookingError::CheckFailed {
                kind: failure.kind,
                booking_request_id: id.to_string(),
                missing: failure.missing,
            });
        }

        let confirmation = BookingConfirmation::new(id, fields, ctx.timestamp());
        request.document_status = DocumentStatus::Confirmed;
        request.updated_at = ctx.timestamp().max(request.updated_at);

        let writes = ctx
            .write_set()
            .put(key.clone(), codec::to_canonical_json(&key, &confirmation)?, 0)
            .put(id, codec::to_canonical_json(id, &request)?, version);
        ctx.store().commit(writes)?;

        info!(booking_id = id, tx_id = ctx.tx_id(), confirmation_id = %key, "booking request confirmed");
        Ok(confirmation)
    }

    pub fn get_booking_confirmation(
        &self,
        ctx: &TxContext<'_>,
        confirmation_id: &str,
    ) -> Result<BookingConfirmation, BookingError> {
        let not_found = || BookingError::NotFound(format!("booking confirmation {confirmation_id}"));
        let current = ctx.store().get(confirmation_id)?.ok_or_else(not_found)?;
        let (doc_type, value) = codec::decode_document(confirmation_id, &current.value)?;
        if doc_type != DocType::BookingConfirmation {
            return Err(not_found());
        }
        codec::from_document(confirmation_id, value)
    }

    /// Remove a request that has not been confirmed. Its history keeps a tombstone.
    pub fn delete_booking_request(&self, ctx: &TxContext<'_>, id: &str) -> Result<(), BookingError> {
        let (current, version) = self.load_request(ctx, id)?;
        if current.document_status == DocumentStatus::Confirmed {
            return Err(invalid_state(&current, "delete"));
        }

        ctx.store().commit(ctx.write_set().delete(id, version))?;

        info!(booking_id = id, tx_id = ctx.tx_id(), "booking request deleted");
        Ok(())
    }

    pub fn get_all_booking_requests(
        &self,
        ctx: &TxContext<'_>,
    ) -> Result<Vec<BookingRequest>, BookingError> {
        query::get_all(ctx.store())
    }

    /// A page of booking requests starting at `bookmark` (empty for the first page).
    pub fn get_booking_requests_page(
        &self,
        ctx: &TxContext<'_>,
        page_size: Option<usize>,
        bookmark: &str,
    ) -> Result<Page, BookingError> {
        let page_size = page_size.unwrap_or(self.config.default_page_size);
        query::get_page(ctx.store(), page_size, bookmark)
    }

    pub fn get_booking_request_history(
        &self,
        ctx: &TxContext<'_>,
        id: &str,
    ) -> Result<Vec<HistoryEntry>, BookingError> {
        query::get_history(ctx.store(), id)
    }

    fn load_request(
        &self,
        ctx: &TxContext<'_>,
        id: &str,
    ) -> Result<(BookingRequest, Version), BookingError> {
        let not_found = || BookingError::NotFound(format!("booking request {id}"));
        let current = ctx.store().get(id)?.ok_or_else(not_found)?;
        let (doc_type, value) = codec::decode_document(id, &current.value)?;
        if doc_type != DocType::BookingRequest {
            return Err(not_found());
        }
        Ok((codec::from_document(id, value)?, current.version))
    }

    fn new_reference(&self) -> Result<String, BookingError> {
        utils::new_uuid_to_bech32(&self.config.reference_hrp).map_err(|e| {
            BookingError::HostFailure(format!("failed to generate booking reference: {e}"))
        })
    }
}

fn already_exists(id: &str) -> BookingError {
    BookingError::AlreadyExists(format!("booking request {id}"))
}

fn invalid_state(request: &BookingRequest, operation: &'static str) -> BookingError {
    BookingError::InvalidState {
        id: request.id.clone(),
        status: request.document_status,
        operation,
    }
}

fn first_version(key: &str, versions: &[Version]) -> Result<Version, BookingError> {
    versions
        .first()
        .copied()
        .ok_or_else(|| BookingError::HostFailure(format!("commit of {key} returned no version")))
}
