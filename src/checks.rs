//! Pre-confirmation checks
//!
//! Each check is its own collaborator so a real compliance or credit service can
//! be plugged in without touching the confirmation workflow. They run in a fixed
//! order and the first failure stops the confirmation.
use super::booking::{BookingRequest, ConfirmationFields};
use super::error::CheckKind;
use std::sync::Arc;
use tracing::info;

pub trait ComplianceChecker: Send + Sync {
    fn check_compliance(&self, request: &BookingRequest) -> bool;
}

pub trait CreditChecker: Send + Sync {
    fn check_credit(&self, request: &BookingRequest) -> bool;
}

pub trait SpecialCargoChecker: Send + Sync {
    fn check_special_cargo(&self, request: &BookingRequest) -> bool;
}

pub trait CompletenessChecker: Send + Sync {
    /// Names of the information still missing; empty when complete.
    fn missing_information(
        &self,
        request: &BookingRequest,
        fields: &ConfirmationFields,
    ) -> Vec<String>;
}

/// Told which information is missing when the completeness check fails, so the
/// customer can be asked for it.
pub trait MissingInfoNotifier: Send + Sync {
    fn notify_missing_information(&self, request: &BookingRequest, missing: &[String]);
}

/// Records the request for missing information in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMissingInformation;

impl MissingInfoNotifier for LogMissingInformation {
    fn notify_missing_information(&self, request: &BookingRequest, missing: &[String]) {
        info!(booking_id = %request.id, missing = ?missing, "missing information requested from customer");
    }
}

/// Passes every boolean check.
#[derive(Debug, Default, Clone, Copy)]
pub struct Approve;

impl ComplianceChecker for Approve {
    fn check_compliance(&self, _: &BookingRequest) -> bool {
        true
    }
}

impl CreditChecker for Approve {
    fn check_credit(&self, _: &BookingRequest) -> bool {
        true
    }
}

impl SpecialCargoChecker for Approve {
    fn check_special_cargo(&self, _: &BookingRequest) -> bool {
        true
    }
}

/// Requires every confirmation field except `AdditionalServices`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequiredConfirmationFields;

impl CompletenessChecker for RequiredConfirmationFields {
    fn missing_information(&self, _: &BookingRequest, fields: &ConfirmationFields) -> Vec<String> {
        [
            ("TransportPlan", &fields.transport_plan),
            ("SpaceAllocation", &fields.space_allocation),
            ("EmptyEquipmentRelease", &fields.empty_equipment_release),
            ("CarrierHaulageOrder", &fields.carrier_haulage_order),
            ("PricingConfirmation", &fields.pricing_confirmation),
            (
                "RestrictedPartyScreeningCheck",
                &fields.restricted_party_screening_check,
            ),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name.to_string())
        .collect()
    }
}

/// A failed check; `missing` is only populated by the completeness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    pub kind: CheckKind,
    pub missing: Vec<String>,
}

#[derive(Clone)]
pub struct ConfirmationChecks {
    compliance: Arc<dyn ComplianceChecker>,
    credit: Arc<dyn CreditChecker>,
    special_cargo: Arc<dyn SpecialCargoChecker>,
    completeness: Arc<dyn CompletenessChecker>,
    notifier: Arc<dyn MissingInfoNotifier>,
}

impl Default for ConfirmationChecks {
    fn default() -> Self {
        Self {
            compliance: Arc::new(Approve),
            credit: Arc::new(Approve),
            special_cargo: Arc::new(Approve),
            completeness: Arc::new(RequiredConfirmationFields),
            notifier: Arc::new(LogMissingInformation),
        }
    }
}

impl ConfirmationChecks {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_compliance(mut self, checker: impl ComplianceChecker + 'static) -> Self {
        self.compliance = Arc::new(checker);
        self
    }
    pub fn set_credit(mut self, checker: impl CreditChecker + 'static) -> Self {
        self.credit = Arc::new(checker);
        self
    }
    pub fn set_special_cargo(mut self, checker: impl SpecialCargoChecker + 'static) -> Self {
        self.special_cargo = Arc::new(checker);
        self
    }
    pub fn set_completeness(mut self, checker: impl CompletenessChecker + 'static) -> Self {
        self.completeness = Arc::new(checker);
        self
    }
    pub fn set_notifier(mut self, notifier: impl MissingInfoNotifier + 'static) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// Compliance, credit, special cargo, then completeness; stops at the first failure.
    /// Missing information is passed to the notifier before the failure is returned.
    pub fn run(
        &self,
        request: &BookingRequest,
        fields: &ConfirmationFields,
    ) -> Result<(), CheckFailure> {
        let failed = |kind| CheckFailure {
            kind,
            missing: vec![],
        };

        if !self.compliance.check_compliance(request) {
            return Err(failed(CheckKind::Compliance));
        }
        if !self.credit.check_credit(request) {
            return Err(failed(CheckKind::Credit));
        }
        if !self.special_cargo.check_special_cargo(request) {
            return Err(failed(CheckKind::SpecialCargo));
        }
        let missing = self.completeness.missing_information(request, fields);
        if !missing.is_empty() {
            self.notifier.notify_missing_information(request, &missing);
            return Err(CheckFailure {
                kind: CheckKind::Completeness,
                missing,
            });
        }
        Ok(())
    }
}
