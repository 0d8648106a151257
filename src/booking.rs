//! Booking request and booking confirmation documents
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Suffix appended to a booking request ID to form its confirmation key.
pub const CONFIRMATION_SUFFIX: &str = "-confirmation";

/// Discriminates the documents sharing the ledger namespace.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DocType {
    #[default]
    #[serde(rename = "bookingRequest")]
    BookingRequest,
    #[serde(rename = "bookingConfirmation")]
    BookingConfirmation,
}

/// Lifecycle of a booking request. Serialised with the DCSA status codes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DocumentStatus {
    #[default]
    #[serde(rename = "RECE")]
    Received,
    #[serde(rename = "CANC")]
    Cancelled,
    #[serde(rename = "CONF")]
    Confirmed,
}

impl DocumentStatus {
    /// `Cancelled` and `Confirmed` accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DocumentStatus::Received)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentStatus::Received => "RECEIVED",
            DocumentStatus::Cancelled => "CANCELLED",
            DocumentStatus::Confirmed => "CONFIRMED",
        };
        f.pad(name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Carrier {
    #[serde(rename = "IssuerID")]
    pub issuer_id: String,
    #[serde(rename = "EntityName")]
    pub entity_name: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "phone")]
    pub phone: String,
    #[serde(rename = "emailOrFax")]
    pub email_or_fax: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Shipper {
    pub company_name: String,
    pub physical_address: String,
    pub contact_name: String,
    pub email_or_fax: String,
    pub phone: String,
    #[serde(rename = "leiOrTaxID")]
    pub lei_or_tax_id: String,
}

/// Contact block shared by the consignee and the place of receipt.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub company_name: String,
    pub physical_address: String,
    pub contact_name: String,
    pub email_or_fax: String,
    pub phone: String,
    #[serde(rename = "leiOrTaxID")]
    pub lei_or_tax_id: String,
    pub to_order_identifier: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Commodity {
    pub commodity_name: String,
    pub description: String,
    pub quantity: u32,
}

/// The caller-controlled part of a booking request. An update replaces all of it.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct BookingDetails {
    #[serde(rename = "carrierDetails")]
    pub carrier: Carrier,
    #[serde(rename = "shipperEntity")]
    pub shipper: Shipper,
    #[serde(rename = "consignee")]
    pub consignee: Party,
    #[serde(rename = "placeOfReceipt")]
    pub place_of_receipt: Party,
    #[serde(rename = "placeOfDelivery")]
    pub place_of_delivery: String,
    #[serde(rename = "serviceType")]
    pub service_type: String,
    #[serde(rename = "cargoMovementSrc")]
    pub cargo_movement_origin: String,
    #[serde(rename = "cargoMovementDst")]
    pub cargo_movement_destination: String,
    #[serde(rename = "commodity")]
    pub commodity: Commodity,
    #[serde(rename = "cargoGrossWeight")]
    pub cargo_gross_weight: f64,
    #[serde(rename = "containerType")]
    pub container_type_size: String,
    #[serde(rename = "creditAmount")]
    pub credit_amount: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct BookingRequest {
    #[serde(rename = "docType")]
    pub doc_type: DocType,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "carrierBookingRequestReference")]
    pub carrier_booking_request_reference: String,
    #[serde(rename = "documentStatus")]
    pub document_status: DocumentStatus,
    #[serde(rename = "bookingRequestCreatedDateTime")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "bookingRequestUpdatedDateTime")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub details: BookingDetails,
}

impl BookingRequest {
    /// Construct a request draft; server-managed fields are filled in on create.
    pub fn new(id: impl Into<String>, details: BookingDetails) -> Self {
        Self {
            id: id.into(),
            details,
            ..Self::default()
        }
    }

    /// Key under which this request's confirmation is stored.
    pub fn confirmation_key(&self) -> String {
        confirmation_key(&self.id)
    }
}

/// Descriptive fields supplied by the carrier when confirming a booking.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmationFields {
    #[serde(rename = "TransportPlan")]
    pub transport_plan: String,
    #[serde(rename = "SpaceAllocation")]
    pub space_allocation: String,
    #[serde(rename = "EmptyEquipmentRelease")]
    pub empty_equipment_release: String,
    #[serde(rename = "CarrierHaulageOrder")]
    pub carrier_haulage_order: String,
    #[serde(rename = "AdditionalServices")]
    pub additional_services: String,
    #[serde(rename = "PricingConfirmation")]
    pub pricing_confirmation: String,
    #[serde(rename = "RestrictedPartyScreeningCheck")]
    pub restricted_party_screening_check: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BookingConfirmation {
    #[serde(rename = "docType")]
    pub doc_type: DocType,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "BookingRequestID")]
    pub booking_request_id: String,
    #[serde(rename = "confirmedAt")]
    pub confirmed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: ConfirmationFields,
}

impl BookingConfirmation {
    pub fn new(
        booking_request_id: &str,
        fields: ConfirmationFields,
        confirmed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            doc_type: DocType::BookingConfirmation,
            id: confirmation_key(booking_request_id),
            booking_request_id: booking_request_id.to_string(),
            confirmed_at,
            fields,
        }
    }
}

pub fn confirmation_key(booking_request_id: &str) -> String {
    format!("{booking_request_id}{CONFIRMATION_SUFFIX}")
}

/// The booking request the ledger is seeded with by `init_ledger`.
pub fn sample_booking_details() -> BookingDetails {
    BookingDetails {
        carrier: Carrier {
            issuer_id: "carrier123".into(),
            entity_name: "Carrier Corp".into(),
            address: "123 Main St".into(),
            phone: "+1-123-456-7890".into(),
            email_or_fax: "carrier@company.com".into(),
        },
        shipper: Shipper {
            company_name: "Shipper Co".into(),
            physical_address: "456 Elm St".into(),
            contact_name: "John Doe".into(),
            email_or_fax: "shipper@company.com".into(),
            phone: "+1-987-654-3210".into(),
            lei_or_tax_id: "SHIP12345".into(),
        },
        consignee: Party {
            company_name: "Consignee Inc".into(),
            physical_address: "789 Oak St".into(),
            contact_name: "Jane Smith".into(),
            email_or_fax: "consignee@company.com".into(),
            phone: "+1-555-555-5555".into(),
            lei_or_tax_id: "CONSGN6789".into(),
            to_order_identifier: "TO123".into(),
        },
        place_of_receipt: Party {
            company_name: "Receipt Place Ltd".into(),
            physical_address: "101 Pine St".into(),
            contact_name: "Receptionist".into(),
            email_or_fax: "receipt@company.com".into(),
            phone: "+1-777-777-7777".into(),
            lei_or_tax_id: "RCPT5555".into(),
            to_order_identifier: "TO456".into(),
        },
        place_of_delivery: "Destination City".into(),
        service_type: "Express".into(),
        cargo_movement_origin: "Source Location".into(),
        cargo_movement_destination: "Destination Location".into(),
        commodity: Commodity {
            commodity_name: "Electronics".into(),
            description: "Consumer electronics".into(),
            quantity: 100,
        },
        cargo_gross_weight: 1500.75,
        container_type_size: "20 ft Container".into(),
        credit_amount: 75_000,
    }
}
