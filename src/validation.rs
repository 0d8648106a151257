//! Pure field validation for booking requests
use super::booking::{BookingRequest, CONFIRMATION_SUFFIX, Party};
use super::error::FieldError;

/// Returns every violation found in `request`, or an empty list when it is valid.
pub fn validate_booking_request(request: &BookingRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let details = &request.details;

    if request.id.trim().is_empty() {
        errors.push(FieldError::new("ID", "must not be empty"));
    } else if request.id.contains('\0') {
        errors.push(FieldError::new("ID", "must not contain NUL characters"));
    } else if request.id.ends_with(CONFIRMATION_SUFFIX) {
        errors.push(FieldError::new(
            "ID",
            "must not end with the confirmation suffix",
        ));
    }

    if details.credit_amount < 0 {
        errors.push(FieldError::new("creditAmount", "must not be negative"));
    }
    if !details.cargo_gross_weight.is_finite() || details.cargo_gross_weight <= 0.0 {
        errors.push(FieldError::new(
            "cargoGrossWeight",
            "must be a finite number greater than zero",
        ));
    }

    let carrier = &details.carrier;
    require(&mut errors, "carrierDetails.EntityName", &carrier.entity_name);
    require(&mut errors, "carrierDetails.Address", &carrier.address);
    require(&mut errors, "carrierDetails.emailOrFax", &carrier.email_or_fax);

    let shipper = &details.shipper;
    require(&mut errors, "shipperEntity.companyName", &shipper.company_name);
    require(&mut errors, "shipperEntity.physicalAddress", &shipper.physical_address);
    require(&mut errors, "shipperEntity.emailOrFax", &shipper.email_or_fax);

    validate_party(&mut errors, "consignee", &details.consignee);
    validate_party(&mut errors, "placeOfReceipt", &details.place_of_receipt);

    errors
}

fn validate_party(errors: &mut Vec<FieldError>, prefix: &str, party: &Party) {
    require(errors, &format!("{prefix}.companyName"), &party.company_name);
    require(errors, &format!("{prefix}.physicalAddress"), &party.physical_address);
    require(errors, &format!("{prefix}.emailOrFax"), &party.email_or_fax);
}

fn require(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, "must not be empty"));
    }
}
