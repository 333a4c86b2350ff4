//! Validation utilities

use bigdecimal::BigDecimal;

use crate::billing::draft::InvoiceDraft;
use crate::traits::*;
use crate::types::*;

/// Length of a GSTIN
pub const GSTIN_LENGTH: usize = 15;

/// Validate that an amount is positive
pub fn validate_positive_amount(field: &str, amount: &BigDecimal) -> BillingResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(BillingError::Validation(format!(
            "{} must be positive",
            field
        )))
    } else {
        Ok(())
    }
}

/// Validate that an amount is zero or more
pub fn validate_non_negative_amount(field: &str, amount: &BigDecimal) -> BillingResult<()> {
    if *amount < BigDecimal::from(0) {
        Err(BillingError::Validation(format!(
            "{} cannot be negative",
            field
        )))
    } else {
        Ok(())
    }
}

/// Validate a master-data name (product, buyer, vendor)
pub fn validate_name(kind: &str, name: &str) -> BillingResult<()> {
    if name.trim().is_empty() {
        return Err(BillingError::Validation(format!(
            "{} name cannot be empty",
            kind
        )));
    }

    if name.len() > 200 {
        return Err(BillingError::Validation(format!(
            "{} name cannot exceed 200 characters",
            kind
        )));
    }

    Ok(())
}

/// Validate the shape of a GSTIN: 15 alphanumeric characters starting with a
/// two-digit state code
pub fn validate_gstin(gstin: &str) -> BillingResult<()> {
    let gstin = gstin.trim();

    if gstin.len() != GSTIN_LENGTH || !gstin.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(BillingError::Validation(format!(
            "GSTIN '{}' must be {} letters or digits",
            gstin, GSTIN_LENGTH
        )));
    }

    if !gstin.chars().take(2).all(|c| c.is_ascii_digit()) {
        return Err(BillingError::Validation(format!(
            "GSTIN '{}' must start with a two-digit state code",
            gstin
        )));
    }

    Ok(())
}

/// Validate an optional GSTIN, ignoring blanks
pub fn validate_optional_gstin(gstin: Option<&str>) -> BillingResult<()> {
    match gstin.map(str::trim).filter(|g| !g.is_empty()) {
        Some(gstin) => validate_gstin(gstin),
        None => Ok(()),
    }
}

/// Enhanced invoice validator with detailed checks
pub struct EnhancedInvoiceValidator;

impl InvoiceValidator for EnhancedInvoiceValidator {
    fn validate_draft(&self, draft: &InvoiceDraft) -> BillingResult<()> {
        // Basic validation
        DefaultInvoiceValidator.validate_draft(draft)?;

        // Enhanced validations
        validate_name("Buyer", &draft.buyer.name)?;
        validate_optional_gstin(draft.buyer.gstin.as_deref())?;
        validate_non_negative_amount("Freight", &draft.freight)?;

        for item in &draft.items {
            if item.description.trim().is_empty() {
                return Err(BillingError::Validation(
                    "Item description cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}
