//! Purchase bills and the payments made against them

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::traits::*;
use crate::types::*;
use crate::utils::validation::{validate_non_negative_amount, validate_positive_amount};

/// Payment mode recorded for the amount paid when a bill is entered
pub const INITIAL_PAYMENT_MODE: &str = "Cash";

/// Reference recorded for the amount paid when a bill is entered
pub const INITIAL_PAYMENT_REFERENCE: &str = "Initial Payment";

/// Purchase row as listed, with the vendor resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseView {
    pub purchase: Purchase,
    pub vendor_name: String,
    pub due_amount: BigDecimal,
}

/// Purchase ledger for vendor bills and their settlement
pub struct PurchaseLedger<S: BillingStorage> {
    storage: S,
}

impl<S: BillingStorage> PurchaseLedger<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Record a vendor bill. A positive `amount_paid` is stored as its first
    /// payment, dated with the bill.
    pub async fn record_purchase(
        &mut self,
        purchase: NewPurchase,
        amount_paid: BigDecimal,
    ) -> BillingResult<RecordId> {
        validate_non_negative_amount("Total amount", &purchase.total_amount)?;
        validate_non_negative_amount("Amount paid", &amount_paid)?;

        let vendor = self
            .storage
            .get_vendor(purchase.vendor_id)
            .await?
            .ok_or_else(|| BillingError::VendorNotFound(purchase.vendor_id.to_string()))?;

        let initial_payment = (amount_paid > BigDecimal::from(0)).then(|| NewPurchasePayment {
            payment_date: purchase.purchase_date,
            amount: amount_paid,
            payment_mode: INITIAL_PAYMENT_MODE.to_string(),
            reference_no: INITIAL_PAYMENT_REFERENCE.to_string(),
        });

        let purchase_id = self
            .storage
            .save_purchase(&purchase, initial_payment.as_ref())
            .await?;

        info!(
            "Recorded purchase bill '{}' from '{}' ({}), total {}",
            purchase.bill_no, vendor.name, purchase_id, purchase.total_amount
        );
        Ok(purchase_id)
    }

    /// Append a payment as given and refresh the bill's paid amount and status.
    ///
    /// The amount is not checked against what is due; see [`Self::pay_due`].
    pub async fn add_payment(
        &mut self,
        purchase_id: RecordId,
        payment: NewPurchasePayment,
    ) -> BillingResult<Purchase> {
        let purchase = self
            .storage
            .add_purchase_payment(purchase_id, &payment)
            .await
            .inspect_err(|e| warn!("Failed to add payment to purchase {}: {}", purchase_id, e))?;

        info!(
            "Payment of {} on purchase {}: paid {} of {}, {}",
            payment.amount,
            purchase_id,
            purchase.amount_paid,
            purchase.total_amount,
            purchase.payment_status
        );
        Ok(purchase)
    }

    /// Pay towards a bill's outstanding balance.
    ///
    /// Refuses a bill that is already settled and any amount that is not
    /// positive or exceeds what is due.
    pub async fn pay_due(
        &mut self,
        purchase_id: RecordId,
        payment: NewPurchasePayment,
    ) -> BillingResult<Purchase> {
        let purchase = self.get_purchase_required(purchase_id).await?;
        let due = purchase.due_amount();

        if due <= BigDecimal::from(0) {
            return Err(BillingError::Validation(format!(
                "Purchase bill '{}' is already fully paid",
                purchase.bill_no
            )));
        }
        validate_positive_amount("Payment amount", &payment.amount)?;
        if payment.amount > due {
            return Err(BillingError::Validation(format!(
                "Payment of {} exceeds the due amount of {}",
                payment.amount, due
            )));
        }

        self.add_payment(purchase_id, payment).await
    }

    /// Convenience for [`Self::pay_due`] with the payment fields spelled out
    pub async fn pay(
        &mut self,
        purchase_id: RecordId,
        payment_date: NaiveDate,
        amount: BigDecimal,
        payment_mode: &str,
        reference_no: &str,
    ) -> BillingResult<Purchase> {
        self.pay_due(
            purchase_id,
            NewPurchasePayment {
                payment_date,
                amount,
                payment_mode: payment_mode.to_string(),
                reference_no: reference_no.to_string(),
            },
        )
        .await
    }

    pub async fn get_purchase(&self, purchase_id: RecordId) -> BillingResult<Option<Purchase>> {
        self.storage.get_purchase(purchase_id).await
    }

    /// Get a purchase by ID, returning an error if not found
    pub async fn get_purchase_required(&self, purchase_id: RecordId) -> BillingResult<Purchase> {
        self.storage
            .get_purchase(purchase_id)
            .await?
            .ok_or(BillingError::PurchaseNotFound(purchase_id))
    }

    /// Every bill, newest first, with vendor name and balance
    pub async fn list_purchases(&self) -> BillingResult<Vec<PurchaseView>> {
        let purchases = self.storage.list_purchases().await?;
        let vendors = self.storage.list_vendors().await?;

        Ok(purchases
            .into_iter()
            .map(|purchase| {
                let vendor_name = vendors
                    .iter()
                    .find(|vendor| vendor.id == purchase.vendor_id)
                    .map(|vendor| vendor.name.clone())
                    .unwrap_or_default();
                PurchaseView {
                    due_amount: purchase.due_amount(),
                    vendor_name,
                    purchase,
                }
            })
            .collect())
    }

    /// Payment history of a bill, oldest first
    pub async fn payments(&self, purchase_id: RecordId) -> BillingResult<Vec<PurchasePayment>> {
        self.storage.get_purchase_payments(purchase_id).await
    }

    /// Total still owed across all bills
    pub async fn outstanding_total(&self) -> BillingResult<BigDecimal> {
        let purchases = self.storage.list_purchases().await?;
        Ok(purchases
            .iter()
            .map(Purchase::due_amount)
            .filter(|due| *due > BigDecimal::from(0))
            .sum())
    }
}
