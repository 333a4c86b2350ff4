//! Core types and data structures for the billing system

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::tax::gst::{GstError, InvoiceTotals, LineItem, SupplyType};

/// Row identifier assigned by the storage backend
pub type RecordId = i64;

/// Products at or below this quantity are reported as low on stock
pub const LOW_STOCK_THRESHOLD: i64 = 10;

/// Marker shown in front of the number of a cancelled invoice
pub const CANCELLED_MARKER: &str = "[CANCELLED] ";

/// Product master record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: RecordId,
    /// Unique product name, also used as the invoice line description
    pub name: String,
    /// HSN/SAC classification code
    pub hsn: Option<String>,
    /// GST rate in percent (e.g. 18 for 18%)
    pub gst_rate: BigDecimal,
    /// Weighted-average cost price of the stock on hand
    pub rate: BigDecimal,
    /// Default selling price per unit
    pub selling_price: BigDecimal,
    /// Quantity on hand; fractional units are allowed and it may go negative
    /// when a sale was saved over a stock warning
    pub stock_qty: BigDecimal,
    /// Unit label (pcs, kg, ...)
    pub unit: Option<String>,
}

impl Product {
    /// Whether the product is at or below the low-stock threshold
    pub fn is_low_stock(&self) -> bool {
        self.stock_qty <= BigDecimal::from(LOW_STOCK_THRESHOLD)
    }
}

/// Product fields for insertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub hsn: Option<String>,
    pub gst_rate: BigDecimal,
    pub rate: BigDecimal,
    pub selling_price: BigDecimal,
    pub stock_qty: BigDecimal,
    pub unit: Option<String>,
}

impl NewProduct {
    pub(crate) fn into_product(self, id: RecordId) -> Product {
        Product {
            id,
            name: self.name,
            hsn: self.hsn,
            gst_rate: self.gst_rate,
            rate: self.rate,
            selling_price: self.selling_price,
            stock_qty: self.stock_qty,
            unit: self.unit,
        }
    }
}

/// Customer an invoice is billed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    pub id: RecordId,
    pub name: String,
    /// GSTIN; its first two characters are the buyer's state code
    pub gstin: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub state: Option<String>,
}

/// Buyer fields for insertion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBuyer {
    pub name: String,
    pub gstin: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub state: Option<String>,
}

impl NewBuyer {
    pub(crate) fn into_buyer(self, id: RecordId) -> Buyer {
        Buyer {
            id,
            name: self.name,
            gstin: self.gstin,
            address: self.address,
            phone: self.phone,
            email: self.email,
            state: self.state,
        }
    }
}

/// Supplier purchase bills are recorded against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: RecordId,
    pub name: String,
    pub gstin: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Vendor fields for insertion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVendor {
    pub name: String,
    pub gstin: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl NewVendor {
    pub(crate) fn into_vendor(self, id: RecordId) -> Vendor {
        Vendor {
            id,
            name: self.name,
            gstin: self.gstin,
            address: self.address,
            phone: self.phone,
            email: self.email,
        }
    }
}

/// Lifecycle state of a saved invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Active,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Active => "Active",
            InvoiceStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(InvoiceStatus::Active),
            "Cancelled" => Ok(InvoiceStatus::Cancelled),
            other => Err(BillingError::Storage(format!(
                "Unknown invoice status '{}'",
                other
            ))),
        }
    }
}

/// Saved invoice header with its tax breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: RecordId,
    /// Invoice number; never changes after the invoice is saved
    pub invoice_no: String,
    pub invoice_date: NaiveDate,
    pub buyer_id: RecordId,
    pub payment_mode: String,
    pub order_ref: Option<String>,
    pub dispatch_info: Option<String>,
    /// Jurisdiction decided when the invoice was saved
    pub supply_type: SupplyType,
    pub totals: InvoiceTotals,
    pub status: InvoiceStatus,
}

impl Invoice {
    pub fn is_cancelled(&self) -> bool {
        self.status == InvoiceStatus::Cancelled
    }

    /// Number as shown on documents and reports, marked when cancelled
    pub fn display_number(&self) -> String {
        match self.status {
            InvoiceStatus::Active => self.invoice_no.clone(),
            InvoiceStatus::Cancelled => format!("{}{}", CANCELLED_MARKER, self.invoice_no),
        }
    }

    /// Apply the cancellation mutation: status flips and the payable figures are zeroed.
    /// The remaining breakdown is kept for audit.
    pub(crate) fn mark_cancelled(&mut self) {
        self.status = InvoiceStatus::Cancelled;
        self.totals.grand_total = BigDecimal::from(0);
        self.totals.taxable_value = BigDecimal::from(0);
        self.totals.total_gst = BigDecimal::from(0);
    }
}

/// Invoice header fields for insertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub invoice_no: String,
    pub invoice_date: NaiveDate,
    pub buyer_id: RecordId,
    pub payment_mode: String,
    pub order_ref: Option<String>,
    pub dispatch_info: Option<String>,
    pub supply_type: SupplyType,
    pub totals: InvoiceTotals,
}

impl NewInvoice {
    pub(crate) fn into_invoice(self, id: RecordId) -> Invoice {
        Invoice {
            id,
            invoice_no: self.invoice_no,
            invoice_date: self.invoice_date,
            buyer_id: self.buyer_id,
            payment_mode: self.payment_mode,
            order_ref: self.order_ref,
            dispatch_info: self.dispatch_info,
            supply_type: self.supply_type,
            totals: self.totals,
            status: InvoiceStatus::Active,
        }
    }
}

/// Invoice line with the product data frozen at sale time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: RecordId,
    pub invoice_id: RecordId,
    /// Product whose stock this line moved
    pub product_id: RecordId,
    pub description: String,
    pub hsn: Option<String>,
    pub gst_rate: BigDecimal,
    pub quantity: BigDecimal,
    pub rate: BigDecimal,
    pub discount_percent: BigDecimal,
    /// Taxable amount of the line (after discount, before GST)
    pub amount: BigDecimal,
}

impl InvoiceItem {
    /// The computation input this line was saved from
    pub fn line_item(&self) -> LineItem {
        LineItem::new(
            self.quantity.clone(),
            self.rate.clone(),
            self.discount_percent.clone(),
            self.gst_rate.clone(),
        )
    }
}

/// Invoice line fields for insertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoiceItem {
    pub product_id: RecordId,
    pub description: String,
    pub hsn: Option<String>,
    pub gst_rate: BigDecimal,
    pub quantity: BigDecimal,
    pub rate: BigDecimal,
    pub discount_percent: BigDecimal,
    pub amount: BigDecimal,
}

impl NewInvoiceItem {
    pub(crate) fn into_item(self, id: RecordId, invoice_id: RecordId) -> InvoiceItem {
        InvoiceItem {
            id,
            invoice_id,
            product_id: self.product_id,
            description: self.description,
            hsn: self.hsn,
            gst_rate: self.gst_rate,
            quantity: self.quantity,
            rate: self.rate,
            discount_percent: self.discount_percent,
            amount: self.amount,
        }
    }
}

/// Invoice selection for reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceFilter {
    /// First date included
    pub start_date: NaiveDate,
    /// Last date included
    pub end_date: NaiveDate,
    pub buyer_id: Option<RecordId>,
}

impl InvoiceFilter {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            buyer_id: None,
        }
    }

    pub fn for_buyer(mut self, buyer_id: RecordId) -> Self {
        self.buyer_id = Some(buyer_id);
        self
    }

    pub fn matches(&self, invoice: &Invoice) -> bool {
        invoice.invoice_date >= self.start_date
            && invoice.invoice_date <= self.end_date
            && self.buyer_id.is_none_or(|id| invoice.buyer_id == id)
    }
}

/// Settlement state of a purchase bill, derived from its payments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

impl PaymentStatus {
    /// Nothing paid is Unpaid, reaching the bill total is Paid, anything in between is Partial
    pub fn derive(total_amount: &BigDecimal, amount_paid: &BigDecimal) -> Self {
        if *amount_paid <= BigDecimal::from(0) {
            PaymentStatus::Unpaid
        } else if amount_paid >= total_amount {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "Unpaid",
            PaymentStatus::Partial => "Partial",
            PaymentStatus::Paid => "Paid",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unpaid" => Ok(PaymentStatus::Unpaid),
            "Partial" => Ok(PaymentStatus::Partial),
            "Paid" => Ok(PaymentStatus::Paid),
            other => Err(BillingError::Storage(format!(
                "Unknown payment status '{}'",
                other
            ))),
        }
    }
}

/// Vendor bill with its materialized payment aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: RecordId,
    pub vendor_id: RecordId,
    pub bill_no: String,
    pub purchase_date: NaiveDate,
    pub total_amount: BigDecimal,
    /// Sum of all payments recorded against the bill
    pub amount_paid: BigDecimal,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
}

impl Purchase {
    /// Amount still owed on the bill
    pub fn due_amount(&self) -> BigDecimal {
        &self.total_amount - &self.amount_paid
    }

    /// Refresh the aggregate from the full payment history
    pub(crate) fn apply_payments<'a>(
        &mut self,
        payments: impl IntoIterator<Item = &'a BigDecimal>,
    ) {
        self.amount_paid = payments.into_iter().sum();
        self.payment_status = PaymentStatus::derive(&self.total_amount, &self.amount_paid);
    }
}

/// Purchase bill fields for insertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPurchase {
    pub vendor_id: RecordId,
    pub bill_no: String,
    pub purchase_date: NaiveDate,
    pub total_amount: BigDecimal,
    pub notes: Option<String>,
}

/// Payment made against a purchase bill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchasePayment {
    pub id: RecordId,
    pub purchase_id: RecordId,
    pub payment_date: NaiveDate,
    pub amount: BigDecimal,
    pub payment_mode: String,
    /// UTR, cheque number or similar
    pub reference_no: String,
}

/// Payment fields for insertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPurchasePayment {
    pub payment_date: NaiveDate,
    pub amount: BigDecimal,
    pub payment_mode: String,
    pub reference_no: String,
}

impl NewPurchasePayment {
    pub(crate) fn into_payment(self, id: RecordId, purchase_id: RecordId) -> PurchasePayment {
        PurchasePayment {
            id,
            purchase_id,
            payment_date: self.payment_date,
            amount: self.amount,
            payment_mode: self.payment_mode,
            reference_no: self.reference_no,
        }
    }
}

/// Errors that can occur in the billing system
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(RecordId),
    #[error("Invoice already cancelled: {0}")]
    InvoiceAlreadyCancelled(String),
    #[error("Purchase not found: {0}")]
    PurchaseNotFound(RecordId),
    #[error("Product not found: {0}")]
    ProductNotFound(String),
    #[error("Buyer not found: {0}")]
    BuyerNotFound(String),
    #[error("Vendor not found: {0}")]
    VendorNotFound(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invoice {cancelled_invoice_no} was cancelled but its replacement could not be prepared: {reason}")]
    ReissueIncomplete {
        cancelled_invoice_no: String,
        reason: String,
    },
}

impl BillingError {
    /// Whether the failed operation may simply be retried
    pub fn is_retry_safe(&self) -> bool {
        !matches!(self, BillingError::ReissueIncomplete { .. })
    }

    /// Message suitable for showing to the operator
    pub fn user_message(&self) -> String {
        if self.is_retry_safe() {
            format!("{}. The operation was not completed; it is safe to retry.", self)
        } else {
            format!(
                "{}. The cancellation is already saved and stock was restored; \
                 create the replacement invoice manually.",
                self
            )
        }
    }
}

impl From<GstError> for BillingError {
    fn from(err: GstError) -> Self {
        BillingError::Validation(err.to_string())
    }
}

/// Result type for billing operations
pub type BillingResult<T> = Result<T, BillingError>;
