//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::billing::draft::InvoiceDraft;
use crate::config::Settings;
use crate::types::*;

/// Storage abstraction for the billing system
///
/// This trait allows the billing core to work with any storage backend
/// (SQLite, in-memory, etc.). Methods that touch more than one row are
/// atomic: either every change is applied or none is.
#[async_trait]
pub trait BillingStorage: Send + Sync {
    /// Insert a product, returning its id
    async fn insert_product(&mut self, product: &NewProduct) -> BillingResult<RecordId>;

    async fn get_product(&self, product_id: RecordId) -> BillingResult<Option<Product>>;

    async fn find_product_by_name(&self, name: &str) -> BillingResult<Option<Product>>;

    /// List all products ordered by name
    async fn list_products(&self) -> BillingResult<Vec<Product>>;

    async fn update_product(&mut self, product: &Product) -> BillingResult<()>;

    /// Delete a product that no invoice line references
    async fn delete_product(&mut self, product_id: RecordId) -> BillingResult<()>;

    /// Insert a buyer, returning its id
    async fn insert_buyer(&mut self, buyer: &NewBuyer) -> BillingResult<RecordId>;

    async fn get_buyer(&self, buyer_id: RecordId) -> BillingResult<Option<Buyer>>;

    async fn find_buyer_by_name(&self, name: &str) -> BillingResult<Option<Buyer>>;

    /// List all buyers ordered by name
    async fn list_buyers(&self) -> BillingResult<Vec<Buyer>>;

    async fn update_buyer(&mut self, buyer: &Buyer) -> BillingResult<()>;

    /// Delete a buyer that no invoice references
    async fn delete_buyer(&mut self, buyer_id: RecordId) -> BillingResult<()>;

    /// Insert a vendor, returning its id
    async fn insert_vendor(&mut self, vendor: &NewVendor) -> BillingResult<RecordId>;

    async fn get_vendor(&self, vendor_id: RecordId) -> BillingResult<Option<Vendor>>;

    async fn find_vendor_by_name(&self, name: &str) -> BillingResult<Option<Vendor>>;

    /// List all vendors ordered by name
    async fn list_vendors(&self) -> BillingResult<Vec<Vendor>>;

    async fn update_vendor(&mut self, vendor: &Vendor) -> BillingResult<()>;

    /// Delete a vendor that no purchase references
    async fn delete_vendor(&mut self, vendor_id: RecordId) -> BillingResult<()>;

    /// Every invoice number, active or cancelled, that starts with `prefix`
    async fn invoice_numbers_with_prefix(&self, prefix: &str) -> BillingResult<Vec<String>>;

    /// Insert an invoice with its items and take each item's quantity off
    /// the referenced product's stock, in one transaction
    async fn save_invoice(
        &mut self,
        invoice: &NewInvoice,
        items: &[NewInvoiceItem],
    ) -> BillingResult<RecordId>;

    async fn get_invoice(&self, invoice_id: RecordId) -> BillingResult<Option<Invoice>>;

    async fn get_invoice_items(&self, invoice_id: RecordId) -> BillingResult<Vec<InvoiceItem>>;

    /// Put every item's quantity back on stock, zero the payable totals and
    /// mark the invoice cancelled, in one transaction.
    ///
    /// Fails with `InvoiceNotFound` or `InvoiceAlreadyCancelled` without
    /// changing anything.
    async fn cancel_invoice(&mut self, invoice_id: RecordId) -> BillingResult<Invoice>;

    /// Cancel an invoice and save its replacement in one transaction
    async fn replace_invoice(
        &mut self,
        cancelled_id: RecordId,
        replacement: &NewInvoice,
        items: &[NewInvoiceItem],
    ) -> BillingResult<RecordId>;

    /// Invoices matching the filter, ordered by date then id
    async fn list_invoices(&self, filter: &InvoiceFilter) -> BillingResult<Vec<Invoice>>;

    /// Insert a purchase bill together with its optional opening payment
    async fn save_purchase(
        &mut self,
        purchase: &NewPurchase,
        initial_payment: Option<&NewPurchasePayment>,
    ) -> BillingResult<RecordId>;

    async fn get_purchase(&self, purchase_id: RecordId) -> BillingResult<Option<Purchase>>;

    /// List all purchases, newest first
    async fn list_purchases(&self) -> BillingResult<Vec<Purchase>>;

    /// Append a payment and recompute the purchase's paid amount and status
    /// from all of its payments, in one transaction
    async fn add_purchase_payment(
        &mut self,
        purchase_id: RecordId,
        payment: &NewPurchasePayment,
    ) -> BillingResult<Purchase>;

    async fn get_purchase_payments(
        &self,
        purchase_id: RecordId,
    ) -> BillingResult<Vec<PurchasePayment>>;
}

/// Trait for implementing custom invoice validation rules
pub trait InvoiceValidator: Send + Sync {
    /// Validate a draft before anything is persisted
    fn validate_draft(&self, draft: &InvoiceDraft) -> BillingResult<()>;
}

/// Default invoice validator with basic rules
pub struct DefaultInvoiceValidator;

impl InvoiceValidator for DefaultInvoiceValidator {
    fn validate_draft(&self, draft: &InvoiceDraft) -> BillingResult<()> {
        if draft.invoice_no.trim().is_empty() {
            return Err(BillingError::Validation(
                "Invoice number cannot be empty".to_string(),
            ));
        }

        if draft.buyer.name.trim().is_empty() {
            return Err(BillingError::Validation(
                "Buyer name cannot be empty".to_string(),
            ));
        }

        if !draft.items.iter().any(|item| item.line_item().is_billable()) {
            return Err(BillingError::Validation(
                "Cannot save an invoice with no items".to_string(),
            ));
        }

        for item in &draft.items {
            item.line_item().validate()?;
        }

        Ok(())
    }
}

/// Trait for turning a finalized invoice into a document (PDF, print, ...)
pub trait DocumentRenderer {
    type Output;

    /// Render one invoice with the company, bank and terms details from `settings`
    fn render_invoice(
        &self,
        document: &InvoiceDocument,
        settings: &Settings,
    ) -> BillingResult<Self::Output>;
}

/// Fully resolved invoice, in the shape a renderer consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDocument {
    pub invoice: Invoice,
    pub buyer: Buyer,
    pub items: Vec<InvoiceItem>,
    /// Invoice number as printed, marked when cancelled
    pub display_number: String,
}

/// Invoice report structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceReport {
    pub filter: InvoiceFilter,
    pub rows: Vec<InvoiceReportRow>,
    pub total_taxable_value: BigDecimal,
    pub total_gst: BigDecimal,
    pub total_grand_total: BigDecimal,
}

/// Invoice report row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceReportRow {
    pub invoice_id: RecordId,
    pub display_number: String,
    pub invoice_date: chrono::NaiveDate,
    pub buyer_name: String,
    pub taxable_value: BigDecimal,
    pub total_gst: BigDecimal,
    pub grand_total: BigDecimal,
}
