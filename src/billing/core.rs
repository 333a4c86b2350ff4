//! Billing system orchestrator wiring every manager to one storage backend

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::billing::draft::{BuyerInput, InvoiceDraft};
use crate::billing::invoice::{InvoiceManager, StockPolicy, StockShortfall};
use crate::config::Settings;
use crate::inventory::catalog::{ProductCatalog, ProductUpdate};
use crate::parties::directory::PartyDirectory;
use crate::purchases::ledger::{PurchaseLedger, PurchaseView};
use crate::traits::*;
use crate::types::*;

/// Figures for the dashboard of the billing application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessSummary {
    pub product_count: usize,
    pub low_stock_count: usize,
    pub buyer_count: usize,
    pub vendor_count: usize,
    /// Sum of what is still owed to vendors
    pub payables_outstanding: BigDecimal,
}

/// Main billing system that orchestrates sales, stock and purchases
pub struct Billing<S: BillingStorage> {
    invoices: InvoiceManager<S>,
    catalog: ProductCatalog<S>,
    parties: PartyDirectory<S>,
    purchases: PurchaseLedger<S>,
}

impl<S: BillingStorage + Clone> Billing<S> {
    /// Create a billing system on the given storage backend
    pub fn new(storage: S, settings: Settings) -> Self {
        Self {
            invoices: InvoiceManager::new(storage.clone(), settings),
            catalog: ProductCatalog::new(storage.clone()),
            parties: PartyDirectory::new(storage.clone()),
            purchases: PurchaseLedger::new(storage),
        }
    }

    /// Create a billing system with a custom invoice validator
    pub fn with_validator(
        storage: S,
        settings: Settings,
        validator: Box<dyn InvoiceValidator>,
    ) -> Self {
        Self {
            invoices: InvoiceManager::with_validator(storage.clone(), settings, validator),
            catalog: ProductCatalog::new(storage.clone()),
            parties: PartyDirectory::new(storage.clone()),
            purchases: PurchaseLedger::new(storage),
        }
    }

    pub fn settings(&self) -> &Settings {
        self.invoices.settings()
    }

    /// Use freshly saved settings for everything issued from now on
    pub fn reload_settings(&mut self, settings: Settings) {
        info!("Reloaded settings for '{}'", settings.company_info.name);
        self.invoices.reload_settings(settings);
    }

    pub fn invoices(&self) -> &InvoiceManager<S> {
        &self.invoices
    }

    pub fn invoices_mut(&mut self) -> &mut InvoiceManager<S> {
        &mut self.invoices
    }

    pub fn catalog(&self) -> &ProductCatalog<S> {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut ProductCatalog<S> {
        &mut self.catalog
    }

    pub fn parties(&self) -> &PartyDirectory<S> {
        &self.parties
    }

    pub fn parties_mut(&mut self) -> &mut PartyDirectory<S> {
        &mut self.parties
    }

    pub fn purchases(&self) -> &PurchaseLedger<S> {
        &self.purchases
    }

    pub fn purchases_mut(&mut self) -> &mut PurchaseLedger<S> {
        &mut self.purchases
    }

    // Master data
    pub async fn create_product(&mut self, product: NewProduct) -> BillingResult<Product> {
        self.catalog.create_product(product).await
    }

    pub async fn update_product(
        &mut self,
        product_id: RecordId,
        update: ProductUpdate,
    ) -> BillingResult<Product> {
        self.catalog.update_product(product_id, update).await
    }

    pub async fn create_buyer(&mut self, buyer: NewBuyer) -> BillingResult<Buyer> {
        self.parties.create_buyer(buyer).await
    }

    pub async fn create_vendor(&mut self, vendor: NewVendor) -> BillingResult<Vendor> {
        self.parties.create_vendor(vendor).await
    }

    // Sales
    /// Empty draft with the next invoice number
    pub async fn new_invoice(
        &self,
        invoice_date: NaiveDate,
        buyer: BuyerInput,
    ) -> BillingResult<InvoiceDraft> {
        self.invoices.new_draft(invoice_date, buyer).await
    }

    pub async fn stock_shortfalls(&self, draft: &InvoiceDraft) -> BillingResult<Vec<StockShortfall>> {
        self.invoices.stock_shortfalls(draft).await
    }

    pub async fn save_invoice(
        &mut self,
        draft: &InvoiceDraft,
        policy: StockPolicy,
    ) -> BillingResult<RecordId> {
        self.invoices.save(draft, policy).await
    }

    pub async fn cancel_invoice(&mut self, invoice_id: RecordId) -> BillingResult<Invoice> {
        self.invoices.cancel(invoice_id).await
    }

    pub async fn reissue_invoice(&mut self, invoice_id: RecordId) -> BillingResult<InvoiceDraft> {
        self.invoices.reissue(invoice_id).await
    }

    pub async fn replace_invoice(
        &mut self,
        invoice_id: RecordId,
        replacement: &InvoiceDraft,
        policy: StockPolicy,
    ) -> BillingResult<RecordId> {
        self.invoices.replace(invoice_id, replacement, policy).await
    }

    pub async fn invoice_document(&self, invoice_id: RecordId) -> BillingResult<InvoiceDocument> {
        self.invoices.get_full_invoice(invoice_id).await
    }

    pub async fn invoice_report(&self, filter: &InvoiceFilter) -> BillingResult<InvoiceReport> {
        self.invoices.report(filter).await
    }

    // Purchases
    pub async fn record_purchase(
        &mut self,
        purchase: NewPurchase,
        amount_paid: BigDecimal,
    ) -> BillingResult<RecordId> {
        self.purchases.record_purchase(purchase, amount_paid).await
    }

    pub async fn pay_purchase(
        &mut self,
        purchase_id: RecordId,
        payment: NewPurchasePayment,
    ) -> BillingResult<Purchase> {
        self.purchases.pay_due(purchase_id, payment).await
    }

    pub async fn list_purchases(&self) -> BillingResult<Vec<PurchaseView>> {
        self.purchases.list_purchases().await
    }

    // Reports
    /// Headline figures across the whole business
    pub async fn summary(&self) -> BillingResult<BusinessSummary> {
        let products = self.catalog.list_products().await?;
        let low_stock_count = products.iter().filter(|p| p.is_low_stock()).count();

        Ok(BusinessSummary {
            product_count: products.len(),
            low_stock_count,
            buyer_count: self.parties.list_buyers().await?.len(),
            vendor_count: self.parties.list_vendors().await?.len(),
            payables_outstanding: self.purchases.outstanding_total().await?,
        })
    }
}
