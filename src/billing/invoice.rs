//! Invoice lifecycle: numbering, saving with stock deduction, cancellation and re-issue

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::billing::draft::{BuyerInput, DraftItem, InvoiceDraft};
use crate::billing::numbering::next_invoice_number;
use crate::config::Settings;
use crate::tax::gst::{InvoiceTotals, LineItem, SupplyType};
use crate::traits::*;
use crate::types::*;

/// What to do when a draft sells more than is in stock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockPolicy {
    /// Refuse to save while any shortfall exists
    #[default]
    Enforce,
    /// The operator confirmed the warning; stock may go negative
    AllowNegative,
}

/// A product the draft asks for more of than is available
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockShortfall {
    pub product_id: RecordId,
    pub product_name: String,
    pub available: BigDecimal,
    pub requested: BigDecimal,
}

enum ResolvedBuyer {
    Existing(Buyer),
    New(NewBuyer),
}

impl ResolvedBuyer {
    fn gstin(&self) -> Option<&str> {
        match self {
            ResolvedBuyer::Existing(buyer) => buyer.gstin.as_deref(),
            ResolvedBuyer::New(buyer) => buyer.gstin.as_deref(),
        }
    }
}

/// Invoice manager for handling the invoice lifecycle
pub struct InvoiceManager<S: BillingStorage> {
    storage: S,
    settings: Settings,
    validator: Box<dyn InvoiceValidator>,
}

impl<S: BillingStorage> InvoiceManager<S> {
    /// Create a new invoice manager
    pub fn new(storage: S, settings: Settings) -> Self {
        Self {
            storage,
            settings,
            validator: Box::new(DefaultInvoiceValidator),
        }
    }

    /// Create a new invoice manager with custom validator
    pub fn with_validator(
        storage: S,
        settings: Settings,
        validator: Box<dyn InvoiceValidator>,
    ) -> Self {
        Self {
            storage,
            settings,
            validator,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Swap in freshly saved settings
    pub fn reload_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Next free number in the configured series
    pub async fn allocate_number(&self) -> BillingResult<String> {
        let prefix = self.settings.invoice_prefix().to_string();
        self.allocate_number_with_prefix(&prefix).await
    }

    /// Next free number in the `prefix` series
    pub async fn allocate_number_with_prefix(&self, prefix: &str) -> BillingResult<String> {
        let existing = self.storage.invoice_numbers_with_prefix(prefix).await?;
        let number = next_invoice_number(prefix, existing.iter().map(String::as_str));
        debug!("Allocated invoice number {}", number);
        Ok(number)
    }

    /// Empty draft carrying a freshly allocated number
    pub async fn new_draft(
        &self,
        invoice_date: chrono::NaiveDate,
        buyer: BuyerInput,
    ) -> BillingResult<InvoiceDraft> {
        let invoice_no = self.allocate_number().await?;
        Ok(InvoiceDraft::new(invoice_no, invoice_date, buyer))
    }

    /// Products the draft would oversell, one entry per product
    pub async fn stock_shortfalls(&self, draft: &InvoiceDraft) -> BillingResult<Vec<StockShortfall>> {
        self.shortfalls_with_credit(draft, &HashMap::new()).await
    }

    async fn shortfalls_with_credit(
        &self,
        draft: &InvoiceDraft,
        credit: &HashMap<RecordId, BigDecimal>,
    ) -> BillingResult<Vec<StockShortfall>> {
        let mut requested: BTreeMap<RecordId, BigDecimal> = BTreeMap::new();
        for item in draft.billable_items() {
            *requested
                .entry(item.product_id)
                .or_insert_with(|| BigDecimal::from(0)) += &item.quantity;
        }

        let mut shortfalls = Vec::new();
        for (product_id, quantity) in requested {
            let product = self
                .storage
                .get_product(product_id)
                .await?
                .ok_or_else(|| BillingError::ProductNotFound(product_id.to_string()))?;

            let mut available = product.stock_qty.clone();
            if let Some(returned) = credit.get(&product_id) {
                available += returned;
            }

            if available < quantity {
                shortfalls.push(StockShortfall {
                    product_id,
                    product_name: product.name,
                    available,
                    requested: quantity,
                });
            }
        }
        Ok(shortfalls)
    }

    /// Validate a draft, resolve its buyer and freeze its figures.
    ///
    /// A new buyer is only written once everything else has been checked.
    async fn prepare(
        &mut self,
        draft: &InvoiceDraft,
        policy: StockPolicy,
        credit: &HashMap<RecordId, BigDecimal>,
    ) -> BillingResult<(NewInvoice, Vec<NewInvoiceItem>)> {
        self.validator.validate_draft(draft)?;

        let shortfalls = self.shortfalls_with_credit(draft, credit).await?;
        if !shortfalls.is_empty() {
            for shortfall in &shortfalls {
                warn!(
                    "Not enough stock for '{}': available {}, required {}",
                    shortfall.product_name, shortfall.available, shortfall.requested
                );
            }
            if policy == StockPolicy::Enforce {
                let names: Vec<&str> = shortfalls
                    .iter()
                    .map(|s| s.product_name.as_str())
                    .collect();
                return Err(BillingError::Validation(format!(
                    "Not enough stock for: {}",
                    names.join(", ")
                )));
            }
        }

        let buyer = match self
            .storage
            .find_buyer_by_name(draft.buyer.name.trim())
            .await?
        {
            Some(buyer) => ResolvedBuyer::Existing(buyer),
            None => {
                let new_buyer = draft.buyer.to_new_buyer();
                if new_buyer.address.is_none() || new_buyer.state.is_none() {
                    return Err(BillingError::Validation(
                        "For a new buyer, please fill in address and state".to_string(),
                    ));
                }
                ResolvedBuyer::New(new_buyer)
            }
        };

        let supply = SupplyType::from_gstins(self.settings.seller_gstin(), buyer.gstin());
        let items = draft.new_items(supply)?;
        let lines: Vec<LineItem> = draft.items.iter().map(DraftItem::line_item).collect();
        let totals = InvoiceTotals::compute(&lines, supply, draft.freight.clone())?;

        let buyer_id = match buyer {
            ResolvedBuyer::Existing(buyer) => buyer.id,
            ResolvedBuyer::New(new_buyer) => {
                let id = self.storage.insert_buyer(&new_buyer).await?;
                info!("Created buyer '{}' ({})", new_buyer.name, id);
                id
            }
        };

        let invoice = NewInvoice {
            invoice_no: draft.invoice_no.trim().to_string(),
            invoice_date: draft.invoice_date,
            buyer_id,
            payment_mode: draft.payment_mode.clone(),
            order_ref: draft.order_ref.clone(),
            dispatch_info: draft.dispatch_info.clone(),
            supply_type: supply,
            totals,
        };
        Ok((invoice, items))
    }

    /// Save a draft: insert the invoice and its lines and deduct stock, atomically
    pub async fn save(&mut self, draft: &InvoiceDraft, policy: StockPolicy) -> BillingResult<RecordId> {
        let (invoice, items) = self.prepare(draft, policy, &HashMap::new()).await?;

        let invoice_id = self
            .storage
            .save_invoice(&invoice, &items)
            .await
            .inspect_err(|e| warn!("Failed to save invoice {}: {}", invoice.invoice_no, e))?;

        info!(
            "Saved invoice {} ({}) with {} items, grand total {}",
            invoice.invoice_no,
            invoice_id,
            items.len(),
            invoice.totals.grand_total
        );
        Ok(invoice_id)
    }

    /// Cancel a saved invoice: restore its stock and zero its payable totals.
    ///
    /// The lines are kept for audit. Cancelling twice fails without touching anything.
    pub async fn cancel(&mut self, invoice_id: RecordId) -> BillingResult<Invoice> {
        let invoice = self
            .storage
            .cancel_invoice(invoice_id)
            .await
            .inspect_err(|e| warn!("Failed to cancel invoice {}: {}", invoice_id, e))?;

        info!("Cancelled invoice {}", invoice.invoice_no);
        Ok(invoice)
    }

    /// Cancel an invoice and hand back a draft to issue in its place.
    ///
    /// The draft keeps the old header, quantities, rates and discounts; HSN,
    /// GST rate and unit come from the current product records, matched by
    /// name. All lookups happen before the cancellation is written. Only the
    /// new number is allocated afterwards; if that fails the cancellation
    /// stands and `ReissueIncomplete` is returned.
    pub async fn reissue(&mut self, invoice_id: RecordId) -> BillingResult<InvoiceDraft> {
        let invoice = self.get_invoice_required(invoice_id).await?;
        if invoice.is_cancelled() {
            return Err(BillingError::InvoiceAlreadyCancelled(invoice.invoice_no));
        }

        let buyer = self
            .storage
            .get_buyer(invoice.buyer_id)
            .await?
            .ok_or_else(|| BillingError::BuyerNotFound(invoice.buyer_id.to_string()))?;

        let mut items = Vec::new();
        for old in self.storage.get_invoice_items(invoice_id).await? {
            let product = self
                .storage
                .find_product_by_name(&old.description)
                .await?
                .ok_or_else(|| BillingError::ProductNotFound(old.description.clone()))?;
            items.push(
                DraftItem::from_product(&product, old.quantity)
                    .with_rate(old.rate)
                    .with_discount(old.discount_percent),
            );
        }

        let cancelled = self.cancel(invoice_id).await?;

        let invoice_no = match self.allocate_number().await {
            Ok(number) => number,
            Err(e) => {
                warn!(
                    "Invoice {} cancelled but no replacement number could be allocated: {}",
                    cancelled.invoice_no, e
                );
                return Err(BillingError::ReissueIncomplete {
                    cancelled_invoice_no: cancelled.invoice_no,
                    reason: e.to_string(),
                });
            }
        };

        Ok(InvoiceDraft {
            invoice_no,
            invoice_date: invoice.invoice_date,
            buyer: BuyerInput::from_buyer(&buyer),
            payment_mode: invoice.payment_mode,
            order_ref: invoice.order_ref,
            dispatch_info: invoice.dispatch_info,
            freight: invoice.totals.freight,
            items,
        })
    }

    /// Cancel `invoice_id` and save `replacement` in its place as one transaction.
    ///
    /// Stock check counts the quantities the cancellation gives back.
    pub async fn replace(
        &mut self,
        invoice_id: RecordId,
        replacement: &InvoiceDraft,
        policy: StockPolicy,
    ) -> BillingResult<RecordId> {
        let old = self.get_invoice_required(invoice_id).await?;
        if old.is_cancelled() {
            return Err(BillingError::InvoiceAlreadyCancelled(old.invoice_no));
        }

        let mut credit: HashMap<RecordId, BigDecimal> = HashMap::new();
        for item in self.storage.get_invoice_items(invoice_id).await? {
            *credit
                .entry(item.product_id)
                .or_insert_with(|| BigDecimal::from(0)) += &item.quantity;
        }

        let (invoice, items) = self.prepare(replacement, policy, &credit).await?;
        let new_id = self
            .storage
            .replace_invoice(invoice_id, &invoice, &items)
            .await
            .inspect_err(|e| warn!("Failed to replace invoice {}: {}", old.invoice_no, e))?;

        info!(
            "Replaced invoice {} with {} ({})",
            old.invoice_no, invoice.invoice_no, new_id
        );
        Ok(new_id)
    }

    pub async fn get_invoice(&self, invoice_id: RecordId) -> BillingResult<Option<Invoice>> {
        self.storage.get_invoice(invoice_id).await
    }

    /// Get an invoice by ID, returning an error if not found
    pub async fn get_invoice_required(&self, invoice_id: RecordId) -> BillingResult<Invoice> {
        self.storage
            .get_invoice(invoice_id)
            .await?
            .ok_or(BillingError::InvoiceNotFound(invoice_id))
    }

    pub async fn get_invoice_items(&self, invoice_id: RecordId) -> BillingResult<Vec<InvoiceItem>> {
        self.storage.get_invoice_items(invoice_id).await
    }

    /// Header, buyer and lines of an invoice, as handed to a renderer
    pub async fn get_full_invoice(&self, invoice_id: RecordId) -> BillingResult<InvoiceDocument> {
        let invoice = self.get_invoice_required(invoice_id).await?;
        let buyer = self
            .storage
            .get_buyer(invoice.buyer_id)
            .await?
            .ok_or_else(|| BillingError::BuyerNotFound(invoice.buyer_id.to_string()))?;
        let items = self.storage.get_invoice_items(invoice_id).await?;

        Ok(InvoiceDocument {
            display_number: invoice.display_number(),
            invoice,
            buyer,
            items,
        })
    }

    /// Recompute an invoice's breakdown from its stored lines.
    ///
    /// Uses the supply type stored with the invoice, so later edits to the
    /// buyer or the company GSTIN do not change the split. For an active
    /// invoice this reproduces the stored totals exactly; for a cancelled one
    /// it gives the figures it had before cancellation.
    pub async fn rederive_totals(&self, invoice_id: RecordId) -> BillingResult<InvoiceTotals> {
        let invoice = self.get_invoice_required(invoice_id).await?;
        let items = self.storage.get_invoice_items(invoice_id).await?;
        let lines: Vec<LineItem> = items.iter().map(InvoiceItem::line_item).collect();
        Ok(InvoiceTotals::compute(
            &lines,
            invoice.supply_type,
            invoice.totals.freight.clone(),
        )?)
    }

    /// Render an invoice through `renderer`
    pub async fn render<R: DocumentRenderer>(
        &self,
        invoice_id: RecordId,
        renderer: &R,
    ) -> BillingResult<R::Output> {
        let document = self.get_full_invoice(invoice_id).await?;
        renderer.render_invoice(&document, &self.settings)
    }

    pub async fn list_invoices(&self, filter: &InvoiceFilter) -> BillingResult<Vec<Invoice>> {
        self.storage.list_invoices(filter).await
    }

    /// Summary of the invoices matching `filter`
    pub async fn report(&self, filter: &InvoiceFilter) -> BillingResult<InvoiceReport> {
        let invoices = self.storage.list_invoices(filter).await?;

        let mut buyer_names: HashMap<RecordId, String> = HashMap::new();
        let mut rows = Vec::with_capacity(invoices.len());
        for invoice in invoices {
            if !buyer_names.contains_key(&invoice.buyer_id) {
                let name = self
                    .storage
                    .get_buyer(invoice.buyer_id)
                    .await?
                    .map(|buyer| buyer.name)
                    .unwrap_or_default();
                buyer_names.insert(invoice.buyer_id, name);
            }

            rows.push(InvoiceReportRow {
                invoice_id: invoice.id,
                display_number: invoice.display_number(),
                invoice_date: invoice.invoice_date,
                buyer_name: buyer_names[&invoice.buyer_id].clone(),
                taxable_value: invoice.totals.taxable_value,
                total_gst: invoice.totals.total_gst,
                grand_total: invoice.totals.grand_total,
            });
        }

        let total_taxable_value = rows.iter().map(|row| &row.taxable_value).sum();
        let total_gst = rows.iter().map(|row| &row.total_gst).sum();
        let total_grand_total = rows.iter().map(|row| &row.grand_total).sum();

        Ok(InvoiceReport {
            filter: filter.clone(),
            rows,
            total_taxable_value,
            total_gst,
            total_grand_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStorage;
    use chrono::NaiveDate;

    async fn manager_with_product(stock: i64) -> (InvoiceManager<MemoryStorage>, Product) {
        let mut storage = MemoryStorage::new();
        let new_product = NewProduct {
            name: "Steel Bucket".to_string(),
            hsn: Some("7323".to_string()),
            gst_rate: BigDecimal::from(18),
            rate: BigDecimal::from(80),
            selling_price: BigDecimal::from(100),
            stock_qty: BigDecimal::from(stock),
            unit: Some("pcs".to_string()),
        };
        let id = storage.insert_product(&new_product).await.unwrap();

        let mut settings = Settings::default();
        settings.company_info.gstin = "27AAPFU0939F1ZV".to_string();
        (
            InvoiceManager::new(storage, settings),
            new_product.into_product(id),
        )
    }

    fn draft() -> InvoiceDraft {
        let mut buyer = BuyerInput::named("Anand Stores");
        buyer.address = Some("Pune".to_string());
        buyer.state = Some("Maharashtra".to_string());
        InvoiceDraft::new(
            "INV-0001",
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            buyer,
        )
    }

    #[tokio::test]
    async fn test_shortfalls_are_aggregated_per_product() {
        let (manager, bucket) = manager_with_product(5).await;

        // Each line fits on its own; together they do not
        let draft = draft()
            .with_item(DraftItem::from_product(&bucket, BigDecimal::from(3)))
            .with_item(DraftItem::from_product(&bucket, BigDecimal::from(3)));

        let shortfalls = manager.stock_shortfalls(&draft).await.unwrap();
        assert_eq!(shortfalls.len(), 1);
        assert_eq!(shortfalls[0].available, BigDecimal::from(5));
        assert_eq!(shortfalls[0].requested, BigDecimal::from(6));
    }

    #[tokio::test]
    async fn test_zero_quantity_lines_are_not_saved() {
        let (mut manager, bucket) = manager_with_product(5).await;
        let draft = draft()
            .with_item(DraftItem::from_product(&bucket, BigDecimal::from(0)))
            .with_item(DraftItem::from_product(&bucket, BigDecimal::from(2)));

        let id = manager.save(&draft, StockPolicy::Enforce).await.unwrap();
        let items = manager.get_invoice_items(id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, BigDecimal::from(2));
    }

    #[tokio::test]
    async fn test_unknown_product_is_reported() {
        let (mut manager, bucket) = manager_with_product(5).await;
        let mut item = DraftItem::from_product(&bucket, BigDecimal::from(1));
        item.product_id = 404;

        let result = manager.save(&draft().with_item(item), StockPolicy::Enforce).await;
        assert!(matches!(result, Err(BillingError::ProductNotFound(_))));
    }

    struct PlainTextRenderer;

    impl DocumentRenderer for PlainTextRenderer {
        type Output = String;

        fn render_invoice(
            &self,
            document: &InvoiceDocument,
            settings: &Settings,
        ) -> BillingResult<String> {
            Ok(format!(
                "{} | {} | {} | {}",
                settings.company_info.gstin,
                document.display_number,
                document.buyer.name.to_uppercase(),
                document.invoice.totals.grand_total
            ))
        }
    }

    #[tokio::test]
    async fn test_render_passes_document_and_settings() {
        let (mut manager, bucket) = manager_with_product(5).await;
        let draft = draft().with_item(DraftItem::from_product(&bucket, BigDecimal::from(2)));
        let id = manager.save(&draft, StockPolicy::Enforce).await.unwrap();

        let rendered = manager.render(id, &PlainTextRenderer).await.unwrap();
        assert_eq!(rendered, "27AAPFU0939F1ZV | INV-0001 | ANAND STORES | 236");
    }
}
