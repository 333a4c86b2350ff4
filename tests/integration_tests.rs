//! Integration tests for the billing core, run against every storage backend

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use gst_billing_core::*;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const SELLER_GSTIN: &str = "27AAPFU0939F1ZV";

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, day).unwrap()
}

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.company_info.name = "Shree Ganesh Traders".to_string();
    settings.company_info.gstin = SELLER_GSTIN.to_string();
    settings
}

fn new_buyer(name: &str, gstin: Option<&str>) -> BuyerInput {
    BuyerInput {
        name: name.to_string(),
        gstin: gstin.map(str::to_string),
        address: Some("Main Road".to_string()),
        state: Some("Maharashtra".to_string()),
    }
}

async fn product<S: BillingStorage + Clone>(
    billing: &mut Billing<S>,
    name: &str,
    stock: i64,
) -> Product {
    billing
        .create_product(NewProduct {
            name: name.to_string(),
            hsn: Some("7323".to_string()),
            gst_rate: BigDecimal::from(18),
            rate: BigDecimal::from(80),
            selling_price: BigDecimal::from(100),
            stock_qty: BigDecimal::from(stock),
            unit: Some("pcs".to_string()),
        })
        .await
        .unwrap()
}

async fn sell<S: BillingStorage + Clone>(
    billing: &mut Billing<S>,
    buyer: BuyerInput,
    product: &Product,
    quantity: i64,
    day: u32,
) -> RecordId {
    let draft = billing
        .new_invoice(date(day), buyer)
        .await
        .unwrap()
        .with_item(DraftItem::from_product(product, BigDecimal::from(quantity)));
    billing
        .save_invoice(&draft, StockPolicy::Enforce)
        .await
        .unwrap()
}

async fn stock_of<S: BillingStorage + Clone>(billing: &Billing<S>, product_id: RecordId) -> BigDecimal {
    billing
        .catalog()
        .get_product_required(product_id)
        .await
        .unwrap()
        .stock_qty
}

macro_rules! on_every_backend {
    ($name:ident) => {
        mod $name {
            use super::*;

            #[tokio::test]
            async fn memory() {
                super::$name(MemoryStorage::new()).await;
            }

            #[cfg(feature = "sqlite")]
            #[tokio::test]
            async fn sqlite() {
                super::$name(SqliteStorage::new_in_memory().await.unwrap()).await;
            }
        }
    };
}

async fn oversold_intra_state_sale<S: BillingStorage + Clone>(storage: S) {
    let mut billing = Billing::new(storage, settings());
    let bucket = product(&mut billing, "Steel Bucket", 0).await;

    let draft = billing
        .new_invoice(date(1), new_buyer("Anand Stores", None))
        .await
        .unwrap()
        .with_item(DraftItem::from_product(&bucket, BigDecimal::from(2)));
    assert_eq!(draft.invoice_no, "INV-0001");

    let shortfalls = billing.stock_shortfalls(&draft).await.unwrap();
    assert_eq!(shortfalls.len(), 1);
    assert_eq!(shortfalls[0].requested, BigDecimal::from(2));

    let refused = billing.save_invoice(&draft, StockPolicy::Enforce).await;
    assert!(matches!(refused, Err(BillingError::Validation(_))));
    assert!(billing.parties().list_buyers().await.unwrap().is_empty());

    let invoice_id = billing
        .save_invoice(&draft, StockPolicy::AllowNegative)
        .await
        .unwrap();

    let invoice = billing
        .invoices()
        .get_invoice_required(invoice_id)
        .await
        .unwrap();
    assert_eq!(invoice.totals.subtotal, BigDecimal::from(200));
    assert_eq!(invoice.totals.taxable_value, BigDecimal::from(200));
    assert_eq!(invoice.totals.total_cgst, BigDecimal::from(18));
    assert_eq!(invoice.totals.total_sgst, BigDecimal::from(18));
    assert_eq!(invoice.totals.total_igst, BigDecimal::from(0));
    assert_eq!(invoice.totals.grand_total, BigDecimal::from(236));
    assert_eq!(invoice.totals.round_off, BigDecimal::from(0));

    let items = billing.invoices().get_invoice_items(invoice_id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].amount, BigDecimal::from(200));
    assert_eq!(items[0].description, "Steel Bucket");

    assert_eq!(stock_of(&billing, bucket.id).await, BigDecimal::from(-2));
}
on_every_backend!(oversold_intra_state_sale);

async fn inter_state_sale_with_round_off<S: BillingStorage + Clone>(storage: S) {
    let mut billing = Billing::new(storage, settings());
    let bucket = product(&mut billing, "Steel Bucket", 10).await;

    let draft = billing
        .new_invoice(date(1), new_buyer("Kaveri Mills", Some("29AABCU9603R1ZM")))
        .await
        .unwrap()
        .with_item(
            DraftItem::from_product(&bucket, BigDecimal::from(1))
                .with_rate(dec("244.07"))
                .with_discount(BigDecimal::from(0)),
        );
    let id = billing
        .save_invoice(&draft, StockPolicy::Enforce)
        .await
        .unwrap();

    let totals = billing.invoices().get_invoice_required(id).await.unwrap().totals;
    assert_eq!(totals.total_cgst, BigDecimal::from(0));
    assert_eq!(totals.total_igst, dec("43.9326"));
    assert_eq!(totals.grand_total, BigDecimal::from(288));
    assert_eq!(totals.round_off, dec("-0.0026"));
}
on_every_backend!(inter_state_sale_with_round_off);

async fn cancel_restores_stock_once<S: BillingStorage + Clone>(storage: S) {
    let mut billing = Billing::new(storage, settings());
    let bucket = product(&mut billing, "Steel Bucket", 10).await;
    let invoice_id = sell(&mut billing, new_buyer("Anand Stores", None), &bucket, 2, 1).await;
    assert_eq!(stock_of(&billing, bucket.id).await, BigDecimal::from(8));

    let cancelled = billing.cancel_invoice(invoice_id).await.unwrap();
    assert!(cancelled.is_cancelled());
    assert_eq!(cancelled.invoice_no, "INV-0001");
    assert_eq!(cancelled.display_number(), "[CANCELLED] INV-0001");
    assert_eq!(cancelled.totals.grand_total, BigDecimal::from(0));
    assert_eq!(stock_of(&billing, bucket.id).await, BigDecimal::from(10));

    let again = billing.cancel_invoice(invoice_id).await;
    assert!(matches!(again, Err(BillingError::InvoiceAlreadyCancelled(_))));
    assert_eq!(stock_of(&billing, bucket.id).await, BigDecimal::from(10));

    let missing = billing.cancel_invoice(invoice_id + 100).await;
    assert!(matches!(missing, Err(BillingError::InvoiceNotFound(_))));

    // Lines are kept for audit
    let document = billing.invoice_document(invoice_id).await.unwrap();
    assert_eq!(document.items.len(), 1);
    assert_eq!(document.display_number, "[CANCELLED] INV-0001");
}
on_every_backend!(cancel_restores_stock_once);

async fn numbering_continues_the_series<S: BillingStorage + Clone>(storage: S) {
    let mut billing = Billing::new(storage, settings());
    assert_eq!(billing.invoices().allocate_number().await.unwrap(), "INV-0001");

    let bucket = product(&mut billing, "Steel Bucket", 10).await;
    let mut draft = InvoiceDraft::new("INV-0007", date(1), new_buyer("Anand Stores", None))
        .with_item(DraftItem::from_product(&bucket, BigDecimal::from(1)));
    let id = billing
        .save_invoice(&draft, StockPolicy::Enforce)
        .await
        .unwrap();
    assert_eq!(billing.invoices().allocate_number().await.unwrap(), "INV-0008");

    // Cancelled numbers stay taken
    billing.cancel_invoice(id).await.unwrap();
    assert_eq!(billing.invoices().allocate_number().await.unwrap(), "INV-0008");

    // A number can never be used twice
    draft.buyer = BuyerInput::named("Anand Stores");
    let duplicate = billing.save_invoice(&draft, StockPolicy::Enforce).await;
    assert!(matches!(duplicate, Err(BillingError::Validation(_))));
    assert_eq!(stock_of(&billing, bucket.id).await, BigDecimal::from(10));

    let mut custom = settings();
    custom.invoice_settings.invoice_prefix = "SGT/".to_string();
    billing.reload_settings(custom);
    assert_eq!(billing.invoices().allocate_number().await.unwrap(), "SGT/0001");
}
on_every_backend!(numbering_continues_the_series);

async fn reissue_carries_the_invoice_forward<S: BillingStorage + Clone>(storage: S) {
    let mut billing = Billing::new(storage, settings());
    let bucket = product(&mut billing, "Steel Bucket", 10).await;

    let mut draft = billing
        .new_invoice(date(3), new_buyer("Anand Stores", None))
        .await
        .unwrap()
        .with_item(
            DraftItem::from_product(&bucket, BigDecimal::from(4))
                .with_rate(BigDecimal::from(95))
                .with_discount(BigDecimal::from(10)),
        )
        .with_freight(BigDecimal::from(50))
        .with_payment_mode("Credit");
    draft.order_ref = Some("PO-77".to_string());
    let invoice_id = billing
        .save_invoice(&draft, StockPolicy::Enforce)
        .await
        .unwrap();
    assert_eq!(stock_of(&billing, bucket.id).await, BigDecimal::from(6));

    // The product's GST rate changes before the re-issue
    let mut update = ProductUpdate::from_product(&bucket);
    update.gst_rate = BigDecimal::from(12);
    billing.update_product(bucket.id, update).await.unwrap();

    let replacement = billing.reissue_invoice(invoice_id).await.unwrap();
    assert_eq!(replacement.invoice_no, "INV-0002");
    assert_eq!(replacement.invoice_date, date(3));
    assert_eq!(replacement.payment_mode, "Credit");
    assert_eq!(replacement.order_ref.as_deref(), Some("PO-77"));
    assert_eq!(replacement.freight, BigDecimal::from(50));
    assert_eq!(replacement.buyer.name, "Anand Stores");
    assert_eq!(replacement.items.len(), 1);
    assert_eq!(replacement.items[0].quantity, BigDecimal::from(4));
    assert_eq!(replacement.items[0].rate, BigDecimal::from(95));
    assert_eq!(replacement.items[0].discount_percent, BigDecimal::from(10));
    assert_eq!(replacement.items[0].gst_rate, BigDecimal::from(12));

    let old = billing
        .invoices()
        .get_invoice_required(invoice_id)
        .await
        .unwrap();
    assert!(old.is_cancelled());
    assert_eq!(stock_of(&billing, bucket.id).await, BigDecimal::from(10));

    let new_id = billing
        .save_invoice(&replacement, StockPolicy::Enforce)
        .await
        .unwrap();
    assert_eq!(stock_of(&billing, bucket.id).await, BigDecimal::from(6));

    let again = billing.reissue_invoice(invoice_id).await;
    assert!(matches!(again, Err(BillingError::InvoiceAlreadyCancelled(_))));
    assert_ne!(new_id, invoice_id);
}
on_every_backend!(reissue_carries_the_invoice_forward);

async fn reissue_with_missing_product_changes_nothing<S: BillingStorage + Clone>(storage: S) {
    let mut billing = Billing::new(storage, settings());
    let bucket = product(&mut billing, "Steel Bucket", 10).await;
    let invoice_id = sell(&mut billing, new_buyer("Anand Stores", None), &bucket, 2, 1).await;

    let mut update = ProductUpdate::from_product(&bucket);
    update.name = "Steel Bucket 10L".to_string();
    billing.update_product(bucket.id, update).await.unwrap();

    let result = billing.reissue_invoice(invoice_id).await;
    assert!(matches!(result, Err(BillingError::ProductNotFound(_))));
    assert!(result.unwrap_err().is_retry_safe());

    let invoice = billing
        .invoices()
        .get_invoice_required(invoice_id)
        .await
        .unwrap();
    assert!(!invoice.is_cancelled());
    assert_eq!(stock_of(&billing, bucket.id).await, BigDecimal::from(8));
}
on_every_backend!(reissue_with_missing_product_changes_nothing);

async fn replace_is_all_or_nothing<S: BillingStorage + Clone>(storage: S) {
    let mut billing = Billing::new(storage, settings());
    let bucket = product(&mut billing, "Steel Bucket", 3).await;
    let invoice_id = sell(&mut billing, new_buyer("Anand Stores", None), &bucket, 3, 1).await;
    assert_eq!(stock_of(&billing, bucket.id).await, BigDecimal::from(0));

    let too_many = InvoiceDraft::new("INV-0002", date(2), BuyerInput::named("Anand Stores"))
        .with_item(DraftItem::from_product(&bucket, BigDecimal::from(5)));
    let refused = billing
        .replace_invoice(invoice_id, &too_many, StockPolicy::Enforce)
        .await;
    assert!(matches!(refused, Err(BillingError::Validation(_))));
    let original = billing
        .invoices()
        .get_invoice_required(invoice_id)
        .await
        .unwrap();
    assert!(!original.is_cancelled());
    assert_eq!(stock_of(&billing, bucket.id).await, BigDecimal::from(0));

    // The returned quantity counts towards the replacement
    let fewer = InvoiceDraft::new("INV-0002", date(2), BuyerInput::named("Anand Stores"))
        .with_item(DraftItem::from_product(&bucket, BigDecimal::from(2)));
    let new_id = billing
        .replace_invoice(invoice_id, &fewer, StockPolicy::Enforce)
        .await
        .unwrap();

    let original = billing
        .invoices()
        .get_invoice_required(invoice_id)
        .await
        .unwrap();
    assert!(original.is_cancelled());
    let replacement = billing.invoices().get_invoice_required(new_id).await.unwrap();
    assert_eq!(replacement.invoice_no, "INV-0002");
    assert_eq!(stock_of(&billing, bucket.id).await, BigDecimal::from(1));
}
on_every_backend!(replace_is_all_or_nothing);

async fn failed_storage_write_rolls_back<S: BillingStorage + Clone>(mut storage: S) {
    let product_id = storage
        .insert_product(&NewProduct {
            name: "Steel Bucket".to_string(),
            hsn: None,
            gst_rate: BigDecimal::from(18),
            rate: BigDecimal::from(80),
            selling_price: BigDecimal::from(100),
            stock_qty: BigDecimal::from(10),
            unit: None,
        })
        .await
        .unwrap();
    let buyer_id = storage
        .insert_buyer(&NewBuyer {
            name: "Anand Stores".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let line = |product_id: RecordId| NewInvoiceItem {
        product_id,
        description: "Steel Bucket".to_string(),
        hsn: None,
        gst_rate: BigDecimal::from(18),
        quantity: BigDecimal::from(2),
        rate: BigDecimal::from(100),
        discount_percent: BigDecimal::from(0),
        amount: BigDecimal::from(200),
    };
    let invoice = NewInvoice {
        invoice_no: "INV-0001".to_string(),
        invoice_date: date(1),
        buyer_id,
        payment_mode: "Cash".to_string(),
        order_ref: None,
        dispatch_info: None,
        supply_type: SupplyType::IntraState,
        totals: InvoiceTotals::zero(),
    };

    let result = storage
        .save_invoice(&invoice, &[line(product_id), line(product_id + 99)])
        .await;
    assert!(result.is_err());

    let product = storage.get_product(product_id).await.unwrap().unwrap();
    assert_eq!(product.stock_qty, BigDecimal::from(10));
    assert!(storage
        .invoice_numbers_with_prefix("INV-")
        .await
        .unwrap()
        .is_empty());
}
on_every_backend!(failed_storage_write_rolls_back);

async fn rederived_totals_match_stored<S: BillingStorage + Clone>(storage: S) {
    let mut billing = Billing::new(storage, settings());
    let bucket = product(&mut billing, "Steel Bucket", 50).await;

    let draft = billing
        .new_invoice(date(1), new_buyer("Kaveri Mills", Some("29AABCU9603R1ZM")))
        .await
        .unwrap()
        .with_item(
            DraftItem::from_form(&bucket, "3.5", "101.49", "7.5").unwrap(),
        )
        .with_freight(dec("12.75"));
    let id = billing
        .save_invoice(&draft, StockPolicy::Enforce)
        .await
        .unwrap();

    let stored = billing.invoices().get_invoice_required(id).await.unwrap();
    let rederived = billing.invoices().rederive_totals(id).await.unwrap();
    assert_eq!(rederived, stored.totals);
    assert_eq!(
        billing.invoices().rederive_totals(id).await.unwrap(),
        rederived
    );
    assert_eq!(stock_of(&billing, bucket.id).await, dec("46.5"));
}
on_every_backend!(rederived_totals_match_stored);

async fn master_data_edits_leave_history_alone<S: BillingStorage + Clone>(storage: S) {
    let mut billing = Billing::new(storage, settings());
    let bucket = product(&mut billing, "Steel Bucket", 10).await;
    let id = sell(
        &mut billing,
        new_buyer("Kaveri Mills", Some("29AABCU9603R1ZM")),
        &bucket,
        2,
        1,
    )
    .await;

    let stored = billing.invoices().get_invoice_required(id).await.unwrap();
    assert_eq!(stored.supply_type, SupplyType::InterState);
    assert_eq!(stored.totals.total_igst, BigDecimal::from(36));

    let mut buyer = billing
        .parties()
        .find_buyer("Kaveri Mills")
        .await
        .unwrap()
        .unwrap();
    buyer.gstin = Some("27AABCU9603R1ZM".to_string());
    billing.parties_mut().update_buyer(buyer).await.unwrap();

    let mut moved = settings();
    moved.company_info.gstin = "29AAPFU0939F1ZV".to_string();
    billing.reload_settings(moved);

    let rederived = billing.invoices().rederive_totals(id).await.unwrap();
    assert_eq!(rederived, stored.totals);
    assert_eq!(rederived.total_cgst, BigDecimal::from(0));
    assert_eq!(
        billing.invoices().get_invoice_required(id).await.unwrap().supply_type,
        SupplyType::InterState
    );
}
on_every_backend!(master_data_edits_leave_history_alone);

async fn report_filters_and_marks_cancelled<S: BillingStorage + Clone>(storage: S) {
    let mut billing = Billing::new(storage, settings());
    let bucket = product(&mut billing, "Steel Bucket", 20).await;

    let first = sell(&mut billing, new_buyer("Anand Stores", None), &bucket, 2, 5).await;
    sell(&mut billing, new_buyer("Kaveri Mills", None), &bucket, 1, 2).await;
    sell(&mut billing, BuyerInput::named("Anand Stores"), &bucket, 1, 20).await;

    let april = InvoiceFilter::new(date(1), date(10));
    let report = billing.invoice_report(&april).await.unwrap();
    assert_eq!(report.rows.len(), 2);
    assert_eq!(report.rows[0].invoice_date, date(2));
    assert_eq!(report.rows[0].buyer_name, "Kaveri Mills");
    assert_eq!(report.total_grand_total, BigDecimal::from(354));
    assert_eq!(report.total_taxable_value, BigDecimal::from(300));

    let anand = billing
        .parties()
        .find_buyer("Anand Stores")
        .await
        .unwrap()
        .unwrap();
    let report = billing
        .invoice_report(&InvoiceFilter::new(date(1), date(30)).for_buyer(anand.id))
        .await
        .unwrap();
    assert_eq!(report.rows.len(), 2);

    billing.cancel_invoice(first).await.unwrap();
    let report = billing.invoice_report(&april).await.unwrap();
    assert_eq!(report.rows.len(), 2);
    assert_eq!(report.rows[1].display_number, "[CANCELLED] INV-0001");
    assert_eq!(report.rows[1].grand_total, BigDecimal::from(0));
    assert_eq!(report.total_grand_total, BigDecimal::from(118));
}
on_every_backend!(report_filters_and_marks_cancelled);

async fn new_buyer_needs_address_and_state<S: BillingStorage + Clone>(storage: S) {
    let mut billing = Billing::new(storage, settings());
    let bucket = product(&mut billing, "Steel Bucket", 20).await;

    let draft = billing
        .new_invoice(date(1), BuyerInput::named("Walk-in Customer"))
        .await
        .unwrap()
        .with_item(DraftItem::from_product(&bucket, BigDecimal::from(1)));
    let result = billing.save_invoice(&draft, StockPolicy::Enforce).await;
    assert!(matches!(result, Err(BillingError::Validation(_))));

    assert!(billing.parties().list_buyers().await.unwrap().is_empty());
    assert_eq!(stock_of(&billing, bucket.id).await, BigDecimal::from(20));
}
on_every_backend!(new_buyer_needs_address_and_state);

async fn purchase_payments_settle_the_bill<S: BillingStorage + Clone>(storage: S) {
    let mut billing = Billing::new(storage, settings());
    let vendor = billing
        .create_vendor(NewVendor {
            name: "Sri Balaji Traders".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let purchase_id = billing
        .record_purchase(
            NewPurchase {
                vendor_id: vendor.id,
                bill_no: "SBT/118".to_string(),
                purchase_date: date(1),
                total_amount: BigDecimal::from(500),
                notes: Some("Buckets".to_string()),
            },
            BigDecimal::from(0),
        )
        .await
        .unwrap();

    let payment = |amount: i64| NewPurchasePayment {
        payment_date: date(2),
        amount: BigDecimal::from(amount),
        payment_mode: "UPI".to_string(),
        reference_no: format!("UTR-{}", amount),
    };

    let purchase = billing.pay_purchase(purchase_id, payment(300)).await.unwrap();
    assert_eq!(purchase.payment_status, PaymentStatus::Partial);
    assert_eq!(purchase.due_amount(), BigDecimal::from(200));

    let purchase = billing.pay_purchase(purchase_id, payment(200)).await.unwrap();
    assert_eq!(purchase.amount_paid, BigDecimal::from(500));
    assert_eq!(purchase.payment_status, PaymentStatus::Paid);

    let refused = billing.pay_purchase(purchase_id, payment(1)).await;
    assert!(matches!(refused, Err(BillingError::Validation(_))));

    let history = billing.purchases().payments(purchase_id).await.unwrap();
    assert_eq!(history.len(), 2);

    let views = billing.list_purchases().await.unwrap();
    assert_eq!(views[0].vendor_name, "Sri Balaji Traders");
    assert_eq!(views[0].due_amount, BigDecimal::from(0));

    let in_use = billing.parties_mut().delete_vendor(vendor.id).await;
    assert!(matches!(in_use, Err(BillingError::Validation(_))));
}
on_every_backend!(purchase_payments_settle_the_bill);

async fn restock_and_summary<S: BillingStorage + Clone>(storage: S) {
    let mut billing = Billing::new(storage, settings());
    let bucket = product(&mut billing, "Steel Bucket", 10).await;
    product(&mut billing, "Plastic Mug", 40).await;

    let update = ProductUpdate::from_product(&bucket)
        .with_stock(BigDecimal::from(30), BigDecimal::from(120));
    let bucket = billing.update_product(bucket.id, update).await.unwrap();
    assert_eq!(bucket.stock_qty, BigDecimal::from(40));
    assert_eq!(bucket.rate, BigDecimal::from(110));

    sell(&mut billing, new_buyer("Anand Stores", None), &bucket, 35, 1).await;
    let low = billing.catalog().low_stock_products().await.unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].name, "Steel Bucket");

    let summary = billing.summary().await.unwrap();
    assert_eq!(summary.product_count, 2);
    assert_eq!(summary.low_stock_count, 1);
    assert_eq!(summary.buyer_count, 1);
    assert_eq!(summary.vendor_count, 0);
    assert_eq!(summary.payables_outstanding, BigDecimal::from(0));

    let in_use = billing.catalog_mut().delete_product(bucket.id).await;
    assert!(matches!(in_use, Err(BillingError::Validation(_))));
}
on_every_backend!(restock_and_summary);

#[tokio::test]
async fn test_settings_file_drives_numbering() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    Settings::default().save(&path).unwrap();

    let mut store = SettingsStore::open(&path).unwrap();
    let mut updated = store.settings().clone();
    updated.company_info.gstin = SELLER_GSTIN.to_string();
    updated.invoice_settings.invoice_prefix = "SGT-".to_string();
    store.update(updated).unwrap();

    let reopened = SettingsStore::open(&path).unwrap();
    assert_eq!(reopened.settings().seller_state_code(), "27");

    let billing = Billing::new(MemoryStorage::new(), reopened.settings().clone());
    assert_eq!(
        billing.invoices().allocate_number().await.unwrap(),
        "SGT-0001"
    );
}

#[tokio::test]
async fn test_strict_validator_rejects_bad_gstin() {
    let mut billing = Billing::with_validator(
        MemoryStorage::new(),
        settings(),
        Box::new(EnhancedInvoiceValidator),
    );
    let bucket = product(&mut billing, "Steel Bucket", 10).await;

    let draft = billing
        .new_invoice(date(1), new_buyer("Kaveri Mills", Some("29-BAD")))
        .await
        .unwrap()
        .with_item(DraftItem::from_product(&bucket, BigDecimal::from(1)));
    let result = billing.save_invoice(&draft, StockPolicy::Enforce).await;
    assert!(matches!(result, Err(BillingError::Validation(_))));
}

/// Memory storage whose numbering lookups fail once an invoice has been cancelled
#[derive(Clone, Default)]
struct NumberingFailsAfterCancel {
    inner: MemoryStorage,
    cancelled: Arc<AtomicBool>,
}

#[async_trait]
impl BillingStorage for NumberingFailsAfterCancel {
    async fn insert_product(&mut self, product: &NewProduct) -> BillingResult<RecordId> {
        self.inner.insert_product(product).await
    }

    async fn get_product(&self, product_id: RecordId) -> BillingResult<Option<Product>> {
        self.inner.get_product(product_id).await
    }

    async fn find_product_by_name(&self, name: &str) -> BillingResult<Option<Product>> {
        self.inner.find_product_by_name(name).await
    }

    async fn list_products(&self) -> BillingResult<Vec<Product>> {
        self.inner.list_products().await
    }

    async fn update_product(&mut self, product: &Product) -> BillingResult<()> {
        self.inner.update_product(product).await
    }

    async fn delete_product(&mut self, product_id: RecordId) -> BillingResult<()> {
        self.inner.delete_product(product_id).await
    }

    async fn insert_buyer(&mut self, buyer: &NewBuyer) -> BillingResult<RecordId> {
        self.inner.insert_buyer(buyer).await
    }

    async fn get_buyer(&self, buyer_id: RecordId) -> BillingResult<Option<Buyer>> {
        self.inner.get_buyer(buyer_id).await
    }

    async fn find_buyer_by_name(&self, name: &str) -> BillingResult<Option<Buyer>> {
        self.inner.find_buyer_by_name(name).await
    }

    async fn list_buyers(&self) -> BillingResult<Vec<Buyer>> {
        self.inner.list_buyers().await
    }

    async fn update_buyer(&mut self, buyer: &Buyer) -> BillingResult<()> {
        self.inner.update_buyer(buyer).await
    }

    async fn delete_buyer(&mut self, buyer_id: RecordId) -> BillingResult<()> {
        self.inner.delete_buyer(buyer_id).await
    }

    async fn insert_vendor(&mut self, vendor: &NewVendor) -> BillingResult<RecordId> {
        self.inner.insert_vendor(vendor).await
    }

    async fn get_vendor(&self, vendor_id: RecordId) -> BillingResult<Option<Vendor>> {
        self.inner.get_vendor(vendor_id).await
    }

    async fn find_vendor_by_name(&self, name: &str) -> BillingResult<Option<Vendor>> {
        self.inner.find_vendor_by_name(name).await
    }

    async fn list_vendors(&self) -> BillingResult<Vec<Vendor>> {
        self.inner.list_vendors().await
    }

    async fn update_vendor(&mut self, vendor: &Vendor) -> BillingResult<()> {
        self.inner.update_vendor(vendor).await
    }

    async fn delete_vendor(&mut self, vendor_id: RecordId) -> BillingResult<()> {
        self.inner.delete_vendor(vendor_id).await
    }

    async fn invoice_numbers_with_prefix(&self, prefix: &str) -> BillingResult<Vec<String>> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(BillingError::Storage("database is locked".to_string()));
        }
        self.inner.invoice_numbers_with_prefix(prefix).await
    }

    async fn save_invoice(
        &mut self,
        invoice: &NewInvoice,
        items: &[NewInvoiceItem],
    ) -> BillingResult<RecordId> {
        self.inner.save_invoice(invoice, items).await
    }

    async fn get_invoice(&self, invoice_id: RecordId) -> BillingResult<Option<Invoice>> {
        self.inner.get_invoice(invoice_id).await
    }

    async fn get_invoice_items(&self, invoice_id: RecordId) -> BillingResult<Vec<InvoiceItem>> {
        self.inner.get_invoice_items(invoice_id).await
    }

    async fn cancel_invoice(&mut self, invoice_id: RecordId) -> BillingResult<Invoice> {
        let invoice = self.inner.cancel_invoice(invoice_id).await?;
        self.cancelled.store(true, Ordering::SeqCst);
        Ok(invoice)
    }

    async fn replace_invoice(
        &mut self,
        cancelled_id: RecordId,
        replacement: &NewInvoice,
        items: &[NewInvoiceItem],
    ) -> BillingResult<RecordId> {
        self.inner
            .replace_invoice(cancelled_id, replacement, items)
            .await
    }

    async fn list_invoices(&self, filter: &InvoiceFilter) -> BillingResult<Vec<Invoice>> {
        self.inner.list_invoices(filter).await
    }

    async fn save_purchase(
        &mut self,
        purchase: &NewPurchase,
        initial_payment: Option<&NewPurchasePayment>,
    ) -> BillingResult<RecordId> {
        self.inner.save_purchase(purchase, initial_payment).await
    }

    async fn get_purchase(&self, purchase_id: RecordId) -> BillingResult<Option<Purchase>> {
        self.inner.get_purchase(purchase_id).await
    }

    async fn list_purchases(&self) -> BillingResult<Vec<Purchase>> {
        self.inner.list_purchases().await
    }

    async fn add_purchase_payment(
        &mut self,
        purchase_id: RecordId,
        payment: &NewPurchasePayment,
    ) -> BillingResult<Purchase> {
        self.inner.add_purchase_payment(purchase_id, payment).await
    }

    async fn get_purchase_payments(
        &self,
        purchase_id: RecordId,
    ) -> BillingResult<Vec<PurchasePayment>> {
        self.inner.get_purchase_payments(purchase_id).await
    }
}

#[tokio::test]
async fn test_reissue_reports_a_committed_cancellation() {
    let mut billing = Billing::new(NumberingFailsAfterCancel::default(), settings());
    let bucket = product(&mut billing, "Steel Bucket", 10).await;
    let id = sell(&mut billing, new_buyer("Anand Stores", None), &bucket, 4, 1).await;
    assert_eq!(stock_of(&billing, bucket.id).await, BigDecimal::from(6));

    let err = billing.reissue_invoice(id).await.unwrap_err();
    match &err {
        BillingError::ReissueIncomplete {
            cancelled_invoice_no,
            ..
        } => assert_eq!(cancelled_invoice_no, "INV-0001"),
        other => panic!("expected ReissueIncomplete, got {:?}", other),
    }
    assert!(!err.is_retry_safe());
    assert!(err.user_message().contains("manually"));

    let invoice = billing.invoices().get_invoice_required(id).await.unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Cancelled);
    assert_eq!(invoice.display_number(), "[CANCELLED] INV-0001");
    assert_eq!(stock_of(&billing, bucket.id).await, BigDecimal::from(10));
}
