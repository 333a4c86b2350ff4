//! End-to-end billing workflow on the in-memory backend

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use gst_billing_core::{
    Billing, BillingError, BuyerInput, DraftItem, InvoiceFilter, MemoryStorage, NewProduct,
    NewPurchase, NewPurchasePayment, NewVendor, ProductUpdate, Settings, StockPolicy,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("🧾 GST Billing Core - Billing Workflow\n");

    let mut settings = Settings::default();
    settings.company_info.name = "Shree Ganesh Traders".to_string();
    settings.company_info.gstin = "27AAPFU0939F1ZV".to_string();

    let mut billing = Billing::new(MemoryStorage::new(), settings);
    let date = NaiveDate::from_ymd_opt(2024, 4, 1).ok_or("invalid date")?;

    // 1. Product master
    println!("📦 Creating products...");
    let bucket = billing
        .create_product(NewProduct {
            name: "Steel Bucket".to_string(),
            hsn: Some("7323".to_string()),
            gst_rate: BigDecimal::from(18),
            rate: BigDecimal::from(80),
            selling_price: BigDecimal::from(100),
            stock_qty: BigDecimal::from(12),
            unit: Some("pcs".to_string()),
        })
        .await?;
    println!("  ✓ {} ({} in stock)", bucket.name, bucket.stock_qty);

    // 2. Invoice
    println!("\n🧾 Issuing an invoice...");
    let mut buyer = BuyerInput::named("Anand Stores");
    buyer.address = Some("FC Road, Pune".to_string());
    buyer.state = Some("Maharashtra".to_string());

    let draft = billing
        .new_invoice(date, buyer)
        .await?
        .with_item(DraftItem::from_product(&bucket, BigDecimal::from(3)));
    let preview = draft.compute_totals(billing.settings())?;
    println!(
        "  {}: taxable ₹{}, GST ₹{}, total ₹{}",
        draft.invoice_no, preview.taxable_value, preview.total_gst, preview.grand_total
    );
    let invoice_id = billing.save_invoice(&draft, StockPolicy::Enforce).await?;

    // 3. Oversell warning
    println!("\n⚠️ Checking stock before a large order...");
    let big_order = billing
        .new_invoice(date, BuyerInput::named("Anand Stores"))
        .await?
        .with_item(DraftItem::from_product(&bucket, BigDecimal::from(50)));
    for shortfall in billing.stock_shortfalls(&big_order).await? {
        println!(
            "  {}: available {}, requested {}",
            shortfall.product_name, shortfall.available, shortfall.requested
        );
    }
    match billing.save_invoice(&big_order, StockPolicy::Enforce).await {
        Err(BillingError::Validation(msg)) => println!("  ❌ Refused: {}", msg),
        other => println!("  Unexpected: {:?}", other),
    }

    // 4. Re-issue
    println!("\n🔁 Re-issuing the first invoice...");
    let replacement = billing.reissue_invoice(invoice_id).await?;
    println!("  Replacement draft {}", replacement.invoice_no);
    billing
        .save_invoice(&replacement, StockPolicy::Enforce)
        .await?;

    let report = billing
        .invoice_report(&InvoiceFilter::new(date, date))
        .await?;
    for row in &report.rows {
        println!("  {} {} ₹{}", row.display_number, row.buyer_name, row.grand_total);
    }
    println!("  Total billed: ₹{}", report.total_grand_total);

    // 5. Restock and purchases
    println!("\n🚚 Restocking from a vendor...");
    let vendor = billing
        .create_vendor(NewVendor {
            name: "Sri Balaji Traders".to_string(),
            ..Default::default()
        })
        .await?;
    let update = ProductUpdate::from_product(&bucket)
        .with_stock(BigDecimal::from(20), BigDecimal::from(86));
    let bucket = billing.update_product(bucket.id, update).await?;
    println!(
        "  ✓ {} now {} in stock at average cost ₹{}",
        bucket.name, bucket.stock_qty, bucket.rate
    );

    let purchase_id = billing
        .record_purchase(
            NewPurchase {
                vendor_id: vendor.id,
                bill_no: "SBT/118".to_string(),
                purchase_date: date,
                total_amount: BigDecimal::from(1720),
                notes: None,
            },
            BigDecimal::from(720),
        )
        .await?;
    let purchase = billing
        .pay_purchase(
            purchase_id,
            NewPurchasePayment {
                payment_date: date,
                amount: BigDecimal::from(1000),
                payment_mode: "UPI".to_string(),
                reference_no: "UTR-0042".to_string(),
            },
        )
        .await?;
    println!(
        "  Bill {}: paid ₹{} of ₹{} ({})",
        purchase.bill_no, purchase.amount_paid, purchase.total_amount, purchase.payment_status
    );

    let summary = billing.summary().await?;
    println!(
        "\n📊 {} products ({} low), {} buyers, {} vendors, ₹{} payable",
        summary.product_count,
        summary.low_stock_count,
        summary.buyer_count,
        summary.vendor_count,
        summary.payables_outstanding
    );

    println!("\n🎉 Billing workflow completed successfully!");
    Ok(())
}
