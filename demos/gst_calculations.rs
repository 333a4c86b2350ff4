//! GST calculation examples

use bigdecimal::BigDecimal;
use gst_billing_core::{GstCalculator, GstRate, LineItem, SupplyType};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🧾 GST Billing Core - GST Calculation Examples\n");

    let seller_gstin = "27AAPFU0939F1ZV";

    // 1. Supply type from the GSTIN state codes
    println!("🗺️ Supply Type:");
    for buyer_gstin in [Some("27AABCU9603R1ZM"), Some("29AABCU9603R1ZM"), None] {
        let supply = SupplyType::from_gstins(seller_gstin, buyer_gstin);
        println!(
            "  Seller {} -> buyer {}: {:?}",
            seller_gstin,
            buyer_gstin.unwrap_or("(no GSTIN)"),
            supply
        );
    }
    println!();

    // 2. Rate split
    println!("📊 18% GST Split:");
    let intra = GstRate::intra_state(BigDecimal::from(18));
    let inter = GstRate::inter_state(BigDecimal::from(18));
    println!("  Intra-state: CGST {}% + SGST {}%", intra.cgst_rate, intra.sgst_rate);
    println!("  Inter-state: IGST {}%", inter.igst_rate);
    println!();

    // 3. A single line with discount
    println!("🏢 Intra-state Line (CGST + SGST):");
    let intra_calculator = GstCalculator::for_parties(seller_gstin, Some("27AABCU9603R1ZM"));
    let line = LineItem::parse("2", "100", "0", "18")?;
    let tax = intra_calculator.calculate_line(&line)?;
    println!("  Base Amount:    ₹{}", tax.base_amount);
    println!("  Taxable Amount: ₹{}", tax.taxable_amount);
    println!("  CGST:           ₹{}", tax.cgst_amount);
    println!("  SGST:           ₹{}", tax.sgst_amount);
    println!("  Total GST:      ₹{}", tax.gst_amount);
    println!();

    // 4. Multi-rate invoice, inter-state
    println!("🌍 Inter-state Invoice with Different GST Rates:");
    let inter_calculator = GstCalculator::for_parties(seller_gstin, Some("29AABCU9603R1ZM"));
    let lines = vec![
        LineItem::parse("2", "150", "", "0")?,
        LineItem::parse("1", "400", "5", "5")?,
        LineItem::parse("3", "120", "", "12")?,
        LineItem::parse("1", "2000", "10", "18")?,
        // Skipped: zero quantity
        LineItem::parse("0", "999", "", "28")?,
    ];

    for (i, line) in lines.iter().filter(|l| l.is_billable()).enumerate() {
        let tax = inter_calculator.calculate_line(line)?;
        println!(
            "    {}. {} × ₹{} less {}% = ₹{} (IGST {}%: ₹{})",
            i + 1,
            line.quantity,
            line.rate,
            line.discount_percent,
            tax.taxable_amount,
            line.gst_rate,
            tax.igst_amount
        );
    }

    let totals = inter_calculator.calculate_invoice(&lines, BigDecimal::from(75))?;
    println!();
    println!("  Invoice Summary:");
    println!("    Subtotal:       ₹{}", totals.subtotal);
    println!("    Discount:       ₹{}", totals.total_discount);
    println!("    Taxable Value:  ₹{}", totals.taxable_value);
    println!("    Total IGST:     ₹{}", totals.total_igst);
    println!("    Freight:        ₹{}", totals.freight);
    println!("    Round Off:      ₹{}", totals.round_off);
    println!("    Grand Total:    ₹{}", totals.grand_total);
    println!();

    // 5. Input validation
    println!("✅ Line Input Validation:");
    for (qty, rate, discount) in [("2", "abc", "0"), ("2", "100", "120"), ("2", "-5", "0")] {
        match LineItem::parse(qty, rate, discount, "18") {
            Ok(_) => println!("  ✓ qty {} rate {} discount {}", qty, rate, discount),
            Err(e) => println!("  ❌ qty {} rate {} discount {}: {}", qty, rate, discount, e),
        }
    }

    println!("\n🎉 GST calculation examples completed successfully!");
    Ok(())
}
