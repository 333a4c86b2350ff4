//! Invoice drafts: what the operator is filling in before the invoice is saved

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::tax::gst::{GstError, InvoiceTotals, LineItem, SupplyType};
use crate::types::*;

/// Payment mode preselected on a new draft
pub const DEFAULT_PAYMENT_MODE: &str = "Cash";

/// Buyer as entered on the invoice form
///
/// An existing buyer is matched by name when the invoice is saved; anything
/// else becomes a new buyer record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerInput {
    pub name: String,
    pub gstin: Option<String>,
    pub address: Option<String>,
    pub state: Option<String>,
}

impl BuyerInput {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_buyer(buyer: &Buyer) -> Self {
        Self {
            name: buyer.name.clone(),
            gstin: buyer.gstin.clone(),
            address: buyer.address.clone(),
            state: buyer.state.clone(),
        }
    }

    pub(crate) fn to_new_buyer(&self) -> NewBuyer {
        NewBuyer {
            name: self.name.trim().to_string(),
            gstin: non_blank(&self.gstin),
            address: non_blank(&self.address),
            phone: None,
            email: None,
            state: non_blank(&self.state),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// One line of a draft, seeded from the product master
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftItem {
    pub product_id: RecordId,
    pub description: String,
    pub hsn: Option<String>,
    pub unit: Option<String>,
    pub gst_rate: BigDecimal,
    pub quantity: BigDecimal,
    pub rate: BigDecimal,
    pub discount_percent: BigDecimal,
}

impl DraftItem {
    /// Line for `quantity` units of `product` at its selling price, no discount
    pub fn from_product(product: &Product, quantity: BigDecimal) -> Self {
        Self {
            product_id: product.id,
            description: product.name.clone(),
            hsn: product.hsn.clone(),
            unit: product.unit.clone(),
            gst_rate: product.gst_rate.clone(),
            quantity,
            rate: product.selling_price.clone(),
            discount_percent: BigDecimal::from(0),
        }
    }

    /// Line from the raw quantity, rate and discount text of an item row
    pub fn from_form(
        product: &Product,
        quantity: &str,
        rate: &str,
        discount_percent: &str,
    ) -> Result<Self, GstError> {
        let line = LineItem::parse(
            quantity,
            rate,
            discount_percent,
            &product.gst_rate.to_string(),
        )?;
        Ok(Self::from_product(product, line.quantity)
            .with_rate(line.rate)
            .with_discount(line.discount_percent))
    }

    pub fn with_rate(mut self, rate: BigDecimal) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_discount(mut self, discount_percent: BigDecimal) -> Self {
        self.discount_percent = discount_percent;
        self
    }

    pub fn line_item(&self) -> LineItem {
        LineItem::new(
            self.quantity.clone(),
            self.rate.clone(),
            self.discount_percent.clone(),
            self.gst_rate.clone(),
        )
    }

    /// Freeze the line for persistence
    pub(crate) fn to_new_item(&self, supply: SupplyType) -> Result<NewInvoiceItem, GstError> {
        let tax = self.line_item().calculate(supply)?;
        Ok(NewInvoiceItem {
            product_id: self.product_id,
            description: self.description.clone(),
            hsn: self.hsn.clone(),
            gst_rate: self.gst_rate.clone(),
            quantity: self.quantity.clone(),
            rate: self.rate.clone(),
            discount_percent: self.discount_percent.clone(),
            amount: tax.taxable_amount,
        })
    }
}

/// Unsaved invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub invoice_no: String,
    pub invoice_date: NaiveDate,
    pub buyer: BuyerInput,
    pub payment_mode: String,
    pub order_ref: Option<String>,
    pub dispatch_info: Option<String>,
    pub freight: BigDecimal,
    pub items: Vec<DraftItem>,
}

impl InvoiceDraft {
    pub fn new(invoice_no: impl Into<String>, invoice_date: NaiveDate, buyer: BuyerInput) -> Self {
        Self {
            invoice_no: invoice_no.into(),
            invoice_date,
            buyer,
            payment_mode: DEFAULT_PAYMENT_MODE.to_string(),
            order_ref: None,
            dispatch_info: None,
            freight: BigDecimal::from(0),
            items: Vec::new(),
        }
    }

    pub fn add_item(&mut self, item: DraftItem) {
        self.items.push(item);
    }

    pub fn with_item(mut self, item: DraftItem) -> Self {
        self.add_item(item);
        self
    }

    pub fn with_freight(mut self, freight: BigDecimal) -> Self {
        self.freight = freight;
        self
    }

    pub fn with_payment_mode(mut self, payment_mode: impl Into<String>) -> Self {
        self.payment_mode = payment_mode.into();
        self
    }

    /// Lines that will be saved; zero or negative quantities are dropped
    pub fn billable_items(&self) -> impl Iterator<Item = &DraftItem> {
        self.items
            .iter()
            .filter(|item| item.line_item().is_billable())
    }

    /// Supply type for this buyer against the configured seller
    pub fn supply_type(&self, settings: &Settings) -> SupplyType {
        SupplyType::from_gstins(settings.seller_gstin(), self.buyer.gstin.as_deref())
    }

    /// Preview the tax breakdown
    pub fn compute_totals(&self, settings: &Settings) -> Result<InvoiceTotals, GstError> {
        let lines: Vec<LineItem> = self.items.iter().map(DraftItem::line_item).collect();
        InvoiceTotals::compute(&lines, self.supply_type(settings), self.freight.clone())
    }

    pub(crate) fn new_items(&self, supply: SupplyType) -> Result<Vec<NewInvoiceItem>, GstError> {
        let items = self
            .billable_items()
            .map(|item| item.to_new_item(supply))
            .collect::<Result<Vec<_>, _>>()?;
        if items.is_empty() {
            return Err(GstError::NoBillableItems);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn product() -> Product {
        Product {
            id: 7,
            name: "Cotton Yarn 40s".to_string(),
            hsn: Some("5205".to_string()),
            gst_rate: BigDecimal::from(5),
            rate: BigDecimal::from(180),
            selling_price: BigDecimal::from(220),
            stock_qty: BigDecimal::from(50),
            unit: Some("kg".to_string()),
        }
    }

    fn settings(gstin: &str) -> Settings {
        let mut settings = Settings::default();
        settings.company_info.gstin = gstin.to_string();
        settings
    }

    #[test]
    fn test_item_from_product_uses_selling_price() {
        let item = DraftItem::from_product(&product(), BigDecimal::from(2));
        assert_eq!(item.rate, BigDecimal::from(220));
        assert_eq!(item.gst_rate, BigDecimal::from(5));
        assert_eq!(item.description, "Cotton Yarn 40s");
    }

    #[test]
    fn test_item_from_form() {
        let item = DraftItem::from_form(&product(), "2.5", "210", "10").unwrap();
        assert_eq!(item.quantity, BigDecimal::from_str("2.5").unwrap());
        assert_eq!(item.rate, BigDecimal::from(210));
        assert_eq!(item.discount_percent, BigDecimal::from(10));

        assert!(DraftItem::from_form(&product(), "2", "abc", "0").is_err());
    }

    #[test]
    fn test_supply_type_follows_buyer_gstin() {
        let mut draft = InvoiceDraft::new(
            "INV-0001",
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            BuyerInput::named("Walk-in"),
        );
        assert_eq!(
            draft.supply_type(&settings("27AAPFU0939F1ZV")),
            SupplyType::IntraState
        );

        draft.buyer.gstin = Some("29AABCU9603R1ZM".to_string());
        assert_eq!(
            draft.supply_type(&settings("27AAPFU0939F1ZV")),
            SupplyType::InterState
        );
    }

    #[test]
    fn test_new_items_drop_zero_quantity() {
        let draft = InvoiceDraft::new(
            "INV-0001",
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            BuyerInput::named("Walk-in"),
        )
        .with_item(DraftItem::from_product(&product(), BigDecimal::from(0)))
        .with_item(DraftItem::from_product(&product(), BigDecimal::from(3)));

        let items = draft.new_items(SupplyType::IntraState).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].amount, BigDecimal::from(660));
    }

    #[test]
    fn test_new_items_require_a_billable_line() {
        let draft = InvoiceDraft::new(
            "INV-0001",
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            BuyerInput::named("Walk-in"),
        )
        .with_item(DraftItem::from_product(&product(), BigDecimal::from(0)));

        assert!(matches!(
            draft.new_items(SupplyType::IntraState),
            Err(GstError::NoBillableItems)
        ));
    }

    #[test]
    fn test_new_buyer_trims_blank_fields() {
        let input = BuyerInput {
            name: " Kaveri Mills ".to_string(),
            gstin: Some("".to_string()),
            address: Some("Erode".to_string()),
            state: Some(" Tamil Nadu ".to_string()),
        };
        let buyer = input.to_new_buyer();
        assert_eq!(buyer.name, "Kaveri Mills");
        assert_eq!(buyer.gstin, None);
        assert_eq!(buyer.state.as_deref(), Some("Tamil Nadu"));
    }
}
