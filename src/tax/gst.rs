//! GST (Goods and Services Tax) computation engine for invoice line items
//!
//! Everything here is side-effect free: line items plus the supply type go in,
//! the invoice breakdown comes out. Intermediate sums keep full precision; only
//! the grand total is rounded, half-to-even, to whole rupees.

use bigdecimal::{BigDecimal, RoundingMode};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Whether a supply stays within one state or crosses state borders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupplyType {
    /// Seller and buyer in the same state: GST splits into CGST + SGST
    IntraState,
    /// Seller and buyer in different states: GST is charged as IGST
    InterState,
}

impl SupplyType {
    /// Derive the supply type by comparing GSTIN state codes, case-insensitively.
    ///
    /// A buyer without a GSTIN is billed as intra-state.
    pub fn from_gstins(seller_gstin: &str, buyer_gstin: Option<&str>) -> Self {
        let buyer_gstin = match buyer_gstin.map(str::trim).filter(|g| !g.is_empty()) {
            Some(gstin) => gstin,
            None => return SupplyType::IntraState,
        };

        if state_code(seller_gstin).eq_ignore_ascii_case(state_code(buyer_gstin)) {
            SupplyType::IntraState
        } else {
            SupplyType::InterState
        }
    }

    pub fn is_inter_state(&self) -> bool {
        *self == SupplyType::InterState
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SupplyType::IntraState => "IntraState",
            SupplyType::InterState => "InterState",
        }
    }
}

impl FromStr for SupplyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IntraState" => Ok(SupplyType::IntraState),
            "InterState" => Ok(SupplyType::InterState),
            other => Err(format!("Unknown supply type '{}'", other)),
        }
    }
}

/// State code of a GSTIN: its first two characters (or the whole string if shorter)
pub fn state_code(gstin: &str) -> &str {
    let gstin = gstin.trim();
    match gstin.char_indices().nth(2) {
        Some((end, _)) => &gstin[..end],
        None => gstin,
    }
}

/// GST rate structure for Indian taxation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GstRate {
    /// Total GST rate percentage (e.g., 18.0 for 18%)
    pub total_rate: BigDecimal,
    /// CGST rate percentage (Central GST)
    pub cgst_rate: BigDecimal,
    /// SGST rate percentage (State GST)
    pub sgst_rate: BigDecimal,
    /// IGST rate percentage (Integrated GST)
    pub igst_rate: BigDecimal,
}

impl GstRate {
    /// Create a new GST rate with intra-state rates (CGST + SGST)
    pub fn intra_state(total_rate: BigDecimal) -> Self {
        let half_rate = &total_rate / BigDecimal::from(2);
        Self {
            total_rate,
            cgst_rate: half_rate.clone(),
            sgst_rate: half_rate,
            igst_rate: BigDecimal::from(0),
        }
    }

    /// Create a new GST rate with inter-state rates (IGST)
    pub fn inter_state(total_rate: BigDecimal) -> Self {
        Self {
            total_rate: total_rate.clone(),
            cgst_rate: BigDecimal::from(0),
            sgst_rate: BigDecimal::from(0),
            igst_rate: total_rate,
        }
    }

    /// Split a total rate according to the supply type
    pub fn for_supply(total_rate: BigDecimal, supply: SupplyType) -> Self {
        match supply {
            SupplyType::IntraState => Self::intra_state(total_rate),
            SupplyType::InterState => Self::inter_state(total_rate),
        }
    }
}

/// Computation input for one invoice line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub quantity: BigDecimal,
    /// Unit price before discount and GST
    pub rate: BigDecimal,
    pub discount_percent: BigDecimal,
    pub gst_rate: BigDecimal,
}

impl LineItem {
    pub fn new(
        quantity: BigDecimal,
        rate: BigDecimal,
        discount_percent: BigDecimal,
        gst_rate: BigDecimal,
    ) -> Self {
        Self {
            quantity,
            rate,
            discount_percent,
            gst_rate,
        }
    }

    /// Build a line from raw form text. Blank fields count as zero; anything
    /// non-numeric is rejected rather than zeroed.
    pub fn parse(
        quantity: &str,
        rate: &str,
        discount_percent: &str,
        gst_rate: &str,
    ) -> Result<Self, GstError> {
        let item = Self::new(
            parse_field("quantity", quantity)?,
            parse_field("rate", rate)?,
            parse_field("discount", discount_percent)?,
            parse_field("GST rate", gst_rate)?,
        );
        item.validate()?;
        Ok(item)
    }

    /// Lines with zero or negative quantity are skipped, not rejected
    pub fn is_billable(&self) -> bool {
        self.quantity > BigDecimal::from(0)
    }

    pub fn validate(&self) -> Result<(), GstError> {
        let zero = BigDecimal::from(0);
        if self.rate < zero {
            return Err(GstError::InvalidField {
                field: "rate".to_string(),
                value: self.rate.to_string(),
            });
        }
        if self.discount_percent < zero || self.discount_percent > BigDecimal::from(100) {
            return Err(GstError::InvalidField {
                field: "discount".to_string(),
                value: self.discount_percent.to_string(),
            });
        }
        if self.gst_rate < zero {
            return Err(GstError::InvalidRate(format!(
                "GST rate cannot be negative: {}",
                self.gst_rate
            )));
        }
        Ok(())
    }

    /// Compute the tax breakdown of this line
    pub fn calculate(&self, supply: SupplyType) -> Result<LineItemTax, GstError> {
        self.validate()?;

        let hundred = BigDecimal::from(100);
        let base_amount = &self.quantity * &self.rate;
        let discount_amount = (&base_amount * &self.discount_percent) / &hundred;
        let taxable_amount = &base_amount - &discount_amount;

        let gst_rate = GstRate::for_supply(self.gst_rate.clone(), supply);
        let cgst_amount = (&taxable_amount * &gst_rate.cgst_rate) / &hundred;
        let sgst_amount = (&taxable_amount * &gst_rate.sgst_rate) / &hundred;
        let igst_amount = (&taxable_amount * &gst_rate.igst_rate) / &hundred;
        let gst_amount = (&taxable_amount * &gst_rate.total_rate) / &hundred;

        Ok(LineItemTax {
            base_amount,
            discount_amount,
            taxable_amount,
            gst_rate,
            cgst_amount,
            sgst_amount,
            igst_amount,
            gst_amount,
        })
    }
}

fn parse_field(field: &str, raw: &str) -> Result<BigDecimal, GstError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(BigDecimal::from(0));
    }
    BigDecimal::from_str(raw).map_err(|_| GstError::InvalidField {
        field: field.to_string(),
        value: raw.to_string(),
    })
}

/// Detailed breakdown of one line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemTax {
    /// quantity * rate
    pub base_amount: BigDecimal,
    pub discount_amount: BigDecimal,
    /// Base amount less discount; the value GST is charged on
    pub taxable_amount: BigDecimal,
    pub gst_rate: GstRate,
    pub cgst_amount: BigDecimal,
    pub sgst_amount: BigDecimal,
    pub igst_amount: BigDecimal,
    /// Total GST on the line
    pub gst_amount: BigDecimal,
}

/// Complete tax breakdown of an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    /// Sum of line base amounts
    pub subtotal: BigDecimal,
    pub total_discount: BigDecimal,
    /// subtotal - total_discount
    pub taxable_value: BigDecimal,
    pub total_cgst: BigDecimal,
    pub total_sgst: BigDecimal,
    pub total_igst: BigDecimal,
    /// CGST + SGST + IGST
    pub total_gst: BigDecimal,
    pub freight: BigDecimal,
    /// Rounded grand total minus the unrounded one
    pub round_off: BigDecimal,
    /// Whole-rupee amount payable
    pub grand_total: BigDecimal,
}

impl InvoiceTotals {
    /// Compute the invoice breakdown. Non-billable lines are ignored.
    pub fn compute(
        items: &[LineItem],
        supply: SupplyType,
        freight: BigDecimal,
    ) -> Result<Self, GstError> {
        if freight < BigDecimal::from(0) {
            return Err(GstError::InvalidField {
                field: "freight".to_string(),
                value: freight.to_string(),
            });
        }

        let lines = items
            .iter()
            .filter(|item| item.is_billable())
            .map(|item| item.calculate(supply))
            .collect::<Result<Vec<_>, _>>()?;

        let subtotal: BigDecimal = lines.iter().map(|line| &line.base_amount).sum();
        let total_discount: BigDecimal = lines.iter().map(|line| &line.discount_amount).sum();
        let gst_sum: BigDecimal = lines.iter().map(|line| &line.gst_amount).sum();

        let (total_cgst, total_sgst, total_igst) = match supply {
            SupplyType::InterState => (BigDecimal::from(0), BigDecimal::from(0), gst_sum),
            SupplyType::IntraState => {
                let half = &gst_sum / BigDecimal::from(2);
                (half.clone(), half, BigDecimal::from(0))
            }
        };

        let taxable_value = &subtotal - &total_discount;
        let total_gst = &total_cgst + &total_sgst + &total_igst;
        let grand_total_raw = &taxable_value + &total_gst + &freight;
        let grand_total = round_to_rupee(&grand_total_raw);
        let round_off = &grand_total - &grand_total_raw;

        Ok(Self {
            subtotal,
            total_discount,
            taxable_value,
            total_cgst,
            total_sgst,
            total_igst,
            total_gst,
            freight,
            round_off,
            grand_total,
        })
    }

    /// Totals of an empty invoice
    pub fn zero() -> Self {
        Self {
            subtotal: BigDecimal::from(0),
            total_discount: BigDecimal::from(0),
            taxable_value: BigDecimal::from(0),
            total_cgst: BigDecimal::from(0),
            total_sgst: BigDecimal::from(0),
            total_igst: BigDecimal::from(0),
            total_gst: BigDecimal::from(0),
            freight: BigDecimal::from(0),
            round_off: BigDecimal::from(0),
            grand_total: BigDecimal::from(0),
        }
    }
}

/// Round to a whole rupee, ties to even
pub fn round_to_rupee(amount: &BigDecimal) -> BigDecimal {
    amount.with_scale_round(0, RoundingMode::HalfEven)
}

/// GST calculation engine bound to one supply type
#[derive(Debug, Clone, Copy)]
pub struct GstCalculator {
    supply: SupplyType,
}

impl GstCalculator {
    /// Create a new GST calculator
    pub fn new(supply: SupplyType) -> Self {
        Self { supply }
    }

    /// Calculator for a sale between the two GSTIN holders
    pub fn for_parties(seller_gstin: &str, buyer_gstin: Option<&str>) -> Self {
        Self::new(SupplyType::from_gstins(seller_gstin, buyer_gstin))
    }

    pub fn supply(&self) -> SupplyType {
        self.supply
    }

    /// Breakdown of a single line
    pub fn calculate_line(&self, item: &LineItem) -> Result<LineItemTax, GstError> {
        item.calculate(self.supply)
    }

    /// Breakdown of a full invoice
    pub fn calculate_invoice(
        &self,
        items: &[LineItem],
        freight: BigDecimal,
    ) -> Result<InvoiceTotals, GstError> {
        InvoiceTotals::compute(items, self.supply, freight)
    }
}

/// GST-related errors
#[derive(Debug, thiserror::Error)]
pub enum GstError {
    #[error("Invalid value '{value}' for {field}")]
    InvalidField { field: String, value: String },
    #[error("Invalid GST rate: {0}")]
    InvalidRate(String),
    #[error("Invoice has no billable items")]
    NoBillableItems,
}
