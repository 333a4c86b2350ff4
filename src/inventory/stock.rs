//! Stock valuation

use bigdecimal::{BigDecimal, RoundingMode};
use serde::{Deserialize, Serialize};

/// Decimal places kept on a weighted-average cost
pub const COST_SCALE: i64 = 4;

/// Quantity on hand and the average cost of that quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockValuation {
    pub stock_qty: BigDecimal,
    pub average_cost: BigDecimal,
}

/// Stock received into an existing product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAddition {
    pub quantity: BigDecimal,
    /// Purchase rate per unit of the new stock
    pub purchase_rate: BigDecimal,
}

/// Value the combined stock at the weighted average of old and new cost.
///
/// Nothing changes unless `added_qty` is positive. When the combined quantity
/// is not positive the average cost is zero.
pub fn add_stock(
    current_qty: &BigDecimal,
    current_cost: &BigDecimal,
    added_qty: &BigDecimal,
    added_cost: &BigDecimal,
) -> StockValuation {
    let zero = BigDecimal::from(0);
    if *added_qty <= zero {
        return StockValuation {
            stock_qty: current_qty.clone(),
            average_cost: current_cost.clone(),
        };
    }

    let old_value = current_qty * current_cost;
    let new_value = added_qty * added_cost;
    let stock_qty = current_qty + added_qty;

    let average_cost = if stock_qty > zero {
        ((old_value + new_value) / &stock_qty).with_scale_round(COST_SCALE, RoundingMode::HalfEven)
    } else {
        zero
    };

    StockValuation {
        stock_qty,
        average_cost,
    }
}
