//! Product catalog and stock valuation

pub mod catalog;
pub mod stock;

pub use catalog::*;
pub use stock::*;
