//! # GST Billing Core
//!
//! Billing and inventory core for a small trading business that issues Indian
//! GST tax invoices, tracks stock and pays vendor bills.
//!
//! ## Features
//!
//! - **GST computation**: line and invoice breakdowns with CGST/SGST or IGST and whole-rupee rounding
//! - **Invoice lifecycle**: sequential numbering, atomic save with stock deduction, cancellation and re-issue
//! - **Inventory**: product master with weighted-average cost and low-stock listing
//! - **Purchases**: vendor bills with payment history and derived payment status
//! - **Storage abstraction**: async storage trait with in-memory and SQLite backends
//!
//! ## Quick Start
//!
//! ```rust
//! use gst_billing_core::{
//!     Billing, BillingResult, BuyerInput, DraftItem, MemoryStorage, NewProduct, Settings,
//!     StockPolicy,
//! };
//! use bigdecimal::BigDecimal;
//! use chrono::NaiveDate;
//!
//! async fn first_invoice() -> BillingResult<()> {
//!     let mut settings = Settings::default();
//!     settings.company_info.gstin = "27AAPFU0939F1ZV".to_string();
//!
//!     let mut billing = Billing::new(MemoryStorage::new(), settings);
//!     let bucket = billing
//!         .create_product(NewProduct {
//!             name: "Steel Bucket".to_string(),
//!             hsn: Some("7323".to_string()),
//!             gst_rate: BigDecimal::from(18),
//!             rate: BigDecimal::from(80),
//!             selling_price: BigDecimal::from(100),
//!             stock_qty: BigDecimal::from(20),
//!             unit: Some("pcs".to_string()),
//!         })
//!         .await?;
//!
//!     let mut buyer = BuyerInput::named("Anand Stores");
//!     buyer.address = Some("Pune".to_string());
//!     buyer.state = Some("Maharashtra".to_string());
//!
//!     let draft = billing
//!         .new_invoice(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(), buyer)
//!         .await?
//!         .with_item(DraftItem::from_product(&bucket, BigDecimal::from(2)));
//!     billing.save_invoice(&draft, StockPolicy::Enforce).await?;
//!     Ok(())
//! }
//! ```

pub mod billing;
pub mod config;
pub mod inventory;
pub mod parties;
pub mod purchases;
pub mod tax;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use billing::*;
pub use config::*;
pub use inventory::*;
pub use parties::*;
pub use purchases::*;
pub use tax::gst::*;
pub use traits::*;
pub use types::*;
pub use utils::*;
