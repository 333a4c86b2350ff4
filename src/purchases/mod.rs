//! Vendor purchases and payment tracking

pub mod ledger;

pub use ledger::*;
