//! Buyers and vendors

pub mod directory;

pub use directory::*;
