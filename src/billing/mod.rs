//! Billing module containing drafts, numbering and the invoice lifecycle

pub mod core;
pub mod draft;
pub mod invoice;
pub mod numbering;

pub use self::core::*;
pub use draft::*;
pub use invoice::*;
pub use numbering::*;
