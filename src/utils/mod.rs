//! Utility modules

pub mod memory_storage;
#[cfg(feature = "sqlite")]
pub mod sqlite_storage;
pub mod validation;

pub use memory_storage::*;
#[cfg(feature = "sqlite")]
pub use sqlite_storage::*;
pub use validation::*;
