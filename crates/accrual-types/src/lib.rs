//! Common types for the loyalty accrual pipeline.
//!
//! Orders, their processing tasks, the remote service's verdicts and the
//! balance ledger live here so that storage, client and pipeline crates agree
//! on a single representation.

/// Balance ledger entries.
pub mod ledger;
/// Luhn checksum validation of order numbers.
pub mod luhn;
/// Orders and processing tasks with their lifecycle statuses.
pub mod order;
/// Registry trait for pluggable implementations.
pub mod registry;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;
/// Answers from the remote accrual service.
pub mod verdict;

pub use ledger::*;
pub use luhn::is_valid_order_number;
pub use order::*;
pub use registry::ImplementationRegistry;
pub use validation::*;
pub use verdict::*;
