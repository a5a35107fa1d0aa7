//! Business Services
//!
//! - `TreeService` - nested-set insert, move, remove and path queries
//! - `with_transaction` - commit-or-rollback scope around a partition transaction
//!
//! Services hold no tree state between calls; every value they compute comes
//! from rows read inside the current operation.

pub mod transaction;
pub mod tree_service;

pub use transaction::with_transaction;
pub use tree_service::TreeService;
