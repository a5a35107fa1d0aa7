//! Tree Operation Building Blocks
//!
//! Pure pieces of the nested-set algorithm, kept free of any store access so
//! they can be tested on plain vectors:
//!
//! - `intervals` - insertion points, gap opening/closing, subtree move plans
//! - `invariants` - structural verification of a partition's rows
//! - `validation` - checks that must pass before any row changes
//! - `error` - `TreeError` and `ValidationError`

pub mod error;
pub mod intervals;
pub mod invariants;
pub mod validation;

pub use error::{TreeError, ValidationError};
pub use intervals::{InsertionPoint, MovePlan};
pub use invariants::verify_nodes;
