//! Domain layer types and invariants.

pub mod change;
pub mod collection;
pub mod error;
pub mod record;
