//! Application layer: backing-store contract, per-collection context and error reporting.

pub mod context;
pub mod error;
pub mod repos;
