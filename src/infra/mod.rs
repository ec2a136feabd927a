//! Infrastructure adapters and runtime bootstrap.

pub mod cloudflare;
pub mod error;
pub mod http;
pub mod memory;
pub mod postgrest;
pub mod telemetry;
pub mod wiring;
