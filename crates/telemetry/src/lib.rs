//! Cost estimation for DandiClaw.
//!
//! Token counts reported by the gateway are turned into USD through a
//! per-model [`PricingTable`]. Models missing from the table cost nothing.

pub mod pricing;

pub use pricing::{ModelPricing, PricingTable, format_cost};
