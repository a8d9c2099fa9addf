//! propdash - UK property price dashboard figures
//!
//! Loads per-region price tables and postcode-sector boundaries, aggregates
//! them and builds themed, Plotly-compatible figure specifications.

pub mod charts;
pub mod config;
pub mod data;
pub mod stats;
