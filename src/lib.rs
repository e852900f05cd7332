//! change-audit library crate
//!
//! Exposes the audit pipeline so tests and external tooling can exercise the
//! individual stages without going through CLI startup.

pub mod audit;
pub mod backend;
pub mod config;
pub mod context;
pub mod identify;
pub mod pipeline;
pub mod report;
pub mod tables;
