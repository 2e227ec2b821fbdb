//! REST gateway in front of an SAP Business One installation.
//!
//! Storefronts talk JSON to this service; it drives the DI automation
//! bridge for writes (orders, payments, deliveries, partners) and reads
//! the company database directly for lookups and catalog data.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod erp;
pub mod error;
pub mod http;
pub mod store;
pub mod workflow;
