//! Resilient access to the ProductPulse data store.
//!
//! Remote calls run under a bounded retry/timeout [`executor`]; reads fall
//! back to empty defaults, writes report their errors, and the workspace
//! listing is served offline-first from a local [`cache`] snapshot.

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod remote;
pub mod service;
pub mod types;
