//! Remote tabular store access.
//!
//! - [`Query`] describes a read (table, filters, ordering, limit)
//! - [`RemoteStore`] is the select/insert/update/upsert seam
//! - [`RestStore`] talks to the hosted database's REST endpoint
//! - [`MemoryStore`] holds tables in process for offline runs and tests
//! - [`IdentityProvider`] answers "who is signed in"

mod auth;
mod client;
mod memory;
mod query;
mod rest;
#[cfg(test)]
pub(crate) mod testing;

pub use auth::{IdentityProvider, RestIdentity, StaticIdentity};
pub use client::{RemoteError, RemoteStore};
pub use memory::MemoryStore;
pub use query::{Filter, FilterOp, Query};
pub use rest::RestStore;
