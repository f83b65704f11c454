//! Durable per-host state for the certificate monitor.
//!
//! [`host_store::HostStore`] keeps one [`HostRecord`](certwatch_common::types::HostRecord)
//! per monitored host in a WAL-mode SQLite database. Each record write is a
//! single UPSERT so a host's state is replaced all-or-nothing.

pub mod error;
pub mod host_store;


pub use host_store::HostStore;
