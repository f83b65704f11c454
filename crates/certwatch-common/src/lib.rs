//! Shared data model for the certificate expiry monitor.
//!
//! Everything here is plain data: certificate snapshots produced by the
//! fetcher, the persisted per-host record, and the ordered severity bands
//! the evaluator derives from days remaining.

pub mod types;
