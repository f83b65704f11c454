//! Severity evaluation for monitored certificates.
//!
//! [`evaluator::evaluate`] is a pure function of the host's prior record, the
//! freshly fetched certificate and the current time. It decides which
//! [`SeverityBand`](certwatch_common::types::SeverityBand) the certificate is
//! in, whether that warrants a notification, and whether the certificate was
//! renewed since the last check.

pub mod evaluator;

#[cfg(test)]
mod tests;

pub use evaluator::{evaluate, Evaluation, REALERT_INTERVAL_HOURS};
