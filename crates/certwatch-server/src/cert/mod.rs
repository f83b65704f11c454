//! Certificate retrieval and the periodic check loop.

pub mod fetcher;
pub mod parse;
pub mod scheduler;
pub mod verifier;
