//! certwatch server: periodically fetches TLS certificates for configured
//! hosts, classifies their remaining lifetime into severity bands and sends
//! an alert once per band escalation (daily while expired).

pub mod cert;
pub mod config;
pub mod logging;
pub mod runtime;
