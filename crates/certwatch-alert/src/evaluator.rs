use certwatch_common::types::{BandThresholds, CertificateFacts, HostRecord, SeverityBand};
use chrono::{DateTime, Duration, Utc};

/// Hours between repeated notifications while a certificate stays expired.
pub const REALERT_INTERVAL_HOURS: i64 = 24;

/// Outcome of evaluating one fetched certificate against a host's prior state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub band: SeverityBand,
    pub should_notify: bool,
    /// The certificate expires later than the previously recorded one (or no
    /// certificate was recorded before). Resets notification history.
    pub is_renewal: bool,
    pub days_remaining: i64,
}

/// Evaluates `facts` against the host's `prior` record.
///
/// A notification is due when the band is strictly more urgent than the last
/// notified band, or when the certificate is still expired and the last
/// notification is more than [`REALERT_INTERVAL_HOURS`] old. After a renewal
/// the last notified band counts as [`SeverityBand::Ok`].
///
/// # Examples
///
/// ```
/// use certwatch_alert::evaluate;
/// use certwatch_common::types::{BandThresholds, HostRecord, SeverityBand};
/// # use certwatch_common::types::{CertificateFacts, DistinguishedName};
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// # let facts = |not_after| CertificateFacts {
/// #     host: "a.example".into(),
/// #     issuer: DistinguishedName::default(),
/// #     subject: DistinguishedName::default(),
/// #     subject_alt_names: vec![],
/// #     not_before: now - Duration::days(80),
/// #     not_after,
/// #     serial_number: String::new(),
/// #     fingerprint_sha256: String::new(),
/// #     fingerprint_sha1: String::new(),
/// #     signature_algorithm: String::new(),
/// #     public_key_algorithm: String::new(),
/// #     public_key_bits: None,
/// #     key_usage: vec![],
/// #     version: 3,
/// #     chain_valid: true,
/// #     fetched_at: now,
/// # };
/// let current = facts(now + Duration::days(10));
/// let mut prior = HostRecord::new("a.example", now);
/// prior.facts = Some(current.clone());
/// prior.last_notified_severity = Some(SeverityBand::Warn30);
///
/// let eval = evaluate(&prior, &current, now, &BandThresholds::default());
/// assert_eq!(eval.band, SeverityBand::Warn15);
/// assert!(eval.should_notify);
/// assert!(!eval.is_renewal);
/// ```
pub fn evaluate(
    prior: &HostRecord,
    facts: &CertificateFacts,
    now: DateTime<Utc>,
    thresholds: &BandThresholds,
) -> Evaluation {
    let days_remaining = facts.days_remaining(now);
    let band = thresholds.band_for(days_remaining);

    let is_renewal = prior
        .facts
        .as_ref()
        .map_or(true, |previous| facts.not_after > previous.not_after);

    let baseline = if is_renewal {
        SeverityBand::Ok
    } else {
        prior.last_notified_severity.unwrap_or(SeverityBand::Ok)
    };

    let escalated = band > baseline;
    let realert_due = !is_renewal
        && band == SeverityBand::Expired
        && prior.last_notified_at.map_or(true, |last| {
            now - last > Duration::hours(REALERT_INTERVAL_HOURS)
        });

    Evaluation {
        band,
        should_notify: escalated || realert_due,
        is_renewal,
        days_remaining,
    }
}
