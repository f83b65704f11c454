use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder for certificate attributes the peer did not provide.
pub const UNKNOWN: &str = "Unknown";

const SECS_PER_DAY: i64 = 86_400;

/// Whole days in `span`, rounded towards positive infinity.
///
/// # Examples
///
/// ```
/// use certwatch_common::types::ceil_days;
/// use chrono::Duration;
///
/// assert_eq!(ceil_days(Duration::hours(36)), 2);
/// assert_eq!(ceil_days(Duration::hours(24)), 1);
/// assert_eq!(ceil_days(Duration::zero()), 0);
/// assert_eq!(ceil_days(Duration::hours(-36)), -1);
/// ```
pub fn ceil_days(span: Duration) -> i64 {
    let secs = span.num_seconds();
    let days = secs.div_euclid(SECS_PER_DAY);
    if secs.rem_euclid(SECS_PER_DAY) > 0 {
        days + 1
    } else {
        days
    }
}

/// Urgency of a certificate's remaining lifetime, ordered from least to most
/// urgent.
///
/// # Examples
///
/// ```
/// use certwatch_common::types::SeverityBand;
///
/// let band: SeverityBand = "warn15".parse().unwrap();
/// assert_eq!(band, SeverityBand::Warn15);
/// assert_eq!(band.to_string(), "warn15");
/// assert!(SeverityBand::Expired > SeverityBand::Warn7);
/// assert!(SeverityBand::Warn30 > SeverityBand::Ok);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityBand {
    Ok,
    Warn30,
    Warn15,
    Warn7,
    Expired,
}

impl SeverityBand {
    pub const ALL: [SeverityBand; 5] = [
        SeverityBand::Ok,
        SeverityBand::Warn30,
        SeverityBand::Warn15,
        SeverityBand::Warn7,
        SeverityBand::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityBand::Ok => "ok",
            SeverityBand::Warn30 => "warn30",
            SeverityBand::Warn15 => "warn15",
            SeverityBand::Warn7 => "warn7",
            SeverityBand::Expired => "expired",
        }
    }
}

impl std::fmt::Display for SeverityBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SeverityBand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ok" => Ok(SeverityBand::Ok),
            "warn30" => Ok(SeverityBand::Warn30),
            "warn15" => Ok(SeverityBand::Warn15),
            "warn7" => Ok(SeverityBand::Warn7),
            "expired" => Ok(SeverityBand::Expired),
            _ => Err(format!("unknown severity band: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThresholdError {
    #[error("thresholds must be strictly decreasing and positive (warn30={warn30}, warn15={warn15}, warn7={warn7})")]
    NotDecreasing { warn30: i64, warn15: i64, warn7: i64 },
}

/// Day thresholds separating the severity bands.
///
/// A certificate with `d` days remaining falls into `Warn30` when
/// `warn15_days < d <= warn30_days`, and so on down to `Expired` at `d <= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandThresholds {
    #[serde(default = "default_warn30_days")]
    pub warn30_days: i64,
    #[serde(default = "default_warn15_days")]
    pub warn15_days: i64,
    #[serde(default = "default_warn7_days")]
    pub warn7_days: i64,
}

impl Default for BandThresholds {
    fn default() -> Self {
        Self {
            warn30_days: default_warn30_days(),
            warn15_days: default_warn15_days(),
            warn7_days: default_warn7_days(),
        }
    }
}

fn default_warn30_days() -> i64 {
    30
}

fn default_warn15_days() -> i64 {
    15
}

fn default_warn7_days() -> i64 {
    7
}

impl BandThresholds {
    pub fn validate(&self) -> Result<(), ThresholdError> {
        if self.warn30_days > self.warn15_days
            && self.warn15_days > self.warn7_days
            && self.warn7_days > 0
        {
            Ok(())
        } else {
            Err(ThresholdError::NotDecreasing {
                warn30: self.warn30_days,
                warn15: self.warn15_days,
                warn7: self.warn7_days,
            })
        }
    }

    /// Maps days remaining onto a band.
    ///
    /// # Examples
    ///
    /// ```
    /// use certwatch_common::types::{BandThresholds, SeverityBand};
    ///
    /// let t = BandThresholds::default();
    /// assert_eq!(t.band_for(31), SeverityBand::Ok);
    /// assert_eq!(t.band_for(30), SeverityBand::Warn30);
    /// assert_eq!(t.band_for(15), SeverityBand::Warn15);
    /// assert_eq!(t.band_for(7), SeverityBand::Warn7);
    /// assert_eq!(t.band_for(0), SeverityBand::Expired);
    /// ```
    pub fn band_for(&self, days_remaining: i64) -> SeverityBand {
        if days_remaining <= 0 {
            SeverityBand::Expired
        } else if days_remaining <= self.warn7_days {
            SeverityBand::Warn7
        } else if days_remaining <= self.warn15_days {
            SeverityBand::Warn15
        } else if days_remaining <= self.warn30_days {
            SeverityBand::Warn30
        } else {
            SeverityBand::Ok
        }
    }
}

/// Distinguished name attributes of a certificate issuer or subject.
/// Attributes absent from the certificate hold [`UNKNOWN`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinguishedName {
    pub common_name: String,
    pub organization: String,
    pub organizational_unit: String,
    pub country: String,
    pub locality: String,
    pub state: String,
}

impl Default for DistinguishedName {
    fn default() -> Self {
        Self {
            common_name: UNKNOWN.to_string(),
            organization: UNKNOWN.to_string(),
            organizational_unit: UNKNOWN.to_string(),
            country: UNKNOWN.to_string(),
            locality: UNKNOWN.to_string(),
            state: UNKNOWN.to_string(),
        }
    }
}

impl DistinguishedName {
    /// Short human-readable label: organization, falling back to common name.
    pub fn display_name(&self) -> &str {
        if self.organization != UNKNOWN {
            &self.organization
        } else {
            &self.common_name
        }
    }
}

/// Snapshot of a host's leaf certificate taken by one successful fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateFacts {
    pub host: String,
    pub issuer: DistinguishedName,
    pub subject: DistinguishedName,
    pub subject_alt_names: Vec<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub serial_number: String,
    pub fingerprint_sha256: String,
    pub fingerprint_sha1: String,
    pub signature_algorithm: String,
    pub public_key_algorithm: String,
    pub public_key_bits: Option<u32>,
    pub key_usage: Vec<String>,
    /// X.509 version (1, 2 or 3).
    pub version: u32,
    /// Whether the presented chain verified against the WebPKI roots.
    /// Informational only; expiry monitoring does not depend on it.
    pub chain_valid: bool,
    pub fetched_at: DateTime<Utc>,
}

impl CertificateFacts {
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        ceil_days(self.not_after - now)
    }

    /// Days elapsed since the certificate became valid.
    pub fn days_issued(&self, now: DateTime<Utc>) -> i64 {
        ceil_days(now - self.not_before)
    }
}

/// Durable per-host monitoring state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub host: String,
    /// Latest successfully fetched certificate, `None` until the first success.
    pub facts: Option<CertificateFacts>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_notified_severity: Option<SeverityBand>,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HostRecord {
    pub fn new(host: &str, now: DateTime<Utc>) -> Self {
        Self {
            host: host.to_string(),
            facts: None,
            last_checked_at: None,
            last_notified_severity: None,
            last_notified_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A notification to be rendered and dispatched for one host.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub host: String,
    pub facts: CertificateFacts,
    pub band: SeverityBand,
    pub days_remaining: i64,
    pub timestamp: DateTime<Utc>,
}
