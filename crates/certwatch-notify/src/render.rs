use certwatch_common::types::{NotificationEvent, SeverityBand};

/// Subject line and plain-text body for one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

fn band_label(band: SeverityBand) -> &'static str {
    match band {
        SeverityBand::Ok => "OK",
        SeverityBand::Warn30 => "WARNING (30 days)",
        SeverityBand::Warn15 => "WARNING (15 days)",
        SeverityBand::Warn7 => "CRITICAL (7 days)",
        SeverityBand::Expired => "EXPIRED",
    }
}

fn expiry_phrase(days_remaining: i64) -> String {
    match days_remaining {
        d if d > 1 => format!("expires in {d} days"),
        1 => "expires within a day".to_string(),
        0 => "has expired".to_string(),
        d => format!("expired {} days ago", -d),
    }
}

/// Renders the alert for `event`.
///
/// The body always carries the host, band, issuer, subject, validity window
/// and days remaining.
pub fn render_message(event: &NotificationEvent) -> RenderedMessage {
    let facts = &event.facts;
    let subject = format!(
        "[certwatch][{}] SSL certificate for {} {}",
        event.band,
        event.host,
        expiry_phrase(event.days_remaining)
    );

    let sans = if facts.subject_alt_names.is_empty() {
        "-".to_string()
    } else {
        facts.subject_alt_names.join(", ")
    };

    let body = format!(
        "SSL Certificate Expiry Alert for {host}\n\
         \n\
         The SSL certificate for {host} {phrase}. Please renew the certificate to avoid any service disruption.\n\
         \n\
         Host: {host}\n\
         Severity: {band} ({label})\n\
         Days remaining: {days}\n\
         Issuer: {issuer} (CN={issuer_cn})\n\
         Subject: {subject_cn}\n\
         Alternative names: {sans}\n\
         Valid from (notBefore): {not_before}\n\
         Valid to (notAfter): {not_after}\n\
         Days issued: {days_issued}\n\
         Serial number: {serial}\n\
         SHA-256 fingerprint: {sha256}\n\
         Chain valid: {chain}\n\
         Checked at: {time}\n\
         \n\
         If you have any questions or need assistance, please contact your SSL provider or system administrator.\n",
        host = event.host,
        phrase = expiry_phrase(event.days_remaining),
        band = event.band,
        label = band_label(event.band),
        days = event.days_remaining,
        issuer = facts.issuer.display_name(),
        issuer_cn = facts.issuer.common_name,
        subject_cn = facts.subject.common_name,
        sans = sans,
        not_before = facts.not_before.to_rfc3339(),
        not_after = facts.not_after.to_rfc3339(),
        days_issued = facts.days_issued(event.timestamp),
        serial = facts.serial_number,
        sha256 = facts.fingerprint_sha256,
        chain = if facts.chain_valid { "yes" } else { "no" },
        time = event.timestamp.to_rfc3339(),
    );

    RenderedMessage { subject, body }
}
