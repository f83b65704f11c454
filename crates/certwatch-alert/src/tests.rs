use crate::evaluator::{evaluate, Evaluation};
use certwatch_common::types::{
    BandThresholds, CertificateFacts, DistinguishedName, HostRecord, SeverityBand,
};
use chrono::{DateTime, Duration, TimeZone, Utc};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

fn make_facts(host: &str, not_after: DateTime<Utc>) -> CertificateFacts {
    CertificateFacts {
        host: host.to_string(),
        issuer: DistinguishedName {
            organization: "Internet2".into(),
            ..Default::default()
        },
        subject: DistinguishedName {
            common_name: host.to_string(),
            ..Default::default()
        },
        subject_alt_names: vec![host.to_string()],
        not_before: not_after - Duration::days(365),
        not_after,
        serial_number: "01".into(),
        fingerprint_sha256: "AA".into(),
        fingerprint_sha1: "BB".into(),
        signature_algorithm: "SHA256withRSA".into(),
        public_key_algorithm: "RSA".into(),
        public_key_bits: Some(2048),
        key_usage: vec![],
        version: 3,
        chain_valid: true,
        fetched_at: now(),
    }
}

fn prior_with(
    facts: Option<CertificateFacts>,
    notified: Option<SeverityBand>,
    notified_at: Option<DateTime<Utc>>,
) -> HostRecord {
    let mut record = HostRecord::new("host.example", now() - Duration::days(100));
    record.facts = facts;
    record.last_notified_severity = notified;
    record.last_notified_at = notified_at;
    record
}

fn eval(prior: &HostRecord, facts: &CertificateFacts) -> Evaluation {
    evaluate(prior, facts, now(), &BandThresholds::default())
}

#[test]
fn band_is_ok_above_thirty_days() {
    for days in [31, 45, 90, 400] {
        let facts = make_facts("a.example", now() + Duration::days(days));
        let prior = prior_with(Some(facts.clone()), None, None);
        let e = eval(&prior, &facts);
        assert_eq!(e.band, SeverityBand::Ok, "days={days}");
        assert!(!e.should_notify);
    }
}

#[test]
fn band_is_expired_at_or_below_zero_days() {
    for offset in [Duration::zero(), -Duration::hours(1), -Duration::days(2), -Duration::days(300)] {
        let facts = make_facts("a.example", now() + offset);
        let prior = prior_with(Some(facts.clone()), None, None);
        let e = eval(&prior, &facts);
        assert_eq!(e.band, SeverityBand::Expired, "offset={offset}");
        assert!(e.days_remaining <= 0);
    }
}

#[test]
fn band_boundaries_are_inclusive_upper() {
    let cases = [
        (Duration::days(30), SeverityBand::Warn30),
        (Duration::days(30) + Duration::seconds(1), SeverityBand::Ok),
        (Duration::days(16), SeverityBand::Warn30),
        (Duration::days(15), SeverityBand::Warn15),
        (Duration::days(8), SeverityBand::Warn15),
        (Duration::days(7), SeverityBand::Warn7),
        (Duration::seconds(1), SeverityBand::Warn7),
        (Duration::zero(), SeverityBand::Expired),
    ];
    for (offset, expected) in cases {
        let facts = make_facts("a.example", now() + offset);
        let prior = prior_with(Some(facts.clone()), None, None);
        assert_eq!(eval(&prior, &facts).band, expected, "offset={offset}");
    }
}

#[test]
fn partial_day_rounds_up() {
    // 7 days and one hour left is 8 days remaining, still Warn15.
    let facts = make_facts("a.example", now() + Duration::days(7) + Duration::hours(1));
    let prior = prior_with(Some(facts.clone()), None, None);
    let e = eval(&prior, &facts);
    assert_eq!(e.days_remaining, 8);
    assert_eq!(e.band, SeverityBand::Warn15);
}

#[test]
fn ten_days_left_stays_warn15_then_escalates_to_warn7() {
    // a.example: 10 days left, already told about Warn15.
    let facts = make_facts("a.example", now() + Duration::days(10));
    let prior = prior_with(Some(facts.clone()), Some(SeverityBand::Warn15), Some(now() - Duration::days(2)));
    let e = eval(&prior, &facts);
    assert_eq!(
        (e.band, e.should_notify, e.is_renewal),
        (SeverityBand::Warn15, false, false)
    );

    let facts = make_facts("a.example", now() + Duration::days(6));
    let prior = prior_with(Some(facts.clone()), Some(SeverityBand::Warn15), Some(now() - Duration::days(2)));
    let e = eval(&prior, &facts);
    assert_eq!(
        (e.band, e.should_notify, e.is_renewal),
        (SeverityBand::Warn7, true, false)
    );
}

#[test]
fn ten_days_left_after_warn30_notice_notifies_warn15() {
    let facts = make_facts("a.example", now() + Duration::days(10));
    let prior = prior_with(Some(facts.clone()), Some(SeverityBand::Warn30), Some(now() - Duration::days(6)));
    let e = eval(&prior, &facts);
    assert_eq!(
        (e.band, e.should_notify, e.is_renewal),
        (SeverityBand::Warn15, true, false)
    );
}

#[test]
fn same_band_does_not_repeat() {
    let facts = make_facts("a.example", now() + Duration::days(20));
    let prior = prior_with(Some(facts.clone()), Some(SeverityBand::Warn30), Some(now() - Duration::days(5)));
    assert!(!eval(&prior, &facts).should_notify);
}

#[test]
fn lower_band_without_renewal_does_not_notify() {
    // Certificate swapped for one expiring earlier: band drops but urgency
    // already reported stays reported.
    let previous = make_facts("a.example", now() + Duration::days(5));
    let facts = make_facts("a.example", now() + Duration::days(4));
    let prior = prior_with(Some(previous), Some(SeverityBand::Warn7), Some(now() - Duration::days(1)));
    let e = eval(&prior, &facts);
    assert!(!e.is_renewal);
    assert!(!e.should_notify);
}

#[test]
fn first_fetch_counts_as_renewal() {
    let facts = make_facts("a.example", now() + Duration::days(25));
    let prior = prior_with(None, None, None);
    let e = eval(&prior, &facts);
    assert!(e.is_renewal);
    assert_eq!(e.band, SeverityBand::Warn30);
    assert!(e.should_notify);

    let facts = make_facts("a.example", now() + Duration::days(90));
    let e = eval(&prior, &facts);
    assert!(e.is_renewal);
    assert!(!e.should_notify);
}

#[test]
fn renewal_resets_baseline() {
    let previous = make_facts("a.example", now() + Duration::days(3));
    let renewed = make_facts("a.example", now() + Duration::days(25));
    let prior = prior_with(Some(previous), Some(SeverityBand::Warn7), Some(now() - Duration::days(4)));

    let e = eval(&prior, &renewed);
    assert!(e.is_renewal);
    assert_eq!(e.band, SeverityBand::Warn30);
    assert!(e.should_notify, "re-entering Warn30 after renewal must notify");
}

#[test]
fn renewal_into_ok_does_not_notify() {
    let previous = make_facts("a.example", now() + Duration::days(3));
    let renewed = make_facts("a.example", now() + Duration::days(90));
    let prior = prior_with(Some(previous), Some(SeverityBand::Warn7), Some(now() - Duration::days(4)));

    let e = eval(&prior, &renewed);
    assert!(e.is_renewal);
    assert_eq!(e.band, SeverityBand::Ok);
    assert!(!e.should_notify);
}

#[test]
fn expired_realerts_daily() {
    // c.example: expired two days ago, last told 30 hours ago.
    let facts = make_facts("c.example", now() - Duration::days(2));
    let prior = prior_with(Some(facts.clone()), Some(SeverityBand::Expired), Some(now() - Duration::hours(30)));
    let e = eval(&prior, &facts);
    assert_eq!(e.band, SeverityBand::Expired);
    assert!(!e.is_renewal);
    assert!(e.should_notify);

    let prior = prior_with(Some(facts.clone()), Some(SeverityBand::Expired), Some(now() - Duration::hours(10)));
    assert!(!eval(&prior, &facts).should_notify);
}

#[test]
fn expired_realert_needs_strictly_more_than_a_day() {
    let facts = make_facts("c.example", now() - Duration::days(2));
    let prior = prior_with(Some(facts.clone()), Some(SeverityBand::Expired), Some(now() - Duration::hours(24)));
    assert!(!eval(&prior, &facts).should_notify);
}

#[test]
fn expired_without_notification_time_notifies() {
    let facts = make_facts("c.example", now() - Duration::days(2));
    let prior = prior_with(Some(facts.clone()), Some(SeverityBand::Expired), None);
    assert!(eval(&prior, &facts).should_notify);
}

#[test]
fn evaluate_is_idempotent() {
    let facts = make_facts("a.example", now() + Duration::days(12));
    let prior = prior_with(Some(facts.clone()), Some(SeverityBand::Warn30), Some(now() - Duration::days(3)));
    let first = eval(&prior, &facts);
    let second = eval(&prior, &facts);
    assert_eq!(first, second);
}

#[test]
fn custom_thresholds_apply() {
    let thresholds = BandThresholds {
        warn30_days: 60,
        warn15_days: 30,
        warn7_days: 14,
    };
    let facts = make_facts("a.example", now() + Duration::days(45));
    let prior = prior_with(Some(facts.clone()), None, None);
    let e = evaluate(&prior, &facts, now(), &thresholds);
    assert_eq!(e.band, SeverityBand::Warn30);
    assert!(e.should_notify);
}

/// Walks one certificate from 40 days left to 5 days past expiry, one tick
/// per hour, applying the evaluation the way the scheduler does.
#[test]
fn notified_band_never_decreases_across_ticks() {
    let not_after = now() + Duration::days(40);
    let facts = make_facts("a.example", not_after);
    let mut record = prior_with(None, None, None);
    let mut notified = Vec::new();

    for hour in 0..(45 * 24) {
        let tick = now() + Duration::hours(hour);
        let e = evaluate(&record, &facts, tick, &BandThresholds::default());
        if e.is_renewal {
            record.last_notified_severity = None;
            record.last_notified_at = None;
        }
        if e.should_notify {
            if let Some(previous) = record.last_notified_severity {
                assert!(e.band >= previous, "hour={hour}");
            }
            record.last_notified_severity = Some(e.band);
            record.last_notified_at = Some(tick);
            notified.push(e.band);
        }
        record.facts = Some(facts.clone());
        record.last_checked_at = Some(tick);
    }

    assert_eq!(
        &notified[..4],
        &[
            SeverityBand::Warn30,
            SeverityBand::Warn15,
            SeverityBand::Warn7,
            SeverityBand::Expired,
        ]
    );
    // Five days expired with a notice every 25 hours.
    assert!(notified[4..].iter().all(|b| *b == SeverityBand::Expired));
    assert_eq!(notified.len() - 3, 5);
}
