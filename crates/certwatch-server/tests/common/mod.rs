#![allow(dead_code)]

use async_trait::async_trait;
use certwatch_common::types::{CertificateFacts, DistinguishedName};
use certwatch_notify::dispatcher::AlertDispatcher;
use certwatch_notify::error::NotifyError;
use certwatch_notify::gate::DispatchGate;
use certwatch_notify::NotificationChannel;
use certwatch_server::cert::fetcher::{CertFetcher, FetchError, FetchedCertificate};
use certwatch_server::cert::scheduler::CertCheckScheduler;
use certwatch_storage::HostStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

pub fn make_facts(host: &str, not_after: DateTime<Utc>) -> CertificateFacts {
    CertificateFacts {
        host: host.to_string(),
        issuer: DistinguishedName {
            common_name: "R11".into(),
            organization: "Let's Encrypt".into(),
            ..Default::default()
        },
        subject: DistinguishedName {
            common_name: host.to_string(),
            ..Default::default()
        },
        subject_alt_names: vec![host.to_string()],
        not_before: not_after - ChronoDuration::days(90),
        not_after,
        serial_number: "03:A1".into(),
        fingerprint_sha256: "AA:BB".into(),
        fingerprint_sha1: "CC:DD".into(),
        signature_algorithm: "SHA256withRSA".into(),
        public_key_algorithm: "RSA".into(),
        public_key_bits: Some(2048),
        key_usage: vec!["digital_signature".into()],
        version: 3,
        chain_valid: true,
        fetched_at: Utc::now(),
    }
}

/// Serves canned certificates per host. Hosts without an entry fail to
/// connect.
#[derive(Default)]
pub struct FakeFetcher {
    certs: Mutex<HashMap<String, DateTime<Utc>>>,
    panicking: Mutex<Vec<String>>,
    calls: AtomicUsize,
    hold: Mutex<Option<Arc<Notify>>>,
    started: Notify,
}

impl FakeFetcher {
    /// Host presents a certificate that expires at `not_after`.
    pub fn set(&self, host: &str, not_after: DateTime<Utc>) {
        self.certs
            .lock()
            .unwrap()
            .insert(host.to_string(), not_after);
    }

    /// Host presents a certificate expiring `days` from now.
    pub fn set_days(&self, host: &str, days: i64) {
        self.set(host, Utc::now() + ChronoDuration::days(days));
    }

    pub fn make_unreachable(&self, host: &str) {
        self.certs.lock().unwrap().remove(host);
    }

    pub fn panic_on(&self, host: &str) {
        self.panicking.lock().unwrap().push(host.to_string());
    }

    /// Makes every fetch wait until the returned handle is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(release.clone());
        release
    }

    /// Resolves once a fetch has started.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CertFetcher for FakeFetcher {
    async fn fetch(&self, host: &str) -> Result<FetchedCertificate, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hold = self.hold.lock().unwrap().clone();
        if let Some(release) = hold {
            self.started.notify_one();
            release.notified().await;
        }
        if self.panicking.lock().unwrap().iter().any(|h| h == host) {
            panic!("fetcher blew up for {host}");
        }
        let not_after = self.certs.lock().unwrap().get(host).copied();
        match not_after {
            Some(not_after) => Ok(FetchedCertificate {
                facts: make_facts(host, not_after),
                chain_error: None,
                chain_depth: 2,
                tls_version: Some("TLSv1_3".into()),
                cipher_suite: None,
            }),
            None => Err(FetchError::Connect {
                host: host.to_string(),
                port: 443,
                reason: "connection refused".into(),
            }),
        }
    }
}

/// Records delivered messages; fails every send while `failing` is set.
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<(String, String)>>,
    pub failing: AtomicBool,
}

impl RecordingChannel {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, subject)| subject.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send(&self, recipient: &str, subject: &str, _body: &str) -> certwatch_notify::error::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::SmtpError("421 service not available".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), subject.to_string()));
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}

pub struct TestContext {
    pub temp_dir: TempDir,
    pub store: Arc<HostStore>,
    pub fetcher: Arc<FakeFetcher>,
    pub channel: Arc<RecordingChannel>,
    pub gate: Arc<DispatchGate>,
}

impl TestContext {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(HostStore::new(temp_dir.path()).unwrap());
        Self {
            temp_dir,
            store,
            fetcher: Arc::new(FakeFetcher::default()),
            channel: Arc::new(RecordingChannel::default()),
            gate: Arc::new(DispatchGate::new(Duration::from_millis(0))),
        }
    }

    pub fn dispatcher(&self) -> Arc<AlertDispatcher> {
        Arc::new(AlertDispatcher::new(
            self.channel.clone(),
            vec!["ops@example.com".to_string()],
            self.gate.clone(),
            Duration::from_secs(5),
        ))
    }

    pub fn scheduler(&self) -> Arc<CertCheckScheduler> {
        Arc::new(CertCheckScheduler::new(
            self.store.clone(),
            self.fetcher.clone(),
            Some(self.dispatcher()),
            Default::default(),
            4,
        ))
    }

    pub fn scheduler_without_notifications(&self) -> Arc<CertCheckScheduler> {
        Arc::new(CertCheckScheduler::new(
            self.store.clone(),
            self.fetcher.clone(),
            None,
            Default::default(),
            4,
        ))
    }
}
