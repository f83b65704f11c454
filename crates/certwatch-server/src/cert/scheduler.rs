use super::fetcher::{CertFetcher, FetchError, FetchedCertificate};
use certwatch_alert::{evaluate, Evaluation};
use certwatch_common::types::{BandThresholds, HostRecord, NotificationEvent};
use certwatch_notify::dispatcher::AlertDispatcher;
use certwatch_storage::error::StorageError;
use certwatch_storage::HostStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::{interval, MissedTickBehavior};

/// Why a host check did not complete. In every case the stored record is
/// left as it was.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("host store: {0}")]
    Storage(#[from] StorageError),
}

/// What happened to the notification for one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    NotDue,
    /// A notification was due but no dispatcher is configured.
    Disabled,
    Sent,
    /// Dispatch failed; notification state was not advanced.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct HostCheckReport {
    pub host: String,
    pub fetched: FetchedCertificate,
    pub evaluation: Evaluation,
    pub notification: NotificationOutcome,
    /// The record as left by this check (not stored for unrecorded checks).
    pub record: HostRecord,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub checked: usize,
    pub failed: usize,
    pub notified: usize,
}

/// Runs fetch, evaluate, notify and persist for each monitored host.
pub struct CertCheckScheduler {
    store: Arc<HostStore>,
    fetcher: Arc<dyn CertFetcher>,
    dispatcher: Option<Arc<AlertDispatcher>>,
    thresholds: BandThresholds,
    max_concurrent: usize,
    host_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CertCheckScheduler {
    pub fn new(
        store: Arc<HostStore>,
        fetcher: Arc<dyn CertFetcher>,
        dispatcher: Option<Arc<AlertDispatcher>>,
        thresholds: BandThresholds,
        max_concurrent: usize,
    ) -> Self {
        Self {
            store,
            fetcher,
            dispatcher,
            thresholds,
            max_concurrent: max_concurrent.max(1),
            host_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<HostStore> {
        &self.store
    }

    pub fn notifications_enabled(&self) -> bool {
        self.dispatcher.is_some()
    }

    fn host_lock(&self, host: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .host_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(host.to_string()).or_default().clone()
    }

    /// Checks one host now. Shares the per-host lock with scheduled batches,
    /// so a manual check never interleaves with a scheduled one.
    pub async fn check_host(&self, host: &str) -> Result<HostCheckReport, CheckError> {
        self.check(host, true).await
    }

    /// Like [`check_host`](Self::check_host) but never writes the record.
    /// Used for hosts that are not monitored, which would otherwise leave a
    /// record behind that no batch refreshes.
    pub async fn check_host_unrecorded(&self, host: &str) -> Result<HostCheckReport, CheckError> {
        self.check(host, false).await
    }

    async fn check(&self, host: &str, persist: bool) -> Result<HostCheckReport, CheckError> {
        let lock = self.host_lock(host);
        let _guard = lock.lock().await;

        tracing::debug!(host = %host, state = "fetching", "Host check");
        let fetched = match self.fetcher.fetch(host).await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!(
                    host = %host,
                    kind = e.kind(),
                    error = %e,
                    "Certificate fetch failed, record left unchanged"
                );
                return Err(e.into());
            }
        };

        let now = Utc::now();
        let mut record = self.store.load_or_new(host, now)?;

        tracing::debug!(host = %host, state = "evaluating", "Host check");
        let evaluation = evaluate(&record, &fetched.facts, now, &self.thresholds);
        if evaluation.is_renewal {
            if record.facts.is_some() {
                tracing::info!(
                    host = %host,
                    not_after = %fetched.facts.not_after,
                    "Certificate renewed, notification history reset"
                );
            }
            record.last_notified_severity = None;
            record.last_notified_at = None;
        }

        let notification = if !evaluation.should_notify {
            NotificationOutcome::NotDue
        } else if let Some(dispatcher) = &self.dispatcher {
            tracing::debug!(host = %host, state = "notifying", band = %evaluation.band, "Host check");
            let event = NotificationEvent {
                host: host.to_string(),
                facts: fetched.facts.clone(),
                band: evaluation.band,
                days_remaining: evaluation.days_remaining,
                timestamp: now,
            };
            match dispatcher.dispatch(&event).await {
                Ok(()) => {
                    record.last_notified_severity = Some(evaluation.band);
                    record.last_notified_at = Some(now);
                    NotificationOutcome::Sent
                }
                Err(e) => {
                    tracing::warn!(
                        host = %host,
                        band = %evaluation.band,
                        error = %e,
                        "Notification not delivered, will retry next check"
                    );
                    NotificationOutcome::Failed(e.to_string())
                }
            }
        } else {
            tracing::debug!(host = %host, band = %evaluation.band, "Notification due but disabled");
            NotificationOutcome::Disabled
        };

        record.facts = Some(fetched.facts.clone());
        record.last_checked_at = Some(now);
        record.updated_at = now;
        if persist {
            tracing::debug!(host = %host, state = "updating", "Host check");
            self.store.save_host_record(&record)?;
        }

        tracing::info!(
            host = %host,
            band = %evaluation.band,
            days_remaining = evaluation.days_remaining,
            not_after = %fetched.facts.not_after,
            chain_valid = fetched.facts.chain_valid,
            notification = ?notification,
            "Certificate checked"
        );

        Ok(HostCheckReport {
            host: host.to_string(),
            fetched,
            evaluation,
            notification,
            record,
        })
    }

    /// Checks every host concurrently, at most `max_concurrent` at a time.
    /// A failure or panic in one host's task does not affect the others.
    pub async fn run_batch(self: &Arc<Self>, hosts: &[String]) -> BatchSummary {
        tracing::info!(count = hosts.len(), "Checking certificates");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(hosts.len());

        for host in hosts {
            let semaphore = semaphore.clone();
            let scheduler = self.clone();
            let task_host = host.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                Some(scheduler.check_host(&task_host).await)
            });
            handles.push((host.clone(), handle));
        }

        let mut summary = BatchSummary::default();
        for (host, handle) in handles {
            match handle.await {
                Ok(Some(Ok(report))) => {
                    summary.checked += 1;
                    if report.notification == NotificationOutcome::Sent {
                        summary.notified += 1;
                    }
                }
                Ok(Some(Err(CheckError::Storage(e)))) => {
                    summary.failed += 1;
                    tracing::error!(host = %host, error = %e, "Failed to persist host record");
                }
                Ok(Some(Err(CheckError::Fetch(_)))) | Ok(None) => summary.failed += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(host = %host, error = %e, "Certificate check task panicked");
                }
            }
        }

        tracing::info!(
            checked = summary.checked,
            failed = summary.failed,
            notified = summary.notified,
            "Certificate check batch finished"
        );
        summary
    }

    /// Runs a batch immediately and then every `period` until `shutdown`
    /// flips to `true`. A batch already started always runs to completion.
    pub async fn run(
        self: Arc<Self>,
        hosts: Vec<String>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::info!(
            hosts = hosts.len(),
            interval_secs = period.as_secs(),
            max_concurrent = self.max_concurrent,
            notifications = self.notifications_enabled(),
            "Certificate check scheduler started"
        );

        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.run_batch(&hosts).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Certificate check scheduler stopped");
    }
}
