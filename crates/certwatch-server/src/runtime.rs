use crate::cert::fetcher::{CertFetcher, TlsCertFetcher};
use crate::cert::scheduler::{CertCheckScheduler, CheckError, HostCheckReport};
use crate::config::{ConfigError, NotificationConfig, ServerConfig};
use anyhow::Context;
use certwatch_notify::dispatcher::AlertDispatcher;
use certwatch_notify::gate::DispatchGate;
use certwatch_notify::plugin::ChannelRegistry;
use certwatch_storage::HostStore;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How the process runs, decided once from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Periodic checks of every configured host until shut down.
    Scheduled,
    /// One on-demand check. Without `notify` nothing is dispatched and
    /// notification state is never advanced. `recipients` overrides the
    /// configured list when non-empty.
    SingleHost {
        host: String,
        notify: bool,
        recipients: Vec<String>,
    },
    /// Print stored host records.
    List,
}

impl ExecutionMode {
    pub fn requires_hosts(&self) -> bool {
        matches!(self, ExecutionMode::Scheduled)
    }
}

/// Builds the dispatcher for `notification`, validating channel config and
/// recipients. `recipients` replaces the configured list when non-empty.
pub fn build_dispatcher(
    notification: &NotificationConfig,
    recipients: &[String],
    gate: Arc<DispatchGate>,
) -> Result<AlertDispatcher, ConfigError> {
    let recipients = if recipients.is_empty() {
        notification.recipients.clone()
    } else {
        recipients.to_vec()
    };
    notification.validate(&recipients)?;

    let channel = ChannelRegistry::default().create_channel(
        &notification.channel_type,
        &notification.config,
        &recipients,
    )?;
    Ok(AlertDispatcher::new(
        channel,
        recipients,
        gate,
        Duration::from_secs(notification.send_timeout_secs),
    ))
}

/// Process-wide context: owns the store, the dispatch gate, the scheduler
/// and the background check loop.
pub struct Runtime {
    hosts: Vec<String>,
    interval: Duration,
    scheduler: Arc<CertCheckScheduler>,
    gate: Arc<DispatchGate>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Wires real components for `mode` from `config`.
    pub fn build(config: &ServerConfig, mode: &ExecutionMode) -> anyhow::Result<Self> {
        let store = Arc::new(
            HostStore::new(Path::new(&config.data_dir))
                .with_context(|| format!("Failed to open host store in {}", config.data_dir))?,
        );
        let fetcher: Arc<dyn CertFetcher> = Arc::new(TlsCertFetcher::new(
            config.check.port,
            Duration::from_secs(config.check.connect_timeout_secs),
        )?);

        let min_interval = config
            .notification
            .as_ref()
            .map(|n| Duration::from_millis(n.min_interval_ms))
            .unwrap_or(certwatch_notify::gate::DEFAULT_MIN_INTERVAL);
        let gate = Arc::new(DispatchGate::new(min_interval));

        let dispatcher = match mode {
            ExecutionMode::Scheduled => match &config.notification {
                Some(notification) => Some(build_dispatcher(notification, &[], gate.clone())?),
                None => {
                    tracing::warn!("No notification section configured, alerts are disabled");
                    None
                }
            },
            ExecutionMode::SingleHost {
                notify: true,
                recipients,
                ..
            } => {
                let notification = config
                    .notification
                    .as_ref()
                    .ok_or(ConfigError::NotificationMissing)?;
                Some(build_dispatcher(notification, recipients, gate.clone())?)
            }
            ExecutionMode::SingleHost { notify: false, .. } | ExecutionMode::List => None,
        };

        if let (Some(dispatcher), Some(notification)) = (&dispatcher, &config.notification) {
            tracing::info!(
                channel = dispatcher.channel_name(),
                recipients = dispatcher.recipients().len(),
                config = %notification.redacted_config(),
                "Notifications enabled"
            );
        }

        Ok(Self::from_parts(
            config,
            store,
            fetcher,
            dispatcher.map(Arc::new),
            gate,
        ))
    }

    /// Assembles a runtime from already-built components.
    pub fn from_parts(
        config: &ServerConfig,
        store: Arc<HostStore>,
        fetcher: Arc<dyn CertFetcher>,
        dispatcher: Option<Arc<AlertDispatcher>>,
        gate: Arc<DispatchGate>,
    ) -> Self {
        let scheduler = Arc::new(CertCheckScheduler::new(
            store,
            fetcher,
            dispatcher,
            config.thresholds,
            config.check.max_concurrent,
        ));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            hosts: config.hosts.clone(),
            interval: Duration::from_secs(config.check.interval_secs),
            scheduler,
            gate,
            shutdown_tx,
            task: None,
        }
    }

    pub fn scheduler(&self) -> &Arc<CertCheckScheduler> {
        &self.scheduler
    }

    pub fn store(&self) -> &Arc<HostStore> {
        self.scheduler.store()
    }

    pub fn gate(&self) -> &Arc<DispatchGate> {
        &self.gate
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// One on-demand check. Configured hosts go through the normal path and
    /// their record is stored; any other host is evaluated the same way but
    /// nothing is written.
    pub async fn check_once(&self, host: &str) -> Result<HostCheckReport, CheckError> {
        if self.hosts.iter().any(|h| h == host) {
            self.store().ensure_hosts(&self.hosts, Utc::now())?;
            self.scheduler.check_host(host).await
        } else {
            tracing::info!(host = %host, "Host is not configured, result will not be stored");
            self.scheduler.check_host_unrecorded(host).await
        }
    }

    /// Registers configured hosts and starts the check loop. The first batch
    /// runs immediately.
    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.task.is_some() {
            anyhow::bail!("runtime already started");
        }
        self.store()
            .ensure_hosts(&self.hosts, Utc::now())
            .context("Failed to register hosts")?;

        let scheduler = self.scheduler.clone();
        let hosts = self.hosts.clone();
        let interval = self.interval;
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.task = Some(tokio::spawn(async move {
            scheduler.run(hosts, interval, shutdown_rx).await;
        }));
        Ok(())
    }

    /// Stops scheduling new batches and waits for the current one to finish.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Scheduler task ended abnormally");
            }
        }
    }
}

/// Resolves when the process receives Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to create SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
