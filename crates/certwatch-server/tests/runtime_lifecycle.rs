mod common;

use certwatch_common::types::SeverityBand;
use certwatch_server::config::{ConfigError, NotificationConfig, ServerConfig};
use certwatch_server::runtime::{build_dispatcher, ExecutionMode, Runtime};
use common::TestContext;
use std::sync::Arc;
use std::time::Duration;

fn config_for(ctx: &TestContext, hosts: &[&str]) -> ServerConfig {
    ServerConfig {
        data_dir: ctx.temp_dir.path().display().to_string(),
        hosts: hosts.iter().map(|h| h.to_string()).collect(),
        ..Default::default()
    }
}

fn webhook_notification() -> NotificationConfig {
    NotificationConfig {
        channel_type: "webhook".into(),
        recipients: vec!["https://hooks.example.com/certs".into()],
        ..Default::default()
    }
}

#[tokio::test]
async fn start_runs_first_batch_immediately_and_shutdown_stops() {
    let ctx = TestContext::new();
    ctx.fetcher.set_days("a.example", 20);
    ctx.fetcher.set_days("b.example", 50);
    let config = config_for(&ctx, &["a.example", "b.example", "down.example"]);

    let mut runtime = Runtime::from_parts(
        &config,
        ctx.store.clone(),
        ctx.fetcher.clone(),
        Some(ctx.dispatcher()),
        ctx.gate.clone(),
    );
    runtime.start().unwrap();
    assert!(runtime.start().is_err(), "second start must be rejected");

    // Every configured host is registered, even one that cannot be reached.
    assert_eq!(ctx.store.list_host_records().unwrap().len(), 3);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let a = ctx.store.get_host_record("a.example").unwrap().unwrap();
        let b = ctx.store.get_host_record("b.example").unwrap().unwrap();
        if a.last_checked_at.is_some() && b.last_checked_at.is_some() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "first batch never ran");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    runtime.shutdown().await;
    assert!(!runtime.is_running());
    assert_eq!(ctx.channel.count(), 1);

    let down = ctx.store.get_host_record("down.example").unwrap().unwrap();
    assert!(down.facts.is_none());
    assert!(down.last_checked_at.is_none());
}

#[tokio::test]
async fn single_host_notify_requires_notification_section() {
    let ctx = TestContext::new();
    let config = config_for(&ctx, &[]);
    let mode = ExecutionMode::SingleHost {
        host: "a.example".into(),
        notify: true,
        recipients: vec![],
    };

    let err = Runtime::build(&config, &mode).err().unwrap();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::NotificationMissing)
    ));
}

#[tokio::test]
async fn single_host_without_notify_disables_dispatch() {
    let ctx = TestContext::new();
    let mut config = config_for(&ctx, &[]);
    config.notification = Some(webhook_notification());
    let mode = ExecutionMode::SingleHost {
        host: "a.example".into(),
        notify: false,
        recipients: vec![],
    };

    let runtime = Runtime::build(&config, &mode).unwrap();
    assert!(!runtime.scheduler().notifications_enabled());
}

#[tokio::test]
async fn scheduled_mode_enables_configured_notifications() {
    let ctx = TestContext::new();
    let mut config = config_for(&ctx, &["a.example"]);
    config.notification = Some(webhook_notification());

    let runtime = Runtime::build(&config, &ExecutionMode::Scheduled).unwrap();
    assert!(runtime.scheduler().notifications_enabled());
    assert_eq!(runtime.gate().min_interval(), Duration::from_millis(2000));
}

#[test]
fn recipient_override_replaces_configured_list() {
    let gate = Arc::new(certwatch_notify::gate::DispatchGate::default());
    let notification = webhook_notification();

    let dispatcher = build_dispatcher(&notification, &[], gate.clone()).unwrap();
    assert_eq!(dispatcher.recipients(), ["https://hooks.example.com/certs"]);

    let overridden = vec!["https://other.example.com/hook".to_string()];
    let dispatcher = build_dispatcher(&notification, &overridden, gate.clone()).unwrap();
    assert_eq!(dispatcher.recipients(), overridden.as_slice());

    let bad = vec!["mailto:ops@example.com".to_string()];
    assert!(build_dispatcher(&notification, &bad, gate).is_err());
}

#[tokio::test]
async fn shutdown_during_batch_lets_started_checks_finish() {
    let ctx = TestContext::new();
    ctx.fetcher.set_days("a.example", 20);
    let release = ctx.fetcher.hold();
    let mut config = config_for(&ctx, &["a.example"]);
    config.check.interval_secs = 1;

    let mut runtime = Runtime::from_parts(
        &config,
        ctx.store.clone(),
        ctx.fetcher.clone(),
        Some(ctx.dispatcher()),
        ctx.gate.clone(),
    );
    runtime.start().unwrap();
    ctx.fetcher.wait_started().await;

    let stopping = tokio::spawn(async move {
        runtime.shutdown().await;
        runtime
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!stopping.is_finished(), "shutdown must wait for the running check");

    release.notify_one();
    let runtime = tokio::time::timeout(Duration::from_secs(5), stopping)
        .await
        .unwrap()
        .unwrap();
    assert!(!runtime.is_running());

    let record = ctx.store.get_host_record("a.example").unwrap().unwrap();
    assert!(record.last_checked_at.is_some());
    assert_eq!(ctx.channel.count(), 1);

    // Past the next tick: no further batch was started.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(ctx.fetcher.calls(), 1);
}

#[tokio::test]
async fn check_once_stores_only_configured_hosts() {
    let ctx = TestContext::new();
    ctx.fetcher.set_days("a.example", 20);
    ctx.fetcher.set_days("adhoc.example", 20);
    let config = config_for(&ctx, &["a.example"]);
    let runtime = Runtime::from_parts(
        &config,
        ctx.store.clone(),
        ctx.fetcher.clone(),
        None,
        ctx.gate.clone(),
    );

    let report = runtime.check_once("adhoc.example").await.unwrap();
    assert_eq!(report.evaluation.band, SeverityBand::Warn30);
    assert!(ctx.store.get_host_record("adhoc.example").unwrap().is_none());

    runtime.check_once("a.example").await.unwrap();
    let hosts: Vec<String> = ctx
        .store
        .list_host_records()
        .unwrap()
        .into_iter()
        .map(|r| r.host)
        .collect();
    assert_eq!(hosts, vec!["a.example"]);
}

#[tokio::test]
async fn notify_override_supplies_missing_recipients() {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let ctx = TestContext::new();
    let mut config = config_for(&ctx, &[]);
    config.notification = Some(NotificationConfig {
        config: serde_json::json!({
            "smtp_host": "smtp.example.com",
            "from": "certwatch@example.com"
        }),
        ..Default::default()
    });

    let with_override = ExecutionMode::SingleHost {
        host: "a.example".into(),
        notify: true,
        recipients: vec!["ops@example.com".into()],
    };
    config.validate(&with_override).unwrap();
    let runtime = Runtime::build(&config, &with_override).unwrap();
    assert!(runtime.scheduler().notifications_enabled());

    let without = ExecutionMode::SingleHost {
        host: "a.example".into(),
        notify: true,
        recipients: vec![],
    };
    let err = Runtime::build(&config, &without).err().unwrap();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::NoRecipients)
    ));

    let diagnostic = ExecutionMode::SingleHost {
        host: "a.example".into(),
        notify: false,
        recipients: vec![],
    };
    config.validate(&diagnostic).unwrap();
    assert!(!Runtime::build(&config, &diagnostic)
        .unwrap()
        .scheduler()
        .notifications_enabled());
    config.validate(&ExecutionMode::List).unwrap();
}
