use anyhow::{Context, Result};
use certwatch_common::types::HostRecord;
use certwatch_server::cert::scheduler::HostCheckReport;
use certwatch_server::config::ServerConfig;
use certwatch_server::logging;
use certwatch_server::runtime::{self, ExecutionMode, Runtime};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// certwatch - TLS certificate expiry monitor
#[derive(Parser, Debug)]
#[command(name = "certwatch-server", version)]
#[command(about = "Monitors TLS certificate expiry and sends alerts", long_about = None)]
struct Cli {
    /// Configuration file (default: ./certwatch.toml when present)
    #[arg(short, long, env = "CERTWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check all configured hosts now and then on every interval (default)
    Run,
    /// Check a single host once and print the result
    Check {
        host: String,
        /// Send a notification if one is due
        #[arg(long)]
        notify: bool,
        /// Override the configured recipients (repeatable)
        #[arg(long = "to", value_name = "RECIPIENT")]
        to: Vec<String>,
    },
    /// Print the stored state of every host
    List,
}

impl Command {
    fn into_mode(self) -> ExecutionMode {
        match self {
            Command::Run => ExecutionMode::Scheduled,
            Command::Check { host, notify, to } => ExecutionMode::SingleHost {
                host,
                notify,
                recipients: to,
            },
            Command::List => ExecutionMode::List,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install default CryptoProvider: {e:?}"))?;

    let cli = Cli::parse();
    let mode = cli.command.unwrap_or(Command::Run).into_mode();

    let config = ServerConfig::resolve(cli.config.as_deref()).context("Failed to load config")?;
    let _log_guard = logging::init(&config.logging)?;
    config.validate(&mode)?;

    tracing::info!(
        data_dir = %config.data_dir,
        hosts = config.hosts.len(),
        mode = ?mode,
        "certwatch starting"
    );

    let mut runtime = Runtime::build(&config, &mode)?;

    match mode {
        ExecutionMode::Scheduled => {
            runtime.start()?;
            runtime::shutdown_signal().await;
            runtime.shutdown().await;
            tracing::info!("certwatch stopped");
        }
        ExecutionMode::SingleHost { host, .. } => {
            let report = runtime
                .check_once(&host)
                .await
                .with_context(|| format!("Check of {host} failed"))?;
            print_report(&report);
        }
        ExecutionMode::List => {
            let records = runtime.store().list_host_records()?;
            print_records(&records);
        }
    }

    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_report(report: &HostCheckReport) {
    let facts = &report.fetched.facts;
    println!("Host:              {}", report.host);
    println!("Band:              {}", report.evaluation.band);
    println!("Days remaining:    {}", report.evaluation.days_remaining);
    println!("Not before:        {}", facts.not_before.to_rfc3339());
    println!("Not after:         {}", facts.not_after.to_rfc3339());
    println!(
        "Issuer:            {} (CN={})",
        facts.issuer.display_name(),
        facts.issuer.common_name
    );
    println!("Subject:           {}", facts.subject.common_name);
    println!("Alternative names: {}", facts.subject_alt_names.join(", "));
    println!("Serial:            {}", facts.serial_number);
    println!("SHA-256:           {}", facts.fingerprint_sha256);
    println!(
        "Key:               {} {}",
        facts.public_key_algorithm,
        facts
            .public_key_bits
            .map(|b| format!("{b} bits"))
            .unwrap_or_default()
    );
    println!("Signature:         {}", facts.signature_algorithm);
    match &report.fetched.chain_error {
        None => println!("Chain valid:       yes"),
        Some(reason) => println!("Chain valid:       no ({reason})"),
    }
    if let Some(version) = &report.fetched.tls_version {
        println!("TLS:               {version}");
    }
    println!("Renewal:           {}", report.evaluation.is_renewal);
    println!("Notification:      {:?}", report.notification);
}

#[allow(clippy::print_stdout)]
fn print_records(records: &[HostRecord]) {
    println!(
        "{:<40} {:<9} {:<26} {:<9} {:<26}",
        "HOST", "DAYS", "NOT AFTER", "NOTIFIED", "LAST CHECKED"
    );
    let now = Utc::now();
    for record in records {
        let (days, not_after) = match &record.facts {
            Some(facts) => (
                facts.days_remaining(now).to_string(),
                facts.not_after.to_rfc3339(),
            ),
            None => ("-".to_string(), "-".to_string()),
        };
        println!(
            "{:<40} {:<9} {:<26} {:<9} {:<26}",
            record.host,
            days,
            not_after,
            record
                .last_notified_severity
                .map(|b| b.to_string())
                .unwrap_or_else(|| "-".to_string()),
            record
                .last_checked_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
        );
    }
}
