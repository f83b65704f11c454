use crate::runtime::ExecutionMode;
use certwatch_common::types::{BandThresholds, ThresholdError};
use certwatch_notify::error::NotifyError;
use certwatch_notify::plugin::ChannelRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Config file used when `--config` is not given and the file exists.
pub const DEFAULT_CONFIG_PATH: &str = "certwatch.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("environment variable {var} has invalid value '{value}'")]
    InvalidEnv { var: &'static str, value: String },

    #[error("no hosts configured (set `hosts` or CERTWATCH_HOSTS)")]
    NoHosts,

    #[error(transparent)]
    Thresholds(#[from] ThresholdError),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("notifications are not configured (add a [notification] section or CERTWATCH_SMTP_* variables)")]
    NotificationMissing,

    #[error("notification section has no recipients")]
    NoRecipients,

    #[error("invalid notification settings: {0}")]
    Notification(#[from] NotifyError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub check: CheckConfig,
    #[serde(default)]
    pub thresholds: BandThresholds,
    /// Absent means notifications are disabled.
    #[serde(default)]
    pub notification: Option<NotificationConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            port: default_port(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_channel_type")]
    pub channel_type: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Minimum spacing between two outbound notifications.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// Channel-specific settings, passed to the channel plugin as JSON.
    #[serde(default)]
    pub config: Value,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_type: default_channel_type(),
            recipients: Vec::new(),
            min_interval_ms: default_min_interval_ms(),
            send_timeout_secs: default_send_timeout_secs(),
            config: Value::Object(serde_json::Map::new()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Check log appended to in addition to stderr.
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            hosts: Vec::new(),
            check: CheckConfig::default(),
            thresholds: BandThresholds::default(),
            notification: None,
            logging: LoggingConfig::default(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_interval_secs() -> u64 {
    86400
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_port() -> u16 {
    443
}

fn default_max_concurrent() -> usize {
    10
}

fn default_channel_type() -> String {
    "email".to_string()
}

fn default_min_interval_ms() -> u64 {
    2000
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
    })
}

const SMTP_VARS: [(&str, &str); 6] = [
    ("CERTWATCH_SMTP_HOST", "smtp_host"),
    ("CERTWATCH_SMTP_PORT", "smtp_port"),
    ("CERTWATCH_SMTP_USERNAME", "smtp_username"),
    ("CERTWATCH_SMTP_PASSWORD", "smtp_password"),
    ("CERTWATCH_SMTP_FROM", "from"),
    ("CERTWATCH_SMTP_TLS", "tls"),
];

impl ServerConfig {
    /// Parses a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `path` if given, otherwise [`DEFAULT_CONFIG_PATH`] when it exists,
    /// otherwise defaults. Environment overrides are applied on top.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Overlays `CERTWATCH_*` variables read through `lookup`.
    ///
    /// Any SMTP variable creates an email notification section when none is
    /// configured; SMTP variables are ignored for other channel types.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CERTWATCH_HOSTS") {
            self.hosts = split_list(&v);
        }
        if let Some(v) = lookup("CERTWATCH_DATA_DIR") {
            self.data_dir = v;
        }
        if let Some(v) = lookup("CERTWATCH_INTERVAL_SECS") {
            self.check.interval_secs = parse_env("CERTWATCH_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("CERTWATCH_TIMEOUT_SECS") {
            self.check.connect_timeout_secs = parse_env("CERTWATCH_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("CERTWATCH_WARN30_DAYS") {
            self.thresholds.warn30_days = parse_env("CERTWATCH_WARN30_DAYS", &v)?;
        }
        if let Some(v) = lookup("CERTWATCH_WARN15_DAYS") {
            self.thresholds.warn15_days = parse_env("CERTWATCH_WARN15_DAYS", &v)?;
        }
        if let Some(v) = lookup("CERTWATCH_WARN7_DAYS") {
            self.thresholds.warn7_days = parse_env("CERTWATCH_WARN7_DAYS", &v)?;
        }
        if let Some(v) = lookup("CERTWATCH_LOG_FILE") {
            self.logging.file = Some(v).filter(|v| !v.trim().is_empty());
        }

        let smtp: Vec<(&'static str, &'static str, String)> = SMTP_VARS
            .iter()
            .filter_map(|(var, key)| lookup(var).map(|v| (*var, *key, v)))
            .collect();
        let recipients = lookup("CERTWATCH_RECIPIENTS").map(|v| split_list(&v));

        if smtp.is_empty() && recipients.is_none() {
            return Ok(());
        }

        let notification = self
            .notification
            .get_or_insert_with(NotificationConfig::default);
        if let Some(recipients) = recipients {
            notification.recipients = recipients;
        }
        if notification.channel_type == "email" && !smtp.is_empty() {
            if !notification.config.is_object() {
                notification.config = Value::Object(serde_json::Map::new());
            }
            if let Some(obj) = notification.config.as_object_mut() {
                for (var, key, value) in smtp {
                    let value = if key == "smtp_port" {
                        Value::from(parse_env::<u16>(var, &value)?)
                    } else {
                        Value::String(value)
                    };
                    obj.insert(key.to_string(), value);
                }
            }
        }
        Ok(())
    }

    /// Checks the settings `mode` needs. Hosts and the configured recipient
    /// list only matter for scheduled runs; `check --notify` validates its
    /// effective recipients when the dispatcher is built.
    pub fn validate(&self, mode: &ExecutionMode) -> Result<(), ConfigError> {
        if mode.requires_hosts() && self.hosts.is_empty() {
            return Err(ConfigError::NoHosts);
        }
        self.thresholds.validate()?;
        if self.check.interval_secs == 0 {
            return Err(ConfigError::Zero {
                field: "check.interval_secs",
            });
        }
        if self.check.connect_timeout_secs == 0 {
            return Err(ConfigError::Zero {
                field: "check.connect_timeout_secs",
            });
        }
        if self.check.max_concurrent == 0 {
            return Err(ConfigError::Zero {
                field: "check.max_concurrent",
            });
        }
        if *mode == ExecutionMode::Scheduled {
            if let Some(notification) = &self.notification {
                notification.validate(&notification.recipients)?;
            }
        }
        Ok(())
    }
}

impl NotificationConfig {
    /// Validates the channel settings against `recipients`.
    pub fn validate(&self, recipients: &[String]) -> Result<(), ConfigError> {
        if recipients.is_empty() {
            return Err(ConfigError::NoRecipients);
        }
        if self.send_timeout_secs == 0 {
            return Err(ConfigError::Zero {
                field: "notification.send_timeout_secs",
            });
        }
        let registry = ChannelRegistry::default();
        let plugin = registry
            .get_plugin(&self.channel_type)
            .ok_or_else(|| NotifyError::UnknownChannelType(self.channel_type.clone()))?;
        plugin.validate_config(&self.config)?;
        for recipient in recipients {
            plugin.validate_recipient(recipient)?;
        }
        Ok(())
    }

    /// Config with secrets masked, for logging.
    pub fn redacted_config(&self) -> Value {
        ChannelRegistry::default()
            .get_plugin(&self.channel_type)
            .map(|plugin| plugin.redact_config(&self.config))
            .unwrap_or_else(|| certwatch_notify::utils::redact_sensitive_json(&self.config))
    }
}
