use crate::error::{NotifyError, Result};
use crate::plugin::ChannelPlugin;
use crate::utils::{retry_backoff, SEND_ATTEMPTS};
use crate::NotificationChannel;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Implicit TLS (SMTPS) port.
pub const SMTPS_PORT: u16 = 465;

fn default_smtp_port() -> u16 {
    587
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpTls {
    /// Plaintext greeting upgraded with STARTTLS (submission, port 587).
    Starttls,
    /// TLS from the first byte (SMTPS, port 465).
    Wrapper,
    /// No encryption. Only for local relays.
    None,
}

/// SMTP settings for the email channel.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from: String,
    /// Defaults to `wrapper` on port 465 and `starttls` everywhere else.
    #[serde(default)]
    pub tls: Option<SmtpTls>,
}

impl EmailConfig {
    pub fn tls_mode(&self) -> SmtpTls {
        match self.tls {
            Some(mode) => mode,
            None if self.smtp_port == SMTPS_PORT => SmtpTls::Wrapper,
            None => SmtpTls::Starttls,
        }
    }
}

pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailChannel {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| NotifyError::InvalidConfig(format!("invalid from address '{}': {e}", config.from)))?;

        let builder = match config.tls_mode() {
            SmtpTls::Wrapper => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host),
            SmtpTls::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            }
            SmtpTls::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                &config.smtp_host,
            )),
        };
        let mut builder = builder
            .map_err(|e| NotifyError::SmtpError(e.to_string()))?
            .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, recipient: &str, subject: &str, body: &str) -> Result<Message> {
        let to: Mailbox = recipient
            .parse()
            .map_err(|_| NotifyError::InvalidRecipient(recipient.to_string()))?;
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| NotifyError::SmtpError(e.to_string()))
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        let email = self.build_message(recipient, subject, body)?;

        let mut last_err = None;
        for attempt in 0..SEND_ATTEMPTS {
            match self.transport.send(email.clone()).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        recipient = %recipient,
                        error = %e,
                        "Email send failed, retrying"
                    );
                    last_err = Some(e);
                    if attempt + 1 < SEND_ATTEMPTS {
                        tokio::time::sleep(retry_backoff(attempt)).await;
                    }
                }
            }
        }

        let message = last_err.map(|e| e.to_string()).unwrap_or_default();
        Err(NotifyError::SmtpError(message))
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}

// Plugin

pub struct EmailPlugin;

impl EmailPlugin {
    fn parse_config(config: &Value) -> Result<EmailConfig> {
        let cfg: EmailConfig = serde_json::from_value(config.clone())
            .map_err(|e| NotifyError::InvalidConfig(format!("email: {e}")))?;
        if cfg.smtp_host.trim().is_empty() {
            return Err(NotifyError::InvalidConfig("email: smtp_host is empty".into()));
        }
        Ok(cfg)
    }
}

impl ChannelPlugin for EmailPlugin {
    fn name(&self) -> &str {
        "email"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        let cfg = Self::parse_config(config)?;
        cfg.from
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::InvalidConfig(format!("email: invalid from address: {e}")))?;
        Ok(())
    }

    fn validate_recipient(&self, recipient: &str) -> Result<()> {
        recipient
            .parse::<Mailbox>()
            .map(|_| ())
            .map_err(|_| NotifyError::InvalidRecipient(recipient.to_string()))
    }

    fn create_channel(&self, config: &Value) -> Result<Arc<dyn NotificationChannel>> {
        let cfg = Self::parse_config(config)?;
        Ok(Arc::new(EmailChannel::new(&cfg)?))
    }

    fn redact_config(&self, config: &Value) -> Value {
        let mut redacted = config.clone();
        if let Some(obj) = redacted.as_object_mut() {
            if obj.contains_key("smtp_password") {
                obj.insert(
                    "smtp_password".to_string(),
                    Value::String("***".to_string()),
                );
            }
        }
        redacted
    }
}
