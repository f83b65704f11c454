use crate::error::{NotifyError, Result};
use crate::plugin::ChannelPlugin;
use crate::utils::{retry_backoff, truncate_string, MAX_BODY_LENGTH, SEND_ATTEMPTS};
use crate::NotificationChannel;
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Posts each notification as JSON to the recipient URL.
pub struct WebhookChannel {
    client: reqwest::Client,
    body_template: Option<String>,
}

/// Escapes `s` for use inside a JSON string literal.
fn json_escape(s: &str) -> String {
    let quoted = Value::String(s.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

impl WebhookChannel {
    pub fn new(body_template: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            body_template,
        }
    }

    /// `{{subject}}` and `{{body}}` in the template are replaced with the
    /// JSON-escaped message parts. Without a template the payload is
    /// `{"subject": ..., "text": ...}`.
    fn render_body(&self, subject: &str, body: &str) -> String {
        match &self.body_template {
            Some(template) => template
                .replace("{{subject}}", &json_escape(subject))
                .replace("{{body}}", &json_escape(body)),
            None => serde_json::json!({
                "subject": subject,
                "text": body,
            })
            .to_string(),
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        let payload = self.render_body(subject, body);

        let mut last_err = None;
        for attempt in 0..SEND_ATTEMPTS {
            match self
                .client
                .post(recipient)
                .header("Content-Type", "application/json")
                .body(payload.clone())
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    let resp_body = match resp.text().await {
                        Ok(text) => truncate_string(&text, MAX_BODY_LENGTH),
                        Err(e) => format!("[Failed to read response body: {e}]"),
                    };
                    tracing::warn!(
                        attempt = attempt + 1,
                        status = %status,
                        "Webhook returned non-success status, retrying"
                    );
                    last_err = Some(NotifyError::ApiError {
                        service: "webhook".to_string(),
                        status: status.as_u16(),
                        body: resp_body,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        "Webhook send failed, retrying"
                    );
                    last_err = Some(e.into());
                }
            }
            if attempt + 1 < SEND_ATTEMPTS {
                tokio::time::sleep(retry_backoff(attempt)).await;
            }
        }

        Err(last_err.unwrap_or_else(|| NotifyError::InvalidRecipient(recipient.to_string())))
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

// Plugin

#[derive(Debug, Default, Deserialize)]
struct WebhookConfig {
    body_template: Option<String>,
}

pub struct WebhookPlugin;

impl WebhookPlugin {
    fn parse_config(config: &Value) -> Result<WebhookConfig> {
        if config.is_null() {
            return Ok(WebhookConfig::default());
        }
        serde_json::from_value(config.clone())
            .map_err(|e| NotifyError::InvalidConfig(format!("webhook: {e}")))
    }
}

impl ChannelPlugin for WebhookPlugin {
    fn name(&self) -> &str {
        "webhook"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        Self::parse_config(config).map(|_| ())
    }

    fn validate_recipient(&self, recipient: &str) -> Result<()> {
        match Url::parse(recipient) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
            _ => Err(NotifyError::InvalidRecipient(recipient.to_string())),
        }
    }

    fn create_channel(&self, config: &Value) -> Result<Arc<dyn NotificationChannel>> {
        let cfg = Self::parse_config(config)?;
        Ok(Arc::new(WebhookChannel::new(cfg.body_template)))
    }
}
