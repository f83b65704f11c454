/// Errors raised by notification channels and their configuration.
///
/// # Examples
///
/// ```rust
/// use certwatch_notify::error::NotifyError;
///
/// let err = NotifyError::InvalidConfig("missing smtp_host".to_string());
/// assert!(err.to_string().contains("smtp_host"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Channel configuration is missing a required field or contains an invalid value.
    #[error("Notify: invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// The channel type is not registered in the plugin registry.
    #[error("Notify: unknown channel type '{0}'")]
    UnknownChannelType(String),

    /// A recipient address or URL is not usable by the channel.
    #[error("Notify: invalid recipient '{0}'")]
    InvalidRecipient(String),

    /// An HTTP request to an external notification endpoint failed.
    #[error("Notify: HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// SMTP transport error when sending email.
    #[error("Notify: SMTP error: {0}")]
    SmtpError(String),

    /// JSON serialization or deserialization failed (e.g. channel config parsing).
    #[error("Notify: JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The external API returned a non-success response.
    #[error("Notify: API error from {service}: status={status}, body={body}")]
    ApiError {
        service: String,
        status: u16,
        body: String,
    },
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Why a dispatch did not reach every recipient. A failed dispatch leaves
/// the host's notification state untouched so it is retried on the next tick.
#[derive(Debug, thiserror::Error)]
pub enum DispatchFailure {
    #[error("no recipients configured")]
    NoRecipients,

    #[error("delivery to {recipient} failed: {source}")]
    Transport {
        recipient: String,
        #[source]
        source: NotifyError,
    },

    #[error("delivery to {recipient} timed out after {timeout_secs}s")]
    Timeout { recipient: String, timeout_secs: u64 },
}
