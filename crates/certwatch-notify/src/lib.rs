//! Certificate alert delivery.
//!
//! A [`NotificationEvent`](certwatch_common::types::NotificationEvent) is
//! rendered into a subject and body by [`render`], then handed to the
//! [`dispatcher::AlertDispatcher`], which sends it to every recipient through
//! a [`NotificationChannel`]. All sends in the process pass through one
//! [`gate::DispatchGate`], which keeps a minimum spacing between them.
//! Built-in channels are email (SMTP) and webhook.

pub mod channels;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod plugin;
pub mod render;
pub mod utils;


use async_trait::async_trait;

/// A transport that delivers one message to one recipient (e.g. SMTP,
/// webhook).
///
/// Implementations are created by the corresponding [`plugin::ChannelPlugin`].
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Delivers `subject` and `body` to `recipient`.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails after the channel's own retries.
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> error::Result<()>;

    /// Returns the channel type name (e.g., `"email"`, `"webhook"`).
    fn channel_name(&self) -> &str;
}
