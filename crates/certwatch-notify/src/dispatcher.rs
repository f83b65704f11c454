use crate::error::DispatchFailure;
use crate::gate::DispatchGate;
use crate::render::render_message;
use crate::NotificationChannel;
use certwatch_common::types::NotificationEvent;
use std::sync::Arc;
use std::time::Duration;

/// Default upper bound for one recipient's delivery.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Renders notification events and delivers them to a fixed recipient list
/// through one channel, admitted by the shared [`DispatchGate`].
pub struct AlertDispatcher {
    channel: Arc<dyn NotificationChannel>,
    recipients: Vec<String>,
    gate: Arc<DispatchGate>,
    send_timeout: Duration,
}

impl AlertDispatcher {
    pub fn new(
        channel: Arc<dyn NotificationChannel>,
        recipients: Vec<String>,
        gate: Arc<DispatchGate>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            channel,
            recipients,
            gate,
            send_timeout,
        }
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn channel_name(&self) -> &str {
        self.channel.channel_name()
    }

    /// Sends `event` to every recipient.
    ///
    /// Every recipient is attempted even if an earlier one fails; the
    /// dispatch only succeeds when all of them accepted the message.
    pub async fn dispatch(&self, event: &NotificationEvent) -> Result<(), DispatchFailure> {
        if self.recipients.is_empty() {
            return Err(DispatchFailure::NoRecipients);
        }

        let message = render_message(event);
        self.gate
            .run(async {
                let mut first_failure = None;
                for recipient in &self.recipients {
                    let outcome = tokio::time::timeout(
                        self.send_timeout,
                        self.channel.send(recipient, &message.subject, &message.body),
                    )
                    .await;

                    let failure = match outcome {
                        Ok(Ok(())) => {
                            tracing::info!(
                                host = %event.host,
                                band = %event.band,
                                channel = self.channel.channel_name(),
                                recipient = %recipient,
                                "Notification sent"
                            );
                            continue;
                        }
                        Ok(Err(e)) => DispatchFailure::Transport {
                            recipient: recipient.clone(),
                            source: e,
                        },
                        Err(_) => DispatchFailure::Timeout {
                            recipient: recipient.clone(),
                            timeout_secs: self.send_timeout.as_secs(),
                        },
                    };

                    tracing::error!(
                        host = %event.host,
                        band = %event.band,
                        channel = self.channel.channel_name(),
                        error = %failure,
                        "Notification delivery failed"
                    );
                    first_failure.get_or_insert(failure);
                }

                match first_failure {
                    Some(failure) => Err(failure),
                    None => Ok(()),
                }
            })
            .await
    }
}
