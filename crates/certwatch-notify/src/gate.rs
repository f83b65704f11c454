use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default minimum spacing between two outbound notifications.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(2);

/// Process-wide serialization point for outbound notifications.
///
/// Callers are admitted one at a time in arrival order (the underlying tokio
/// mutex is fair). Each admitted send starts no earlier than `min_interval`
/// after the previous one started; the wait is a plain sleep, nothing is
/// queued or dropped.
pub struct DispatchGate {
    min_interval: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl DispatchGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_start: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Runs `send` once the gate admits it.
    pub async fn run<F, T>(&self, send: F) -> T
    where
        F: Future<Output = T>,
    {
        let mut last_start = self.last_start.lock().await;
        if let Some(previous) = *last_start {
            let ready_at = previous + self.min_interval;
            let wait = ready_at.saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                tracing::debug!(wait_ms = wait.as_millis() as u64, "Dispatch gate delaying send");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last_start = Some(Instant::now());
        send.await
    }
}

impl Default for DispatchGate {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}
