/// Notification sender collaborator
///
/// Outbound notifications (trial-ending alerts, quota-exhaustion notices)
/// are fire-and-forget: delivery mechanics live outside this system, and a
/// send failure is logged but never fatal to the caller. The reconciler in
/// particular must not let one firm's failed alert abort a sweep.
///
/// # Example
///
/// ```
/// use chambers_shared::notify::{LogSender, NotificationChannel, NotificationSender, Template};
/// use uuid::Uuid;
///
/// # async fn example() {
/// let sender = LogSender;
/// sender
///     .send(
///         NotificationChannel::Email,
///         Uuid::new_v4(),
///         Template::TrialEnding { days_left: 3 },
///     )
///     .await;
/// # }
/// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QuotaKind;

/// Delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    /// Email to the firm's billing contacts
    Email,

    /// In-app notification feed
    InApp,
}

/// What the notification says
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// The firm's trial ends in `days_left` days
    TrialEnding {
        /// Days until the trial ends
        days_left: i64,
    },

    /// A quota ceiling was hit
    QuotaExhausted {
        /// Which ceiling
        kind: QuotaKind,
    },

    /// The subscription entered read-only mode
    ReadOnlyEntered,
}

/// Fire-and-forget notification sender
///
/// Implementations swallow their own failures (logging them); `send` has no
/// error channel on purpose.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Sends one notification to a firm
    async fn send(&self, channel: NotificationChannel, firm_id: Uuid, template: Template);
}

/// Sender that only logs, for deployments without a delivery backend
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(&self, channel: NotificationChannel, firm_id: Uuid, template: Template) {
        tracing::info!(
            firm_id = %firm_id,
            ?channel,
            ?template,
            "Notification dispatched (log only)"
        );
    }
}

/// Recording sender for tests
#[derive(Default)]
pub struct RecordingSender {
    sent: std::sync::Mutex<Vec<(NotificationChannel, Uuid, Template)>>,
}

impl RecordingSender {
    /// Creates an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications sent so far, in order
    pub fn sent(&self) -> Vec<(NotificationChannel, Uuid, Template)> {
        self.sent.lock().expect("recording sender lock").clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, channel: NotificationChannel, firm_id: Uuid, template: Template) {
        self.sent
            .lock()
            .expect("recording sender lock")
            .push((channel, firm_id, template));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_sender_captures_order() {
        let sender = RecordingSender::new();
        let firm = Uuid::new_v4();

        sender
            .send(
                NotificationChannel::Email,
                firm,
                Template::TrialEnding { days_left: 3 },
            )
            .await;
        sender
            .send(
                NotificationChannel::InApp,
                firm,
                Template::QuotaExhausted {
                    kind: QuotaKind::Storage,
                },
            )
            .await;

        let sent = sender.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].2, Template::TrialEnding { days_left: 3 });
        assert_eq!(sent[1].0, NotificationChannel::InApp);
    }
}
