use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tal_types::{Amount, Discrepancy, LedgerEntry};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Link attached to every ledger notification.
pub const LEDGER_LINK: &str = "/ledger";

/// Link attached to discrepancy notifications.
pub const DISCREPANCY_LINK: &str = "/discrepancies";

/// Number of notifications an inbox retains.
pub const INBOX_CAPACITY: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    TransactionAnomaly,
    HighFraudRisk,
    Discrepancy,
}

/// Notification event pushed to an external sink.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    pub kind: NotificationKind,
    pub link: String,
}

impl Notification {
    pub fn transaction_anomaly(entry: &LedgerEntry) -> Self {
        Self {
            message: format!(
                "Significant transaction #{} for ${}.",
                entry.id,
                entry.amount.canonical()
            ),
            kind: NotificationKind::TransactionAnomaly,
            link: LEDGER_LINK.to_string(),
        }
    }

    pub fn high_fraud_risk(entry: &LedgerEntry, score: u8) -> Self {
        Self {
            message: format!("High fraud risk on transaction #{} (score {score}).", entry.id),
            kind: NotificationKind::HighFraudRisk,
            link: LEDGER_LINK.to_string(),
        }
    }

    pub fn discrepancy(discrepancy: &Discrepancy) -> Self {
        Self {
            message: format!("New high-priority discrepancy #{} flagged.", discrepancy.id),
            kind: NotificationKind::Discrepancy,
            link: DISCREPANCY_LINK.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification channel closed")]
    ChannelClosed,

    #[error("notification inbox lock poisoned")]
    Poisoned,

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Trigger levels for anomaly notifications. Both comparisons are strict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyThresholds {
    pub transaction_threshold: Amount,
    pub high_risk_cutoff: u8,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            transaction_threshold: Amount::from_minor(100_000),
            high_risk_cutoff: 75,
        }
    }
}

impl AnomalyThresholds {
    /// Notifications `entry` triggers, amount check first.
    pub fn evaluate(&self, entry: &LedgerEntry) -> Vec<Notification> {
        let mut out = Vec::new();
        if entry.amount > self.transaction_threshold {
            out.push(Notification::transaction_anomaly(entry));
        }
        out.extend(self.evaluate_fraud(entry));
        out
    }

    /// Only the fraud-score check, for scores attached after the append.
    pub fn evaluate_fraud(&self, entry: &LedgerEntry) -> Option<Notification> {
        let score = entry.fraud_score.as_ref()?.score();
        (score > self.high_risk_cutoff).then(|| Notification::high_fraud_risk(entry, score))
    }
}

/// Destination for notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn deliver(&self, _notification: Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Forwards notifications into an unbounded tokio channel, the boundary to
/// an external queue.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn deliver(&self, notification: Notification) -> Result<(), NotifyError> {
        self.tx
            .send(notification)
            .map_err(|_| NotifyError::ChannelClosed)
    }
}

/// A notification as held by the inbox.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxItem {
    pub id: u64,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
    #[serde(flatten)]
    pub notification: Notification,
}

#[derive(Debug, Default)]
struct InboxState {
    items: VecDeque<InboxItem>,
    next_id: u64,
}

/// Keeps the [`INBOX_CAPACITY`] most recent notifications, newest first.
#[derive(Debug, Default)]
pub struct NotificationInbox {
    state: Mutex<InboxState>,
}

impl NotificationInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, notification: Notification) -> Result<(), NotifyError> {
        let mut state = self.lock()?;
        state.next_id += 1;
        let item = InboxItem {
            id: state.next_id,
            received_at: Utc::now(),
            is_read: false,
            notification,
        };
        state.items.push_front(item);
        state.items.truncate(INBOX_CAPACITY);
        Ok(())
    }

    /// Newest first.
    pub fn items(&self) -> Result<Vec<InboxItem>, NotifyError> {
        Ok(self.lock()?.items.iter().cloned().collect())
    }

    pub fn unread_count(&self) -> Result<usize, NotifyError> {
        Ok(self.lock()?.items.iter().filter(|i| !i.is_read).count())
    }

    pub fn mark_all_read(&self) -> Result<(), NotifyError> {
        for item in self.lock()?.items.iter_mut() {
            item.is_read = true;
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, InboxState>, NotifyError> {
        self.state.lock().map_err(|_| NotifyError::Poisoned)
    }
}

#[async_trait]
impl NotificationSink for NotificationInbox {
    async fn deliver(&self, notification: Notification) -> Result<(), NotifyError> {
        self.push(notification)
    }
}

/// Evaluates appended entries against [`AnomalyThresholds`] and hands
/// matches to a sink.
///
/// Delivery is fire-and-forget: each notification runs on its own tokio
/// task and a failed delivery is only logged. Nothing here can fail an
/// append.
#[derive(Clone)]
pub struct AnomalyNotifier {
    thresholds: AnomalyThresholds,
    sink: Arc<dyn NotificationSink>,
}

impl AnomalyNotifier {
    pub fn new(thresholds: AnomalyThresholds, sink: Arc<dyn NotificationSink>) -> Self {
        Self { thresholds, sink }
    }

    pub fn thresholds(&self) -> AnomalyThresholds {
        self.thresholds
    }

    pub fn evaluate(&self, entry: &LedgerEntry) -> Vec<Notification> {
        self.thresholds.evaluate(entry)
    }

    pub fn evaluate_fraud(&self, entry: &LedgerEntry) -> Option<Notification> {
        self.thresholds.evaluate_fraud(entry)
    }

    /// Evaluate and dispatch. Returns how many deliveries were scheduled.
    pub fn notify(&self, entry: &LedgerEntry) -> usize {
        self.dispatch(self.evaluate(entry))
    }

    /// Fraud-only variant of [`AnomalyNotifier::notify`].
    pub fn notify_fraud(&self, entry: &LedgerEntry) -> usize {
        self.dispatch(self.evaluate_fraud(entry).into_iter().collect())
    }

    /// Discrepancies always notify; there is no threshold.
    pub fn notify_discrepancy(&self, discrepancy: &Discrepancy) -> usize {
        self.dispatch(vec![Notification::discrepancy(discrepancy)])
    }

    fn dispatch(&self, notifications: Vec<Notification>) -> usize {
        if notifications.is_empty() {
            return 0;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(count = notifications.len(), "no async runtime; notifications dropped");
            return 0;
        };

        let count = notifications.len();
        for notification in notifications {
            let sink = Arc::clone(&self.sink);
            handle.spawn(async move {
                let kind = notification.kind;
                match sink.deliver(notification).await {
                    Ok(()) => debug!(?kind, "notification delivered"),
                    Err(e) => warn!(?kind, error = %e, "notification delivery failed"),
                }
            });
        }
        count
    }
}

impl std::fmt::Debug for AnomalyNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyNotifier")
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}
