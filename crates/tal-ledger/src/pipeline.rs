use std::sync::Arc;

use tal_types::{Discrepancy, LedgerEntry, TransactionEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::discrepancy::DiscrepancyMonitor;
use crate::error::LedgerError;
use crate::fraud::FraudScorer;
use crate::notify::AnomalyNotifier;
use crate::traits::{LedgerReader, LedgerWriter};

/// Result of submitting one event.
#[derive(Debug)]
pub struct Submitted {
    pub entry: LedgerEntry,
    /// Background scoring task, if a scorer is configured.
    pub scoring: Option<JoinHandle<()>>,
    pub discrepancy: Option<Discrepancy>,
}

/// Counters returned when [`AppendPipeline::run`] drains its channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub appended: u64,
    pub rejected: u64,
}

/// Single consumer that turns events into ledger entries.
///
/// For each event: append under the store's write lock, evaluate the
/// notifier, roll for a discrepancy when a monitor is attached, then score in
/// the background. None of the follow-ups can delay or fail the append.
pub struct AppendPipeline<L: ?Sized> {
    store: Arc<L>,
    notifier: AnomalyNotifier,
    scorer: Option<Arc<dyn FraudScorer>>,
    discrepancies: Option<Arc<DiscrepancyMonitor>>,
}

impl<L: ?Sized> Clone for AppendPipeline<L> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            notifier: self.notifier.clone(),
            scorer: self.scorer.clone(),
            discrepancies: self.discrepancies.clone(),
        }
    }
}

impl<L> AppendPipeline<L>
where
    L: LedgerWriter + LedgerReader + ?Sized + 'static,
{
    pub fn new(store: Arc<L>, notifier: AnomalyNotifier) -> Self {
        Self {
            store,
            notifier,
            scorer: None,
            discrepancies: None,
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn FraudScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn with_discrepancies(mut self, monitor: Arc<DiscrepancyMonitor>) -> Self {
        self.discrepancies = Some(monitor);
        self
    }

    pub fn store(&self) -> &Arc<L> {
        &self.store
    }

    pub fn notifier(&self) -> &AnomalyNotifier {
        &self.notifier
    }

    /// Append one event and kick off notification and scoring.
    pub fn submit(&self, event: &TransactionEvent) -> Result<Submitted, LedgerError> {
        let entry = self.store.append_event(event)?;
        self.notifier.notify(&entry);
        let discrepancy = self.flag_discrepancy(&entry);
        let scoring = self.schedule_scoring(&entry);
        Ok(Submitted {
            entry,
            scoring,
            discrepancy,
        })
    }

    /// Consume events until every sender is dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<TransactionEvent>) -> PipelineStats {
        let mut stats = PipelineStats::default();
        while let Some(event) = rx.recv().await {
            match self.submit(&event) {
                Ok(_) => stats.appended += 1,
                Err(e) => {
                    stats.rejected += 1;
                    warn!(error = %e, subject = %event.subject_id, "event rejected");
                }
            }
        }
        info!(appended = stats.appended, rejected = stats.rejected, "append pipeline drained");
        stats
    }

    fn flag_discrepancy(&self, entry: &LedgerEntry) -> Option<Discrepancy> {
        let monitor = self.discrepancies.as_ref()?;
        match monitor.observe(entry) {
            Ok(Some(discrepancy)) => {
                self.notifier.notify_discrepancy(&discrepancy);
                Some(discrepancy)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(id = %entry.id, error = %e, "discrepancy roll failed");
                None
            }
        }
    }

    /// Entries that arrived with a score keep it; only unscored entries go
    /// to the scorer.
    fn schedule_scoring(&self, entry: &LedgerEntry) -> Option<JoinHandle<()>> {
        if entry.fraud_score.is_some() {
            return None;
        }
        let scorer = Arc::clone(self.scorer.as_ref()?);
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let store = Arc::clone(&self.store);
        let notifier = self.notifier.clone();
        let entry = entry.clone();

        Some(handle.spawn(async move {
            let score = match scorer.score(&entry).await {
                Ok(score) => score,
                Err(e) => {
                    warn!(id = %entry.id, error = %e, "fraud scoring failed");
                    return;
                }
            };
            match store.attach_fraud_score(&entry.id, score) {
                Ok(scored) => {
                    notifier.notify_fraud(&scored);
                }
                Err(e) => warn!(id = %entry.id, error = %e, "could not attach fraud score"),
            }
        }))
    }
}
