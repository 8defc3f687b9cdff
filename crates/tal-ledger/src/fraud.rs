use async_trait::async_trait;
use tal_types::{Amount, FraudScore, LedgerEntry};

use crate::error::LedgerError;

/// External fraud-scoring collaborator.
///
/// Runs after an entry is appended; its result is attached as metadata and
/// never feeds the hash.
#[async_trait]
pub trait FraudScorer: Send + Sync {
    async fn score(&self, entry: &LedgerEntry) -> Result<FraudScore, LedgerError>;
}

/// Returns the same score for every entry.
#[derive(Clone, Debug)]
pub struct StaticScorer {
    score: FraudScore,
}

impl StaticScorer {
    pub fn new(score: FraudScore) -> Self {
        Self { score }
    }
}

#[async_trait]
impl FraudScorer for StaticScorer {
    async fn score(&self, _entry: &LedgerEntry) -> Result<FraudScore, LedgerError> {
        Ok(self.score.clone())
    }
}

/// Deterministic local stand-in for a remote scoring service.
///
/// Scores rise linearly with the amount and saturate at 100 once the
/// amount reaches `ceiling`.
#[derive(Clone, Copy, Debug)]
pub struct AmountHeuristicScorer {
    ceiling: Amount,
}

impl AmountHeuristicScorer {
    pub fn new(ceiling: Amount) -> Self {
        Self { ceiling }
    }
}

impl Default for AmountHeuristicScorer {
    fn default() -> Self {
        Self::new(Amount::from_minor(200_000))
    }
}

#[async_trait]
impl FraudScorer for AmountHeuristicScorer {
    async fn score(&self, entry: &LedgerEntry) -> Result<FraudScore, LedgerError> {
        let ceiling = self.ceiling.minor_units();
        if ceiling == 0 {
            return Err(LedgerError::Scoring("ceiling must be positive".into()));
        }
        let amount = entry.amount.minor_units().min(ceiling);
        let score = u128::from(amount) * u128::from(FraudScore::MAX) / u128::from(ceiling);
        let score = u8::try_from(score).unwrap_or(FraudScore::MAX);
        let reason = (score > 50).then(|| format!("amount {} near ceiling", entry.amount));
        FraudScore::new(score, reason).map_err(|e| LedgerError::Scoring(e.to_string()))
    }
}
