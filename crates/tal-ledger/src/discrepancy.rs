use std::ops::RangeInclusive;
use std::sync::{Mutex, MutexGuard};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tal_types::{Amount, Discrepancy, DiscrepancyKind, EntryKind, LedgerEntry};
use tracing::info;

use crate::error::LedgerError;
use crate::traits::LedgerReader;

/// Inclusive whole-unit range of a simulated discrepancy amount.
pub const DISCREPANCY_AMOUNT_RANGE: RangeInclusive<u64> = 10..=59;

/// Default chance, in percent, that a sale is flagged.
pub const DEFAULT_DISCREPANCY_PERCENT: u8 = 10;

struct MonitorState {
    rng: StdRng,
    issued: u64,
    /// Newest first.
    flagged: Vec<Discrepancy>,
}

/// Randomly flags simulated sales as unaccounted-fee discrepancies and keeps
/// the ones it raised.
///
/// Only `Sale` entries are rolled. With a seed the sequence of flags is
/// reproducible for a given sequence of observed entries.
pub struct DiscrepancyMonitor {
    percent: u8,
    state: Mutex<MonitorState>,
}

impl DiscrepancyMonitor {
    /// `percent` above 100 is treated as 100.
    pub fn new(percent: u8, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            percent: percent.min(100),
            state: Mutex::new(MonitorState {
                rng,
                issued: 0,
                flagged: Vec::new(),
            }),
        }
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Roll for `entry`. A hit is recorded and returned.
    pub fn observe(&self, entry: &LedgerEntry) -> Result<Option<Discrepancy>, LedgerError> {
        if entry.kind != EntryKind::Sale {
            return Ok(None);
        }
        let mut state = self.lock()?;
        if state.rng.gen_range(0..100u8) >= self.percent {
            return Ok(None);
        }
        let whole = state.rng.gen_range(DISCREPANCY_AMOUNT_RANGE);
        state.issued += 1;

        let discrepancy = Discrepancy::flag(
            format!("DIS-{:06}", state.issued),
            DiscrepancyKind::UnaccountedFee,
            Amount::from_minor(whole * 100),
            entry.id.clone(),
            entry.created_at,
        );
        state.flagged.insert(0, discrepancy.clone());
        info!(id = %discrepancy.id, entry = %entry.id, amount = %discrepancy.amount, "discrepancy flagged");
        Ok(Some(discrepancy))
    }

    /// Every flagged discrepancy, newest first.
    pub fn all(&self) -> Result<Vec<Discrepancy>, LedgerError> {
        Ok(self.lock()?.flagged.clone())
    }

    pub fn get(&self, id: &str) -> Result<Option<Discrepancy>, LedgerError> {
        Ok(self.lock()?.flagged.iter().find(|d| d.id == id).cloned())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MonitorState>, LedgerError> {
        self.state
            .lock()
            .map_err(|_| LedgerError::LockPoisoned("discrepancies"))
    }
}

impl std::fmt::Debug for DiscrepancyMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscrepancyMonitor")
            .field("percent", &self.percent)
            .finish_non_exhaustive()
    }
}

/// A discrepancy together with the ledger entries it concerns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscrepancyView {
    pub discrepancy: Discrepancy,
    /// `None` when the referenced entry is not in this ledger.
    pub entry: Option<LedgerEntry>,
    /// Every entry on the same subject as `entry`, oldest first.
    pub related: Vec<LedgerEntry>,
}

impl DiscrepancyView {
    pub fn load<R: LedgerReader + ?Sized>(
        reader: &R,
        discrepancy: Discrepancy,
    ) -> Result<Self, LedgerError> {
        let entry = reader.get(&discrepancy.associated_entry_id)?;
        let related = match &entry {
            Some(entry) => reader.by_subject(&entry.subject_id)?,
            None => Vec::new(),
        };
        Ok(Self {
            discrepancy,
            entry,
            related,
        })
    }
}
