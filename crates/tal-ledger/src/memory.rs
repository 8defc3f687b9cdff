use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tal_types::{EntryId, FraudScore, LedgerEntry, TransactionEvent};
use tracing::debug;

use crate::error::LedgerError;
use crate::factory::EntryFactory;
use crate::state::LedgerState;
use crate::traits::{LedgerReader, LedgerWriter};

/// In-memory ledger for tests, demos, and embedding.
///
/// Owned explicitly and shared by handle (`Arc<InMemoryLedger>`); there is
/// no process-wide instance.
#[derive(Debug)]
pub struct InMemoryLedger {
    factory: EntryFactory,
    inner: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new(factory: EntryFactory) -> Self {
        Self {
            factory,
            inner: RwLock::new(LedgerState::default()),
        }
    }

    pub fn factory(&self) -> &EntryFactory {
        &self.factory
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, LedgerError> {
        self.inner
            .read()
            .map_err(|_| LedgerError::LockPoisoned("read"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, LedgerError> {
        self.inner
            .write()
            .map_err(|_| LedgerError::LockPoisoned("write"))
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(EntryFactory::default())
    }
}

impl LedgerWriter for InMemoryLedger {
    fn append(&self, entry: LedgerEntry) -> Result<(), LedgerError> {
        let mut state = self.write()?;
        debug!(id = %entry.id, hash = %entry.hash.short_hex(), "append");
        state.push(entry)
    }

    fn append_event(&self, event: &TransactionEvent) -> Result<LedgerEntry, LedgerError> {
        let mut state = self.write()?;
        let entry = self.factory.create_entry(event, state.head())?;
        state.push(entry.clone())?;
        debug!(
            id = %entry.id,
            kind = %entry.kind,
            amount = %entry.amount,
            hash = %entry.hash.short_hex(),
            "appended event"
        );
        Ok(entry)
    }

    fn attach_fraud_score(
        &self,
        id: &EntryId,
        score: FraudScore,
    ) -> Result<LedgerEntry, LedgerError> {
        self.write()?.attach_fraud_score(id, score)
    }
}

impl LedgerReader for InMemoryLedger {
    fn head(&self) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.read()?.head().cloned())
    }

    fn all_oldest_first(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.read()?.snapshot())
    }

    fn read_range(&self, from: u64, limit: usize) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.read()?.range(from, limit))
    }

    fn get(&self, id: &EntryId) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.read()?.get(id).cloned())
    }

    fn by_subject(&self, subject_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.read()?.by_subject(subject_id))
    }

    fn len(&self) -> Result<u64, LedgerError> {
        Ok(self.read()?.len() as u64)
    }
}

#[cfg(any(test, feature = "tamper"))]
impl crate::traits::TamperTarget for InMemoryLedger {
    fn replace_at(&self, index: usize, entry: LedgerEntry) -> Result<LedgerEntry, LedgerError> {
        self.write()?.replace_at(index, entry)
    }

    fn edit_in_place(
        &self,
        select: &dyn Fn(usize) -> Result<usize, LedgerError>,
        edit: &dyn Fn(&LedgerEntry) -> Result<LedgerEntry, LedgerError>,
    ) -> Result<LedgerEntry, LedgerError> {
        let (_, old) = self.write()?.edit_in_place(select, edit)?;
        Ok(old)
    }
}
