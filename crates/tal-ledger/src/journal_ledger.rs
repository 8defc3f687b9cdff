use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tal_types::{EntryId, FraudScore, LedgerEntry, TransactionEvent};
use tracing::{debug, info, warn};

use crate::error::LedgerError;
use crate::factory::EntryFactory;
use crate::journal::{Journal, JournalRecord, SyncMode};
use crate::state::LedgerState;
use crate::traits::{LedgerReader, LedgerWriter};

/// Ledger persisted to an append-only [`Journal`].
///
/// Every write reaches the journal before it becomes visible to readers.
/// Opening an existing journal replays it to rebuild the entry sequence and
/// both indexes.
#[derive(Debug)]
pub struct JournalLedger {
    factory: EntryFactory,
    journal: Journal,
    inner: RwLock<LedgerState>,
}

impl JournalLedger {
    pub fn open(path: &Path, factory: EntryFactory) -> Result<Self, LedgerError> {
        Self::open_with(path, factory, SyncMode::default())
    }

    pub fn open_with(
        path: &Path,
        factory: EntryFactory,
        sync_mode: SyncMode,
    ) -> Result<Self, LedgerError> {
        let journal = Journal::open(path, sync_mode)?;
        let mut state = LedgerState::default();

        for record in journal.recover()? {
            match record {
                JournalRecord::Entry(entry) => {
                    if let Err(e) = state.push(entry) {
                        warn!(error = %e, "ignoring journal entry");
                    }
                }
                JournalRecord::FraudScore { id, score } => {
                    if let Err(e) = state.attach_fraud_score(&id, score) {
                        warn!(error = %e, "ignoring journal fraud score");
                    }
                }
            }
        }

        info!(path = %path.display(), entries = state.len(), "journal ledger opened");
        Ok(Self {
            factory,
            journal,
            inner: RwLock::new(state),
        })
    }

    pub fn factory(&self) -> &EntryFactory {
        &self.factory
    }

    pub fn path(&self) -> &Path {
        self.journal.path()
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

    fn persist_and_push(
        &self,
        state: &mut LedgerState,
        entry: LedgerEntry,
    ) -> Result<(), LedgerError> {
        if state.contains(&entry.id) {
            return Err(LedgerError::DuplicateEntry(entry.id));
        }
        let offset = self.journal.append(&JournalRecord::Entry(entry.clone()))?;
        debug!(id = %entry.id, offset, "journaled entry");
        state.push(entry)
    }
}

impl LedgerWriter for JournalLedger {
    fn append(&self, entry: LedgerEntry) -> Result<(), LedgerError> {
        let mut state = self.write()?;
        self.persist_and_push(&mut state, entry)
    }

    fn append_event(&self, event: &TransactionEvent) -> Result<LedgerEntry, LedgerError> {
        let mut state = self.write()?;
        let entry = self.factory.create_entry(event, state.head())?;
        self.persist_and_push(&mut state, entry.clone())?;
        Ok(entry)
    }

    fn attach_fraud_score(
        &self,
        id: &EntryId,
        score: FraudScore,
    ) -> Result<LedgerEntry, LedgerError> {
        let mut state = self.write()?;
        if !state.contains(id) {
            return Err(LedgerError::EntryNotFound(id.clone()));
        }
        self.journal.append(&JournalRecord::FraudScore {
            id: id.clone(),
            score: score.clone(),
        })?;
        state.attach_fraud_score(id, score)
    }
}

impl LedgerReader for JournalLedger {
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
impl crate::traits::TamperTarget for JournalLedger {
    /// Replaces the entry in memory, then rewrites the journal so the edit
    /// survives a reopen.
    fn replace_at(&self, index: usize, entry: LedgerEntry) -> Result<LedgerEntry, LedgerError> {
        let mut state = self.write()?;
        let old = state.replace_at(index, entry)?;
        self.rewrite_journal(&state, index, &old)?;
        Ok(old)
    }

    fn edit_in_place(
        &self,
        select: &dyn Fn(usize) -> Result<usize, LedgerError>,
        edit: &dyn Fn(&LedgerEntry) -> Result<LedgerEntry, LedgerError>,
    ) -> Result<LedgerEntry, LedgerError> {
        let mut state = self.write()?;
        let (index, old) = state.edit_in_place(select, edit)?;
        self.rewrite_journal(&state, index, &old)?;
        Ok(old)
    }
}

#[cfg(any(test, feature = "tamper"))]
impl JournalLedger {
    /// Fraud scores are folded into the entry records, so the rewritten
    /// journal carries them without separate score records.
    fn rewrite_journal(
        &self,
        state: &LedgerState,
        index: usize,
        old: &LedgerEntry,
    ) -> Result<(), LedgerError> {
        let records: Vec<JournalRecord> = state
            .snapshot()
            .into_iter()
            .map(JournalRecord::Entry)
            .collect();
        self.journal.rewrite(&records)?;
        warn!(index, id = %old.id, "journal rewritten with replaced entry");
        Ok(())
    }
}
