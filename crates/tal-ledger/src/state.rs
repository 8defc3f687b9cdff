use std::collections::HashMap;

use tal_types::{EntryId, FraudScore, LedgerEntry};

use crate::error::LedgerError;

/// Ordered entries plus the primary-key and subject indexes.
///
/// Shared by the in-memory and journal-backed stores; callers hold it
/// behind their own lock.
#[derive(Default, Debug)]
pub(crate) struct LedgerState {
    entries: Vec<LedgerEntry>,
    by_id: HashMap<EntryId, usize>,
    by_subject: HashMap<String, Vec<usize>>,
}

impl LedgerState {
    pub(crate) fn head(&self) -> Option<&LedgerEntry> {
        self.entries.last()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn contains(&self, id: &EntryId) -> bool {
        self.by_id.contains_key(id)
    }

    pub(crate) fn push(&mut self, entry: LedgerEntry) -> Result<(), LedgerError> {
        if self.by_id.contains_key(&entry.id) {
            return Err(LedgerError::DuplicateEntry(entry.id));
        }
        let index = self.entries.len();
        self.by_id.insert(entry.id.clone(), index);
        self.by_subject
            .entry(entry.subject_id.clone())
            .or_default()
            .push(index);
        self.entries.push(entry);
        Ok(())
    }

    pub(crate) fn get(&self, id: &EntryId) -> Option<&LedgerEntry> {
        self.by_id.get(id).and_then(|&i| self.entries.get(i))
    }

    pub(crate) fn by_subject(&self, subject_id: &str) -> Vec<LedgerEntry> {
        self.by_subject
            .get(subject_id)
            .map(|indexes| {
                indexes
                    .iter()
                    .filter_map(|&i| self.entries.get(i).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn snapshot(&self) -> Vec<LedgerEntry> {
        self.entries.clone()
    }

    pub(crate) fn range(&self, from: u64, limit: usize) -> Vec<LedgerEntry> {
        let start = usize::try_from(from).unwrap_or(usize::MAX);
        if start >= self.entries.len() {
            return vec![];
        }
        let end = start.saturating_add(limit).min(self.entries.len());
        self.entries[start..end].to_vec()
    }

    pub(crate) fn attach_fraud_score(
        &mut self,
        id: &EntryId,
        score: FraudScore,
    ) -> Result<LedgerEntry, LedgerError> {
        let index = *self
            .by_id
            .get(id)
            .ok_or_else(|| LedgerError::EntryNotFound(id.clone()))?;
        let entry = &mut self.entries[index];
        entry.fraud_score = Some(score);
        Ok(entry.clone())
    }

    /// Swap the entry at `index`, rebuilding indexes in case the id or
    /// subject changed.
    #[cfg(any(test, feature = "tamper"))]
    pub(crate) fn replace_at(
        &mut self,
        index: usize,
        entry: LedgerEntry,
    ) -> Result<LedgerEntry, LedgerError> {
        let len = self.entries.len();
        let slot = self
            .entries
            .get_mut(index)
            .ok_or(LedgerError::IndexOutOfRange { index, len })?;
        let old = std::mem::replace(slot, entry);
        self.reindex();
        Ok(old)
    }

    #[cfg(any(test, feature = "tamper"))]
    pub(crate) fn edit_in_place(
        &mut self,
        select: &dyn Fn(usize) -> Result<usize, LedgerError>,
        edit: &dyn Fn(&LedgerEntry) -> Result<LedgerEntry, LedgerError>,
    ) -> Result<(usize, LedgerEntry), LedgerError> {
        let len = self.entries.len();
        let index = select(len)?;
        let current = self
            .entries
            .get(index)
            .ok_or(LedgerError::IndexOutOfRange { index, len })?;
        let edited = edit(current)?;
        let old = self.replace_at(index, edited)?;
        Ok((index, old))
    }

    #[cfg(any(test, feature = "tamper"))]
    fn reindex(&mut self) {
        self.by_id.clear();
        self.by_subject.clear();
        for (index, entry) in self.entries.iter().enumerate() {
            self.by_id.insert(entry.id.clone(), index);
            self.by_subject
                .entry(entry.subject_id.clone())
                .or_default()
                .push(index);
        }
    }
}
