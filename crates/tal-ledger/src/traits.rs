use tal_types::{EntryId, FraudScore, LedgerEntry, TransactionEvent};

use crate::error::LedgerError;

/// Write boundary for ledger append operations.
pub trait LedgerWriter: Send + Sync {
    /// Add a pre-built entry as the new head.
    ///
    /// Performs no hash validation: a mis-sealed or mis-linked entry is
    /// stored as given and only an explicit verification will flag it.
    /// Rejects only a duplicate `id`, the store's primary key.
    fn append(&self, entry: LedgerEntry) -> Result<(), LedgerError>;

    /// Build an entry from `event` against the current head and append it,
    /// all under one write lock.
    fn append_event(&self, event: &TransactionEvent) -> Result<LedgerEntry, LedgerError>;

    /// Attach externally computed fraud metadata. The score is outside the
    /// hash input, so this never affects verification.
    fn attach_fraud_score(
        &self,
        id: &EntryId,
        score: FraudScore,
    ) -> Result<LedgerEntry, LedgerError>;
}

/// Read boundary for ledger queries.
///
/// Every read returns an owned point-in-time snapshot taken under the read
/// lock, so a reader never observes a half-appended entry.
pub trait LedgerReader: Send + Sync {
    fn head(&self) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Entries in append order. This is the order verification requires.
    fn all_oldest_first(&self) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Entries most recent first, for display.
    fn all_newest_first(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut entries = self.all_oldest_first()?;
        entries.reverse();
        Ok(entries)
    }

    /// Up to `limit` entries starting at append position `from` (0-based).
    fn read_range(&self, from: u64, limit: usize) -> Result<Vec<LedgerEntry>, LedgerError>;

    fn get(&self, id: &EntryId) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Entries documenting the given business record, oldest first.
    fn by_subject(&self, subject_id: &str) -> Result<Vec<LedgerEntry>, LedgerError>;

    fn len(&self) -> Result<u64, LedgerError>;

    fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }
}

/// A store that can be both read and appended to, usable as
/// `Arc<dyn LedgerStore>`.
pub trait LedgerStore: LedgerReader + LedgerWriter {}

impl<T: LedgerReader + LedgerWriter + ?Sized> LedgerStore for T {}

/// In-place replacement of a stored entry.
///
/// Exists only so the tamper simulator can emulate an after-the-fact edit.
/// Neighbouring entries and their stored hashes are left untouched.
#[cfg(any(test, feature = "tamper"))]
pub trait TamperTarget: LedgerReader {
    /// Replace the entry at append position `index`, returning the old one.
    fn replace_at(&self, index: usize, entry: LedgerEntry) -> Result<LedgerEntry, LedgerError>;

    /// Pick and rewrite one entry under a single write lock.
    ///
    /// `select` receives the current length and returns the victim's index.
    /// `edit` builds the replacement from the stored entry. Returns the
    /// entry as it was before the edit.
    fn edit_in_place(
        &self,
        select: &dyn Fn(usize) -> Result<usize, LedgerError>,
        edit: &dyn Fn(&LedgerEntry) -> Result<LedgerEntry, LedgerError>,
    ) -> Result<LedgerEntry, LedgerError>;
}
