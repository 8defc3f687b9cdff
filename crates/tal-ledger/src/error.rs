use tal_types::EntryId;

/// Errors produced by ledger operations.
///
/// Integrity violations are not errors here: a tampered chain is a
/// [`tal_crypto::VerificationReport`] value, not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("precondition failed: {field} {reason}")]
    Precondition {
        field: &'static str,
        reason: &'static str,
    },

    #[error("entry {0} already exists")]
    DuplicateEntry(EntryId),

    #[error("entry {0} not found")]
    EntryNotFound(EntryId),

    #[error("index {index} out of range for ledger of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("ledger is empty; nothing to tamper with")]
    NothingToTamper,

    #[error("ledger {0} lock poisoned")]
    LockPoisoned(&'static str),

    #[error("journal error: {0}")]
    Journal(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("fraud scoring failed: {0}")]
    Scoring(String),
}
