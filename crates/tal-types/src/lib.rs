//! Value types shared by every TAL crate.
//!
//! Nothing here hashes or stores anything. The crate fixes the shape of a
//! sealed [`LedgerEntry`] and the canonical text forms ([`Amount::canonical`],
//! [`canonical_timestamp`], [`EntryHash::to_hex`]) that feed the hash input.
//! [`TransactionEvent`] is what producers submit; [`FraudScore`] is metadata
//! attached afterwards and never hashed. A [`Discrepancy`] points at an
//! entry by id and lives outside the chain.

pub mod amount;
pub mod discrepancy;
pub mod entry;
pub mod error;
pub mod event;
pub mod fraud;
pub mod hash;

pub use amount::Amount;
pub use discrepancy::{Discrepancy, DiscrepancyKind, DiscrepancyStatus};
pub use entry::{canonical_timestamp, EntryId, EntryKind, LedgerEntry};
pub use error::TypeError;
pub use event::TransactionEvent;
pub use fraud::FraudScore;
pub use hash::EntryHash;
