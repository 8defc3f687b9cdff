use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::TypeError;
use crate::fraud::FraudScore;
use crate::hash::EntryHash;

/// Unique ledger entry identifier (the journal's primary key).
///
/// Generated ids are `TXN-` followed by a UUIDv7 in simple form, so ids
/// created later sort after ids created earlier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Generate a fresh, time-ordered id.
    pub fn generate() -> Self {
        Self(format!("TXN-{}", uuid::Uuid::now_v7().simple()))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({})", self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of business transaction an entry documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntryKind {
    Sale,
    Fee,
    Refund,
    Reconciliation,
}

impl EntryKind {
    pub const ALL: [EntryKind; 4] = [Self::Sale, Self::Fee, Self::Refund, Self::Reconciliation];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sale => "Sale",
            Self::Fee => "Fee",
            Self::Refund => "Refund",
            Self::Reconciliation => "Reconciliation",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TypeError::InvalidEntryKind(s.to_string()))
    }
}

/// Canonical timestamp form used in the hash input: RFC 3339, millisecond
/// precision, `Z` suffix.
pub fn canonical_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A sealed ledger entry.
///
/// `hash` covers `id`, `created_at`, `amount`, `subject_id`, `actor_id` and
/// `previous_hash` in that order. `kind` and `fraud_score` are not part of
/// the hash input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: EntryId,
    pub kind: EntryKind,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
    /// Business record this entry documents, e.g. a ticket id.
    pub subject_id: String,
    /// Agent or operator responsible for the transaction.
    pub actor_id: String,
    pub hash: EntryHash,
    pub previous_hash: EntryHash,
    pub fraud_score: Option<FraudScore>,
}

impl LedgerEntry {
    /// Hash input fields in their fixed order.
    pub fn canonical_fields(&self) -> [String; 6] {
        [
            self.id.as_str().to_string(),
            canonical_timestamp(&self.created_at),
            self.amount.canonical(),
            self.subject_id.clone(),
            self.actor_id.clone(),
            self.previous_hash.to_hex(),
        ]
    }

    /// Returns `true` if this entry claims to be the first in its chain.
    pub fn is_genesis(&self) -> bool {
        self.previous_hash.is_genesis()
    }
}
