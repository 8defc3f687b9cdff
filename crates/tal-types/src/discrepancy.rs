use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::entry::EntryId;
use crate::error::TypeError;

/// Category of a reconciliation discrepancy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscrepancyKind {
    #[serde(rename = "Price Mismatch")]
    PriceMismatch,
    #[serde(rename = "Unaccounted Fee")]
    UnaccountedFee,
    #[serde(rename = "Missing Deposit")]
    MissingDeposit,
}

impl DiscrepancyKind {
    pub const ALL: [DiscrepancyKind; 3] =
        [Self::PriceMismatch, Self::UnaccountedFee, Self::MissingDeposit];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriceMismatch => "Price Mismatch",
            Self::UnaccountedFee => "Unaccounted Fee",
            Self::MissingDeposit => "Missing Deposit",
        }
    }
}

impl fmt::Display for DiscrepancyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscrepancyKind {
    type Err = TypeError;

    /// Accepts the display name or its hyphenated form, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace(['-', '_'], " ");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| TypeError::InvalidDiscrepancyKind(s.to_string()))
    }
}

/// Where a discrepancy is in its investigation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscrepancyStatus {
    Resolved,
    #[serde(rename = "Pending Investigation")]
    Pending,
    #[default]
    #[serde(rename = "Action Required")]
    ActionRequired,
}

impl DiscrepancyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolved => "Resolved",
            Self::Pending => "Pending Investigation",
            Self::ActionRequired => "Action Required",
        }
    }
}

impl fmt::Display for DiscrepancyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A flagged mismatch between a ledger entry and what was expected of it.
///
/// Discrepancies reference entries by id and are never part of the hash
/// chain. `amount` is the disputed sum, not the entry's amount.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancy {
    /// `DIS-` prefixed.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: DiscrepancyKind,
    pub details: String,
    pub amount: Amount,
    #[serde(rename = "associatedTransactionId")]
    pub associated_entry_id: EntryId,
    pub reported_at: DateTime<Utc>,
    pub status: DiscrepancyStatus,
}

impl Discrepancy {
    /// A new, unresolved discrepancy against `entry_id`.
    pub fn flag(
        id: impl Into<String>,
        kind: DiscrepancyKind,
        amount: Amount,
        entry_id: EntryId,
        reported_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            details: format!("{kind} related to transaction {entry_id}"),
            amount,
            associated_entry_id: entry_id,
            reported_at,
            status: DiscrepancyStatus::default(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status != DiscrepancyStatus::Resolved
    }
}
