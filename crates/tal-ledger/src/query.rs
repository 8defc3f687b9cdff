use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tal_types::{Amount, EntryHash, EntryKind, LedgerEntry};

use crate::error::LedgerError;
use crate::traits::LedgerReader;

/// Conjunctive filter over ledger entries. Unset fields match everything;
/// the date range is inclusive on both ends.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub kind: Option<EntryKind>,
    pub actor_id: Option<String>,
    pub subject_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl EntryFilter {
    pub fn kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.kind.map_or(true, |k| entry.kind == k)
            && self.actor_id.as_deref().map_or(true, |a| entry.actor_id == a)
            && self.subject_id.as_deref().map_or(true, |s| entry.subject_id == s)
            && self.from.map_or(true, |from| entry.created_at >= from)
            && self.to.map_or(true, |to| entry.created_at <= to)
    }

    /// Matching entries, newest first.
    pub fn apply<R: LedgerReader + ?Sized>(&self, reader: &R) -> Result<Vec<LedgerEntry>, LedgerError> {
        let candidates = match &self.subject_id {
            Some(subject) => {
                let mut hits = reader.by_subject(subject)?;
                hits.reverse();
                hits
            }
            None => reader.all_newest_first()?,
        };
        Ok(candidates.into_iter().filter(|e| self.matches(e)).collect())
    }
}

/// Aggregate view of a ledger snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    pub entry_count: u64,
    pub total_by_kind: BTreeMap<EntryKind, Amount>,
    pub head_hash: Option<EntryHash>,
}

impl LedgerSummary {
    pub fn of<R: LedgerReader + ?Sized>(reader: &R) -> Result<Self, LedgerError> {
        Ok(Self::from_entries(&reader.all_oldest_first()?))
    }

    pub fn from_entries(entries: &[LedgerEntry]) -> Self {
        let mut total_by_kind: BTreeMap<EntryKind, Amount> = BTreeMap::new();
        for entry in entries {
            let total = total_by_kind.entry(entry.kind).or_default();
            *total = total
                .checked_add(entry.amount)
                .unwrap_or(Amount::from_minor(u64::MAX));
        }
        Self {
            entry_count: entries.len() as u64,
            total_by_kind,
            head_hash: entries.last().map(|e| e.hash),
        }
    }
}
