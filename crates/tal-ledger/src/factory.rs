use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, SubsecRound, Utc};
use tal_crypto::EntryHasher;
use tal_types::{EntryHash, EntryId, LedgerEntry, TransactionEvent};

use crate::error::LedgerError;

/// Source of entry timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock that returns `start`, `start + step`, ... on
/// successive calls. Used for reproducible chains.
#[derive(Debug)]
pub struct SteppingClock {
    next: Mutex<DateTime<Utc>>,
    step: Duration,
}

impl SteppingClock {
    pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            next: Mutex::new(start),
            step,
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut next = match self.next.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = *next;
        *next = now + self.step;
        now
    }
}

/// Source of entry ids.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> EntryId;
}

/// Time-ordered UUIDv7 ids (`TXN-<uuid>`).
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidV7Ids;

impl IdGenerator for UuidV7Ids {
    fn next_id(&self) -> EntryId {
        EntryId::generate()
    }
}

/// Counter ids: `TXN-000001`, `TXN-000002`, ...
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::starting_at(prefix, 1)
    }

    pub fn starting_at(prefix: impl Into<String>, first: u64) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new("TXN")
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> EntryId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        EntryId::new(format!("{}-{n:06}", self.prefix))
    }
}

/// Builds sealed entries from source events.
///
/// The factory has no side effects beyond drawing an id and a timestamp;
/// appending is the caller's job. An entry built against the current head
/// satisfies both chain invariants once appended directly after it.
#[derive(Clone)]
pub struct EntryFactory {
    hasher: EntryHasher,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl EntryFactory {
    pub fn new(hasher: EntryHasher, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { hasher, clock, ids }
    }

    /// Factory with deterministic ids and timestamps, one second apart.
    pub fn deterministic(hasher: EntryHasher, start: DateTime<Utc>) -> Self {
        Self::new(
            hasher,
            Arc::new(SteppingClock::new(start, Duration::seconds(1))),
            Arc::new(SequentialIds::default()),
        )
    }

    pub fn with_hasher(hasher: EntryHasher) -> Self {
        Self::new(hasher, Arc::new(SystemClock), Arc::new(UuidV7Ids))
    }

    pub fn hasher(&self) -> EntryHasher {
        self.hasher
    }

    /// Build an entry for `event` chained onto `head`.
    pub fn create_entry(
        &self,
        event: &TransactionEvent,
        head: Option<&LedgerEntry>,
    ) -> Result<LedgerEntry, LedgerError> {
        validate(event)?;

        let previous_hash = head.map(|h| h.hash).unwrap_or(EntryHash::GENESIS);
        let now = self.clock.now().trunc_subsecs(3);
        let created_at = match head {
            Some(h) if h.created_at > now => h.created_at,
            _ => now,
        };

        let mut entry = LedgerEntry {
            id: self.ids.next_id(),
            kind: event.kind,
            amount: event.amount,
            created_at,
            subject_id: event.subject_id.clone(),
            actor_id: event.actor_id.clone(),
            hash: EntryHash::GENESIS,
            previous_hash,
            fraud_score: event.fraud_score.clone(),
        };
        entry.hash = self.hasher.seal(&entry);
        Ok(entry)
    }
}

impl Default for EntryFactory {
    fn default() -> Self {
        Self::with_hasher(EntryHasher::default())
    }
}

impl std::fmt::Debug for EntryFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryFactory")
            .field("hasher", &self.hasher)
            .finish_non_exhaustive()
    }
}

fn validate(event: &TransactionEvent) -> Result<(), LedgerError> {
    if event.subject_id.trim().is_empty() {
        return Err(LedgerError::Precondition {
            field: "subjectId",
            reason: "must not be blank",
        });
    }
    if event.actor_id.trim().is_empty() {
        return Err(LedgerError::Precondition {
            field: "actorId",
            reason: "must not be blank",
        });
    }
    Ok(())
}
