//! Append-only ticket transaction ledger.
//!
//! This crate holds everything around the hash chain itself:
//! - `LedgerWriter` / `LedgerReader` trait boundaries
//! - `EntryFactory` building sealed entries against the chain head
//! - `InMemoryLedger` and the journal-backed `JournalLedger`
//! - Whole-chain and checkpointed verification through `LedgerValidator`
//! - Anomaly notification, fraud scoring, the event simulator and the
//!   append pipeline tying them together
//! - Discrepancy flagging for simulated sales
//! - The tamper simulator (feature `tamper`)

pub mod discrepancy;
pub mod error;
pub mod factory;
pub mod fraud;
pub mod journal;
pub mod journal_ledger;
pub mod memory;
pub mod notify;
pub mod pipeline;
pub mod query;
pub mod simulator;
mod state;
#[cfg(any(test, feature = "tamper"))]
pub mod tamper;
pub mod traits;
pub mod validation;

pub use discrepancy::{DiscrepancyMonitor, DiscrepancyView};
pub use error::LedgerError;
pub use factory::{Clock, EntryFactory, IdGenerator, SequentialIds, SteppingClock, SystemClock, UuidV7Ids};
pub use fraud::{AmountHeuristicScorer, FraudScorer, StaticScorer};
pub use journal::{Journal, JournalError, JournalRecord, SyncMode};
pub use journal_ledger::JournalLedger;
pub use memory::InMemoryLedger;
pub use notify::{
    AnomalyNotifier, AnomalyThresholds, ChannelSink, InboxItem, Notification, NotificationInbox,
    NotificationKind, NotificationSink, NotifyError, NullSink,
};
pub use pipeline::{AppendPipeline, PipelineStats, Submitted};
pub use query::{EntryFilter, LedgerSummary};
pub use simulator::{spawn_ticker, TicketSimulator};
#[cfg(any(test, feature = "tamper"))]
pub use tamper::{tamper, tamper_at, TamperMutation};
#[cfg(any(test, feature = "tamper"))]
pub use traits::TamperTarget;
pub use traits::{LedgerReader, LedgerStore, LedgerWriter};
pub use validation::{IncrementalReport, LedgerValidator};
