use tal_crypto::{ChainVerifier, EntryHasher, ScanCheckpoint, ScanProgress, VerificationReport};
use tracing::{debug, info, warn};

use crate::error::LedgerError;
use crate::traits::LedgerReader;

/// Default number of entries read per batch in [`LedgerValidator::verify_batched`].
pub const DEFAULT_BATCH_SIZE: usize = 512;

/// Outcome of an incremental verification pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncrementalReport {
    pub report: VerificationReport,
    /// Where the next pass should resume. Only meaningful when the chain
    /// verified; a broken chain should be re-verified from the start after
    /// an operator has investigated.
    pub checkpoint: ScanCheckpoint,
    /// Entries examined in this pass.
    pub examined: u64,
}

/// Verifies a store's hash chain.
///
/// Reads a snapshot through [`LedgerReader`] and hands it to the
/// [`ChainVerifier`]. Never mutates the store.
#[derive(Clone, Copy, Debug)]
pub struct LedgerValidator {
    verifier: ChainVerifier,
    batch_size: usize,
}

impl LedgerValidator {
    pub fn new(hasher: EntryHasher) -> Self {
        Self {
            verifier: ChainVerifier::new(hasher),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Verify the whole chain from one point-in-time snapshot.
    pub fn verify<R: LedgerReader + ?Sized>(
        &self,
        reader: &R,
    ) -> Result<VerificationReport, LedgerError> {
        let entries = reader.all_oldest_first()?;
        let report = self.verifier.verify(&entries);
        log_report(&report, entries.len() as u64);
        Ok(report)
    }

    /// Verify in batches of `batch_size`, reading each batch separately.
    ///
    /// Produces the same report as [`LedgerValidator::verify`] on a store
    /// that is not being appended to concurrently.
    pub fn verify_batched<R: LedgerReader + ?Sized>(
        &self,
        reader: &R,
    ) -> Result<VerificationReport, LedgerError> {
        let outcome = self.verify_from(reader, ScanCheckpoint::START)?;
        log_report(&outcome.report, outcome.checkpoint.position);
        Ok(outcome.report)
    }

    /// Continue verification from a saved checkpoint up to the current head.
    pub fn verify_from<R: LedgerReader + ?Sized>(
        &self,
        reader: &R,
        checkpoint: ScanCheckpoint,
    ) -> Result<IncrementalReport, LedgerError> {
        let mut scan = self.verifier.resume(checkpoint);
        let mut examined = 0u64;

        loop {
            let position = scan.checkpoint().position;
            let batch = reader.read_range(position, self.batch_size)?;
            if batch.is_empty() {
                break;
            }
            examined += batch.len() as u64;

            match scan.feed(&batch) {
                ScanProgress::Continue(cp) => {
                    debug!(position = cp.position, "verified batch");
                }
                ScanProgress::Broken(report) => {
                    return Ok(IncrementalReport {
                        report,
                        checkpoint: scan.checkpoint(),
                        examined,
                    });
                }
            }

            if batch.len() < self.batch_size {
                break;
            }
        }

        Ok(IncrementalReport {
            checkpoint: scan.checkpoint(),
            report: scan.finish(),
            examined,
        })
    }
}

impl Default for LedgerValidator {
    fn default() -> Self {
        Self::new(EntryHasher::default())
    }
}

fn log_report(report: &VerificationReport, entries: u64) {
    if report.ok {
        info!(entries, "ledger verified");
    } else {
        warn!(
            entries,
            entry = report.first_broken_entry_id.as_deref().unwrap_or_default(),
            kind = ?report.violation_kind,
            "ledger verification failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tal_crypto::ViolationKind;
    use tal_types::{Amount, TransactionEvent};

    use super::*;
    use crate::factory::EntryFactory;
    use crate::memory::InMemoryLedger;
    use crate::traits::{LedgerWriter, TamperTarget};

    fn ledger_with(n: u64) -> InMemoryLedger {
        let ledger = InMemoryLedger::new(EntryFactory::deterministic(
            EntryHasher::SHA256,
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        ));
        for i in 0..n {
            ledger
                .append_event(&TransactionEvent::sale(
                    Amount::from_minor(10_000 + i),
                    format!("TKT-{i}"),
                    "UA-AG-003",
                ))
                .unwrap();
        }
        ledger
    }

    #[test]
    fn empty_ledger_verifies() {
        let ledger = ledger_with(0);
        assert!(LedgerValidator::default().verify(&ledger).unwrap().ok);
        assert!(LedgerValidator::default().verify_batched(&ledger).unwrap().ok);
    }

    #[test]
    fn batched_matches_one_pass() {
        let ledger = ledger_with(10);
        let mut entry = ledger.all_oldest_first().unwrap()[6].clone();
        entry.amount = Amount::from_minor(1);
        ledger.replace_at(6, entry).unwrap();

        let one_pass = LedgerValidator::default().verify(&ledger).unwrap();
        for size in [1, 2, 3, 7, 10, 64] {
            let batched = LedgerValidator::default()
                .with_batch_size(size)
                .verify_batched(&ledger)
                .unwrap();
            assert_eq!(batched, one_pass, "batch size {size}");
        }
        assert_eq!(one_pass.violation_kind, Some(ViolationKind::Content));
    }

    #[test]
    fn verify_from_resumes_after_new_appends() {
        let ledger = ledger_with(4);
        let validator = LedgerValidator::default().with_batch_size(3);
        let first = validator.verify_from(&ledger, ScanCheckpoint::START).unwrap();
        assert!(first.report.ok);
        assert_eq!(first.examined, 4);
        assert_eq!(first.checkpoint.position, 4);

        ledger
            .append_event(&TransactionEvent::sale(Amount::from_minor(5), "TKT-9", "UA-AG-003"))
            .unwrap();
        let second = validator.verify_from(&ledger, first.checkpoint).unwrap();
        assert!(second.report.ok);
        assert_eq!(second.examined, 1);
        assert_eq!(second.checkpoint.position, 5);
    }

    #[test]
    fn zero_batch_size_is_clamped() {
        let ledger = ledger_with(3);
        let report = LedgerValidator::default()
            .with_batch_size(0)
            .verify_batched(&ledger)
            .unwrap();
        assert!(report.ok);
    }
}
