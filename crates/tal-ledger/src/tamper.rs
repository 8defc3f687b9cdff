//! Deliberate corruption of a stored entry, for demos and test fixtures.
//!
//! Compiled only under `cfg(test)` or the `tamper` feature. Each mutation
//! edits a hashed field in place and leaves `hash` and `previous_hash`
//! untouched, so the next verification fails at exactly that entry with a
//! content violation.

use tal_types::{Amount, EntryId, LedgerEntry};
use tracing::warn;

use crate::error::LedgerError;
use crate::traits::TamperTarget;

/// Amount added to the victim by [`tamper`]: 150.75.
pub const TAMPER_DELTA: Amount = Amount::from_minor(15_075);

/// Content edit applied by [`tamper_at`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TamperMutation {
    /// Replace the amount.
    Amount(Amount),
    /// Add to the stored amount.
    Raise(Amount),
    Subject(String),
    Actor(String),
}

impl TamperMutation {
    fn apply(&self, entry: &mut LedgerEntry) -> Result<(), LedgerError> {
        match self {
            TamperMutation::Amount(amount) => entry.amount = *amount,
            TamperMutation::Raise(delta) => {
                entry.amount = entry.amount.checked_add(*delta).ok_or(LedgerError::Precondition {
                    field: "amount",
                    reason: "tampered amount overflows",
                })?;
            }
            TamperMutation::Subject(subject) => entry.subject_id.clone_from(subject),
            TamperMutation::Actor(actor) => entry.actor_id.clone_from(actor),
        }
        Ok(())
    }
}

/// Raise the middle entry's amount by [`TAMPER_DELTA`].
///
/// The victim is the entry at `len / 2`, chosen under the same write lock
/// as the edit. Returns its id.
pub fn tamper<S: TamperTarget + ?Sized>(store: &S) -> Result<EntryId, LedgerError> {
    apply_mutation(store, &|len| Ok(len / 2), TamperMutation::Raise(TAMPER_DELTA))
}

/// Apply `mutation` to the entry at append position `index`.
pub fn tamper_at<S: TamperTarget + ?Sized>(
    store: &S,
    index: usize,
    mutation: TamperMutation,
) -> Result<EntryId, LedgerError> {
    let select = move |len: usize| {
        if index < len {
            Ok(index)
        } else {
            Err(LedgerError::IndexOutOfRange { index, len })
        }
    };
    apply_mutation(store, &select, mutation)
}

fn apply_mutation<S: TamperTarget + ?Sized>(
    store: &S,
    select: &dyn Fn(usize) -> Result<usize, LedgerError>,
    mutation: TamperMutation,
) -> Result<EntryId, LedgerError> {
    let pick = |len: usize| -> Result<usize, LedgerError> {
        if len == 0 {
            return Err(LedgerError::NothingToTamper);
        }
        select(len)
    };
    let edit = |original: &LedgerEntry| -> Result<LedgerEntry, LedgerError> {
        let mut edited = original.clone();
        mutation.apply(&mut edited)?;
        if edited.canonical_fields() == original.canonical_fields() {
            return Err(LedgerError::Precondition {
                field: "mutation",
                reason: "leaves the entry content unchanged",
            });
        }
        Ok(edited)
    };

    let original = store.edit_in_place(&pick, &edit)?;
    warn!(id = %original.id, ?mutation, "entry tampered");
    Ok(original.id)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tal_crypto::{ChainVerifier, EntryHasher, ViolationKind};
    use tal_types::TransactionEvent;

    use super::*;
    use crate::factory::EntryFactory;
    use crate::memory::InMemoryLedger;
    use crate::traits::{LedgerReader, LedgerWriter, TamperTarget};

    fn ledger(amounts: &[u64]) -> InMemoryLedger {
        let ledger = InMemoryLedger::new(EntryFactory::deterministic(
            EntryHasher::SHA256,
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        ));
        for (i, minor) in amounts.iter().enumerate() {
            ledger
                .append_event(&TransactionEvent::sale(
                    Amount::from_minor(*minor),
                    format!("TKT-{i}"),
                    "UA-AG-004",
                ))
                .unwrap();
        }
        ledger
    }

    #[test]
    fn tamper_hits_middle_entry() {
        let ledger = ledger(&[10_000, 25_000, 7_500, 4_000]);
        let before = ledger.all_oldest_first().unwrap();
        let id = tamper(&ledger).unwrap();

        assert_eq!(id, before[2].id);
        let after = ledger.get(&id).unwrap().unwrap();
        assert_eq!(after.amount, Amount::from_minor(7_500 + 15_075));
        assert_eq!(after.hash, before[2].hash);
        assert_eq!(after.previous_hash, before[2].previous_hash);

        let report = ChainVerifier::default().verify(&ledger.all_oldest_first().unwrap());
        assert_eq!(report.first_broken_entry_id.as_deref(), Some(id.as_str()));
        assert_eq!(report.violation_kind, Some(ViolationKind::Content));
    }

    #[test]
    fn tamper_single_entry_ledger() {
        let ledger = ledger(&[100]);
        let id = tamper(&ledger).unwrap();
        assert_eq!(ledger.all_oldest_first().unwrap()[0].id, id);
    }

    #[test]
    fn tamper_empty_ledger() {
        let ledger = ledger(&[]);
        assert_eq!(tamper(&ledger).unwrap_err(), LedgerError::NothingToTamper);
        assert_eq!(
            tamper_at(&ledger, 0, TamperMutation::Actor("x".into())).unwrap_err(),
            LedgerError::NothingToTamper
        );
    }

    #[test]
    fn tamper_at_subject_is_content_violation() {
        let ledger = ledger(&[100, 200, 300]);
        let id = tamper_at(&ledger, 0, TamperMutation::Subject("TKT-999".into())).unwrap();
        let report = ChainVerifier::default().verify(&ledger.all_oldest_first().unwrap());
        assert_eq!(report.first_broken_entry_id.as_deref(), Some(id.as_str()));
        assert_eq!(report.violation_kind, Some(ViolationKind::Content));
        assert_eq!(ledger.by_subject("TKT-999").unwrap().len(), 1);
    }

    #[test]
    fn tamper_at_out_of_range() {
        let ledger = ledger(&[100]);
        assert_eq!(
            tamper_at(&ledger, 5, TamperMutation::Amount(Amount::ZERO)).unwrap_err(),
            LedgerError::IndexOutOfRange { index: 5, len: 1 }
        );
    }

    #[test]
    fn raise_at_index_adds_delta() {
        let ledger = ledger(&[100, 200, 300]);
        let id = tamper_at(&ledger, 2, TamperMutation::Raise(TAMPER_DELTA)).unwrap();
        assert_eq!(ledger.get(&id).unwrap().unwrap().amount, Amount::from_minor(300 + 15_075));
    }

    #[test]
    fn overflowing_raise_leaves_store_untouched() {
        let ledger = ledger(&[100]);
        let before = ledger.all_oldest_first().unwrap();
        let err = tamper_at(&ledger, 0, TamperMutation::Raise(Amount::from_minor(u64::MAX))).unwrap_err();
        assert!(matches!(err, LedgerError::Precondition { field: "amount", .. }));
        assert_eq!(ledger.all_oldest_first().unwrap(), before);
    }

    #[test]
    fn victim_is_chosen_under_the_write_lock() {
        let ledger = ledger(&[100, 200, 300, 400]);
        let seen = std::cell::Cell::new(None);
        let original = ledger
            .edit_in_place(
                &|len| {
                    seen.set(Some(len));
                    Ok(len - 1)
                },
                &|entry| {
                    let mut edited = entry.clone();
                    edited.actor_id = "UA-AG-999".into();
                    Ok(edited)
                },
            )
            .unwrap();

        assert_eq!(seen.get(), Some(4));
        assert_eq!(original.amount, Amount::from_minor(400));
        let stored = ledger.get(&original.id).unwrap().unwrap();
        assert_eq!(stored.actor_id, "UA-AG-999");
        assert_eq!(stored.hash, original.hash);
    }

    #[test]
    fn concurrent_appends_never_split_a_tamper() {
        let ledger = std::sync::Arc::new(ledger(&[100, 200]));
        let writer = {
            let ledger = std::sync::Arc::clone(&ledger);
            std::thread::spawn(move || {
                for i in 0..50u64 {
                    ledger
                        .append_event(&TransactionEvent::sale(
                            Amount::from_minor(1_000 + i),
                            format!("TKT-W{i}"),
                            "UA-AG-004",
                        ))
                        .unwrap();
                }
            })
        };
        let mut tampered = Vec::new();
        for _ in 0..10 {
            tampered.push(tamper(&*ledger).unwrap());
        }
        writer.join().unwrap();

        let entries = ledger.all_oldest_first().unwrap();
        assert_eq!(entries.len(), 52);
        for id in tampered {
            assert!(entries.iter().any(|e| e.id == id));
        }
        assert!(!ChainVerifier::default().verify(&entries).ok);
    }

    #[test]
    fn no_op_mutation_is_rejected() {
        let ledger = ledger(&[100]);
        let err = tamper_at(&ledger, 0, TamperMutation::Actor("UA-AG-004".into())).unwrap_err();
        assert!(matches!(err, LedgerError::Precondition { field: "mutation", .. }));
        assert!(ChainVerifier::default().verify(&ledger.all_oldest_first().unwrap()).ok);
    }
}
