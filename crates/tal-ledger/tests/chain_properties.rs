use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use tal_crypto::{ChainVerifier, EntryHasher, ViolationKind};
use tal_ledger::{tamper_at, EntryFactory, InMemoryLedger, LedgerReader, LedgerWriter, TamperMutation};
use tal_types::{Amount, EntryKind, LedgerEntry, TransactionEvent};

fn factory() -> EntryFactory {
    EntryFactory::deterministic(
        EntryHasher::SHA256,
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
    )
}

fn event_strategy() -> impl Strategy<Value = TransactionEvent> {
    (
        prop::sample::select(EntryKind::ALL.to_vec()),
        0u64..10_000_000,
        1u32..50,
        prop::sample::select(vec!["UA-AG-001", "UA-AG-002", "UA-AG-003"]),
    )
        .prop_map(|(kind, minor, ticket, agent)| {
            TransactionEvent::new(kind, Amount::from_minor(minor), format!("TKT-{ticket}"), agent)
        })
}

fn build(events: &[TransactionEvent]) -> InMemoryLedger {
    let ledger = InMemoryLedger::new(factory());
    for event in events {
        ledger.append_event(event).unwrap();
    }
    ledger
}

/// Re-append an edited sequence into a fresh store, as-is.
fn restore(entries: Vec<LedgerEntry>) -> InMemoryLedger {
    let ledger = InMemoryLedger::new(factory());
    for entry in entries {
        ledger.append(entry).unwrap();
    }
    ledger
}

proptest! {
    #[test]
    fn factory_built_chains_verify(events in prop::collection::vec(event_strategy(), 0..24)) {
        let ledger = build(&events);
        let entries = ledger.all_oldest_first().unwrap();
        prop_assert!(ChainVerifier::default().verify(&entries).ok);
        if let Some(first) = entries.first() {
            prop_assert!(first.previous_hash.is_genesis());
        }
    }

    #[test]
    fn single_content_edit_fails_at_that_entry(
        events in prop::collection::vec(event_strategy(), 1..24),
        pick in any::<prop::sample::Index>(),
        bump in 1u64..1_000_000,
    ) {
        let ledger = build(&events);
        let index = pick.index(events.len());
        let original = ledger.all_oldest_first().unwrap()[index].clone();
        let edited = Amount::from_minor(original.amount.minor_units() + bump);

        let id = tamper_at(&ledger, index, TamperMutation::Amount(edited)).unwrap();
        let report = ChainVerifier::default().verify(&ledger.all_oldest_first().unwrap());
        prop_assert!(!report.ok);
        prop_assert_eq!(report.first_broken_entry_id.as_deref(), Some(id.as_str()));
        prop_assert_eq!(report.violation_kind, Some(ViolationKind::Content));
    }

    #[test]
    fn removal_fails_downstream_with_linkage(
        events in prop::collection::vec(event_strategy(), 2..24),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut entries = build(&events).all_oldest_first().unwrap();
        // Removing the head leaves a valid shorter chain, so pick a non-head entry.
        let index = pick.index(entries.len() - 1);
        entries.remove(index);
        let downstream = entries[index].id.clone();

        let report = ChainVerifier::default().verify(&restore(entries).all_oldest_first().unwrap());
        prop_assert_eq!(report.first_broken_entry_id.as_deref(), Some(downstream.as_str()));
        prop_assert_eq!(report.violation_kind, Some(ViolationKind::Linkage));
    }

    #[test]
    fn adjacent_swap_fails_with_linkage(
        events in prop::collection::vec(event_strategy(), 2..24),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut entries = build(&events).all_oldest_first().unwrap();
        let index = pick.index(entries.len() - 1);
        entries.swap(index, index + 1);
        let moved_up = entries[index].id.clone();

        let report = ChainVerifier::default().verify(&restore(entries).all_oldest_first().unwrap());
        prop_assert_eq!(report.first_broken_entry_id.as_deref(), Some(moved_up.as_str()));
        prop_assert_eq!(report.violation_kind, Some(ViolationKind::Linkage));
    }

    #[test]
    fn verify_is_idempotent_and_read_only(events in prop::collection::vec(event_strategy(), 0..16)) {
        let ledger = build(&events);
        let before = ledger.all_oldest_first().unwrap();
        let first = ChainVerifier::default().verify(&before);
        let second = ChainVerifier::default().verify(&ledger.all_oldest_first().unwrap());
        prop_assert_eq!(first, second);
        prop_assert_eq!(before, ledger.all_oldest_first().unwrap());
    }

    #[test]
    fn digests_are_deterministic(fields in prop::collection::vec(".*", 0..8)) {
        let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
        for hasher in [EntryHasher::SHA256, EntryHasher::BLAKE3] {
            prop_assert_eq!(hasher.digest(&refs), hasher.digest(&refs));
        }
    }
}
