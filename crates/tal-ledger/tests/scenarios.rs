use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tal_crypto::{ChainVerifier, EntryHasher, VerificationReport, ViolationKind};
use tal_ledger::{
    tamper_at, AnomalyNotifier, AnomalyThresholds, ChannelSink, EntryFactory, InMemoryLedger,
    JournalLedger, LedgerReader, LedgerValidator, LedgerWriter, NotificationKind, TamperMutation,
};
use tal_types::{Amount, TransactionEvent};

fn factory() -> EntryFactory {
    EntryFactory::deterministic(
        EntryHasher::SHA256,
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
    )
}

fn sale(whole: u64, subject: &str) -> TransactionEvent {
    TransactionEvent::sale(Amount::from_major(whole).unwrap(), subject, "UA-AG-001")
}

fn three_sales(ledger: &dyn LedgerWriter) {
    for (whole, subject) in [(100, "TKT-1"), (250, "TKT-2"), (75, "TKT-3")] {
        ledger.append_event(&sale(whole, subject)).unwrap();
    }
}

#[test]
fn untouched_chain_verifies() {
    let ledger = InMemoryLedger::new(factory());
    three_sales(&ledger);

    let report = LedgerValidator::default().verify(&ledger).unwrap();
    assert_eq!(report, VerificationReport::verified());
    assert_eq!(
        serde_json::to_value(&report).unwrap(),
        serde_json::json!({"ok": true, "firstBrokenEntryId": null, "violationKind": null})
    );
}

#[test]
fn tampered_second_entry_is_content_violation() {
    let ledger = InMemoryLedger::new(factory());
    three_sales(&ledger);

    let id = tamper_at(&ledger, 1, TamperMutation::Amount(Amount::from_major(400).unwrap())).unwrap();
    assert_eq!(ledger.get(&id).unwrap().unwrap().amount.canonical(), "400.00");

    let report = LedgerValidator::default().verify(&ledger).unwrap();
    assert!(!report.ok);
    assert_eq!(report.first_broken_entry_id.as_deref(), Some(id.as_str()));
    assert_eq!(report.violation_kind, Some(ViolationKind::Content));
    assert_eq!(
        serde_json::to_value(&report).unwrap()["violationKind"],
        serde_json::json!("content")
    );
}

#[tokio::test]
async fn threshold_emits_exactly_one_anomaly() {
    let ledger = InMemoryLedger::new(factory());
    let (sink, mut rx) = ChannelSink::new();
    let notifier = AnomalyNotifier::new(
        AnomalyThresholds {
            transaction_threshold: Amount::from_major(1000).unwrap(),
            ..AnomalyThresholds::default()
        },
        Arc::new(sink),
    );

    let big = ledger.append_event(&sale(1500, "TKT-1")).unwrap();
    assert_eq!(notifier.notify(&big), 1);
    let small = ledger.append_event(&sale(999, "TKT-2")).unwrap();
    assert_eq!(notifier.notify(&small), 0);

    let received = rx.recv().await.unwrap();
    assert_eq!(received.kind, NotificationKind::TransactionAnomaly);
    assert!(received.message.contains(big.id.as_str()));
    assert!(rx.try_recv().is_err());
}

#[test]
fn independent_stores_produce_identical_hashes() {
    let a = InMemoryLedger::new(factory());
    let b = InMemoryLedger::new(factory());
    three_sales(&a);
    three_sales(&b);

    let hashes = |l: &InMemoryLedger| -> Vec<String> {
        l.all_oldest_first().unwrap().iter().map(|e| e.hash.to_hex()).collect()
    };
    assert_eq!(hashes(&a), hashes(&b));
    assert_eq!(hashes(&a).len(), 3);
}

#[test]
fn journal_reopen_yields_identical_hash_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tal.journal");
    let memory = InMemoryLedger::new(factory());
    three_sales(&memory);

    {
        let journal = JournalLedger::open(&path, factory()).unwrap();
        three_sales(&journal);
    }
    let journal = JournalLedger::open(&path, factory()).unwrap();
    assert_eq!(journal.all_oldest_first().unwrap(), memory.all_oldest_first().unwrap());
    assert!(LedgerValidator::default().verify(&journal).unwrap().ok);
}

#[test]
fn corrupted_journal_record_surfaces_as_linkage_violation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tal.journal");
    let third_id = {
        let journal = JournalLedger::open(&path, factory()).unwrap();
        three_sales(&journal);
        journal.all_oldest_first().unwrap()[2].id.clone()
    };

    // Flip a payload byte of the second record so its CRC fails.
    let mut bytes = Vec::new();
    OpenOptions::new().read(true).open(&path).unwrap().read_to_end(&mut bytes).unwrap();
    let first_len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as u64;
    let target = 8 + first_len + 8 + 4;
    let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(target)).unwrap();
    file.write_all(&[bytes[target as usize] ^ 0x5a]).unwrap();
    drop(file);

    let journal = JournalLedger::open(&path, factory()).unwrap();
    assert_eq!(journal.len().unwrap(), 2);
    let report = ChainVerifier::default().verify(&journal.all_oldest_first().unwrap());
    assert_eq!(report.first_broken_entry_id.as_deref(), Some(third_id.as_str()));
    assert_eq!(report.violation_kind, Some(ViolationKind::Linkage));
}

#[test]
fn appends_after_torn_tail_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tal.journal");
    {
        let journal = JournalLedger::open(&path, factory()).unwrap();
        journal.append_event(&sale(100, "TKT-1")).unwrap();
        journal.append_event(&sale(250, "TKT-2")).unwrap();
    }
    let len = std::fs::metadata(&path).unwrap().len();
    OpenOptions::new().write(true).open(&path).unwrap().set_len(len - 3).unwrap();

    let acknowledged = {
        let journal = JournalLedger::open(&path, EntryFactory::default()).unwrap();
        assert_eq!(journal.len().unwrap(), 1);
        for (whole, subject) in [(75, "TKT-3"), (40, "TKT-4"), (310, "TKT-5")] {
            journal.append_event(&sale(whole, subject)).unwrap();
        }
        journal.all_oldest_first().unwrap()
    };

    let journal = JournalLedger::open(&path, factory()).unwrap();
    assert_eq!(journal.len().unwrap(), 4);
    assert_eq!(journal.all_oldest_first().unwrap(), acknowledged);
    assert!(LedgerValidator::default().verify(&journal).unwrap().ok);
}
