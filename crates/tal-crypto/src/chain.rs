use std::fmt;

use serde::{Deserialize, Serialize};
use tal_types::{EntryHash, LedgerEntry};

use crate::hasher::EntryHasher;

/// Trait for records that participate in a hash chain.
pub trait ChainLink {
    /// Identifier reported when this link fails verification.
    fn link_id(&self) -> &str;
    /// The stored hash of this link.
    fn link_hash(&self) -> EntryHash;
    /// The stored hash of the predecessor (genesis sentinel for the first link).
    fn previous_link_hash(&self) -> EntryHash;
    /// Hash input fields in canonical order.
    fn hash_fields(&self) -> Vec<String>;
}

impl ChainLink for LedgerEntry {
    fn link_id(&self) -> &str {
        self.id.as_str()
    }

    fn link_hash(&self) -> EntryHash {
        self.hash
    }

    fn previous_link_hash(&self) -> EntryHash {
        self.previous_hash
    }

    fn hash_fields(&self) -> Vec<String> {
        self.canonical_fields().to_vec()
    }
}

/// Which chain invariant a link violated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationKind {
    /// Recomputed hash differs from the stored one: fields changed after sealing.
    Content,
    /// `previous_hash` does not point at the predecessor: an entry was
    /// altered, inserted, removed, or the order changed.
    Linkage,
}

impl ViolationKind {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Content => "content altered after sealing",
            Self::Linkage => "chain broken or reordered",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Content => "content",
            Self::Linkage => "linkage",
        })
    }
}

/// Outcome of verifying a chain.
///
/// A broken chain is an expected result, not an error. The JSON form has
/// exactly the fields `ok`, `firstBrokenEntryId` and `violationKind`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub ok: bool,
    pub first_broken_entry_id: Option<String>,
    pub violation_kind: Option<ViolationKind>,
}

impl VerificationReport {
    pub fn verified() -> Self {
        Self {
            ok: true,
            first_broken_entry_id: None,
            violation_kind: None,
        }
    }

    pub fn broken(entry_id: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            ok: false,
            first_broken_entry_id: Some(entry_id.into()),
            violation_kind: Some(kind),
        }
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.first_broken_entry_id, self.violation_kind) {
            (Some(id), Some(kind)) => write!(f, "failed at entry {id}: {}", kind.describe()),
            _ => f.write_str("verified"),
        }
    }
}

/// Resume point of an interrupted scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanCheckpoint {
    /// Number of links already verified, oldest first.
    pub position: u64,
    /// Hash the next link must carry as its `previous_hash`.
    pub expected_previous: EntryHash,
}

impl ScanCheckpoint {
    pub const START: Self = Self {
        position: 0,
        expected_previous: EntryHash::GENESIS,
    };
}

/// Result of feeding one batch into a [`ChainScan`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanProgress {
    /// Batch verified; continue from this checkpoint.
    Continue(ScanCheckpoint),
    /// A violation was found; the scan is finished.
    Broken(VerificationReport),
}

/// Interruptible, checkpointable oldest-first chain scan.
///
/// Feed consecutive batches; persist [`ChainScan::checkpoint`] between
/// batches to resume later with [`ChainScan::resume`]. Once a violation is
/// found every further batch is ignored.
#[derive(Clone, Debug)]
pub struct ChainScan {
    hasher: EntryHasher,
    checkpoint: ScanCheckpoint,
    broken: Option<VerificationReport>,
}

impl ChainScan {
    pub fn new(hasher: EntryHasher) -> Self {
        Self::resume(hasher, ScanCheckpoint::START)
    }

    pub fn resume(hasher: EntryHasher, checkpoint: ScanCheckpoint) -> Self {
        Self {
            hasher,
            checkpoint,
            broken: None,
        }
    }

    pub fn checkpoint(&self) -> ScanCheckpoint {
        self.checkpoint
    }

    /// Verify the next batch of links, which must start at `checkpoint().position`.
    pub fn feed<L: ChainLink>(&mut self, batch: &[L]) -> ScanProgress {
        if let Some(report) = &self.broken {
            return ScanProgress::Broken(report.clone());
        }

        for link in batch {
            match check_link(&self.hasher, link, self.checkpoint.expected_previous) {
                Ok(hash) => {
                    self.checkpoint.expected_previous = hash;
                    self.checkpoint.position += 1;
                }
                Err(kind) => {
                    let report = VerificationReport::broken(link.link_id(), kind);
                    self.broken = Some(report.clone());
                    return ScanProgress::Broken(report);
                }
            }
        }

        ScanProgress::Continue(self.checkpoint)
    }

    /// Final report once every batch has been fed.
    pub fn finish(self) -> VerificationReport {
        self.broken.unwrap_or_else(VerificationReport::verified)
    }
}

/// Hash chain verifier.
///
/// Walks links oldest first. For each link the content check runs before
/// the linkage check, and the first failure ends the walk:
/// 1. recomputed hash must equal the stored hash, else `Content`
/// 2. `previous_hash` must equal the predecessor's hash (genesis sentinel
///    for the first link), else `Linkage`
#[derive(Clone, Copy, Debug, Default)]
pub struct ChainVerifier {
    hasher: EntryHasher,
}

impl ChainVerifier {
    pub fn new(hasher: EntryHasher) -> Self {
        Self { hasher }
    }

    pub fn hasher(&self) -> EntryHasher {
        self.hasher
    }

    /// Verify a complete chain given oldest first. An empty chain is valid.
    pub fn verify<L: ChainLink>(&self, links_oldest_first: &[L]) -> VerificationReport {
        let mut scan = self.scan();
        scan.feed(links_oldest_first);
        scan.finish()
    }

    /// Start a checkpointable scan from genesis.
    pub fn scan(&self) -> ChainScan {
        ChainScan::new(self.hasher)
    }

    /// Resume a scan from a saved checkpoint.
    pub fn resume(&self, checkpoint: ScanCheckpoint) -> ChainScan {
        ChainScan::resume(self.hasher, checkpoint)
    }
}

fn check_link<L: ChainLink>(
    hasher: &EntryHasher,
    link: &L,
    expected_previous: EntryHash,
) -> Result<EntryHash, ViolationKind> {
    let fields = link.hash_fields();
    let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
    let stored = link.link_hash();
    if hasher.digest(&refs) != stored {
        return Err(ViolationKind::Content);
    }
    if link.previous_link_hash() != expected_previous {
        return Err(ViolationKind::Linkage);
    }
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal link for exercising the verifier without full entries.
    #[derive(Clone)]
    struct TestLink {
        id: String,
        hash: EntryHash,
        prev: EntryHash,
        payload: String,
    }

    impl ChainLink for TestLink {
        fn link_id(&self) -> &str {
            &self.id
        }
        fn link_hash(&self) -> EntryHash {
            self.hash
        }
        fn previous_link_hash(&self) -> EntryHash {
            self.prev
        }
        fn hash_fields(&self) -> Vec<String> {
            vec![self.id.clone(), self.payload.clone(), self.prev.to_hex()]
        }
    }

    fn build_chain(count: usize) -> Vec<TestLink> {
        let mut chain = Vec::new();
        let mut prev = EntryHash::GENESIS;
        for i in 0..count {
            let mut link = TestLink {
                id: format!("L-{i}"),
                hash: EntryHash::GENESIS,
                prev,
                payload: format!("payload-{i}"),
            };
            let fields = link.hash_fields();
            let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
            link.hash = EntryHasher::SHA256.digest(&refs);
            prev = link.hash;
            chain.push(link);
        }
        chain
    }

    #[test]
    fn empty_chain_is_valid() {
        let chain: Vec<TestLink> = vec![];
        assert_eq!(ChainVerifier::default().verify(&chain), VerificationReport::verified());
    }

    #[test]
    fn multi_link_chain_is_valid() {
        assert!(ChainVerifier::default().verify(&build_chain(10)).ok);
    }

    #[test]
    fn tampered_payload_is_content_violation() {
        let mut chain = build_chain(3);
        chain[1].payload = "tampered".into();
        assert_eq!(
            ChainVerifier::default().verify(&chain),
            VerificationReport::broken("L-1", ViolationKind::Content)
        );
    }

    #[test]
    fn removed_link_is_linkage_violation_downstream() {
        let mut chain = build_chain(4);
        chain.remove(1);
        assert_eq!(
            ChainVerifier::default().verify(&chain),
            VerificationReport::broken("L-2", ViolationKind::Linkage)
        );
    }

    #[test]
    fn genesis_must_carry_sentinel() {
        let chain = build_chain(3);
        // Dropping the first link makes L-1 the head; its seal is intact but it
        // points at L-0 instead of the sentinel.
        assert_eq!(
            ChainVerifier::default().verify(&chain[1..]),
            VerificationReport::broken("L-1", ViolationKind::Linkage)
        );
    }

    #[test]
    fn content_check_precedes_linkage_check() {
        let mut chain = build_chain(3);
        chain[1].prev = EntryHash::from_bytes([9; 32]);
        // prev is part of the hash input, so the stale seal fails first.
        assert_eq!(
            ChainVerifier::default().verify(&chain).violation_kind,
            Some(ViolationKind::Content)
        );
    }

    #[test]
    fn wrong_algorithm_reports_content_violation_at_first_link() {
        let chain = build_chain(2);
        let report = ChainVerifier::new(EntryHasher::BLAKE3).verify(&chain);
        assert_eq!(report, VerificationReport::broken("L-0", ViolationKind::Content));
    }

    #[test]
    fn batched_scan_matches_single_pass() {
        let mut chain = build_chain(7);
        chain[5].payload = "edited".into();
        let verifier = ChainVerifier::default();
        let expected = verifier.verify(&chain);

        let mut scan = verifier.scan();
        let mut checkpoint = scan.checkpoint();
        for batch in chain.chunks(2) {
            match scan.feed(batch) {
                ScanProgress::Continue(cp) => checkpoint = cp,
                ScanProgress::Broken(_) => break,
            }
        }
        assert_eq!(checkpoint.position, 4);
        assert_eq!(scan.finish(), expected);
    }

    #[test]
    fn resumed_scan_continues_from_checkpoint() {
        let chain = build_chain(6);
        let verifier = ChainVerifier::default();
        let mut first = verifier.scan();
        let checkpoint = match first.feed(&chain[..3]) {
            ScanProgress::Continue(cp) => cp,
            ScanProgress::Broken(report) => panic!("unexpected break: {report}"),
        };
        assert_eq!(checkpoint.expected_previous, chain[2].hash);

        let mut resumed = verifier.resume(checkpoint);
        resumed.feed(&chain[3..]);
        assert!(resumed.finish().ok);
    }

    #[test]
    fn broken_scan_ignores_later_batches() {
        let mut chain = build_chain(4);
        chain[0].payload = "x".into();
        let mut scan = ChainVerifier::default().scan();
        assert!(matches!(scan.feed(&chain[..2]), ScanProgress::Broken(_)));
        assert!(matches!(scan.feed(&chain[2..]), ScanProgress::Broken(_)));
        assert_eq!(scan.finish().first_broken_entry_id.as_deref(), Some("L-0"));
    }

    #[test]
    fn report_json_has_exact_wire_fields() {
        let json = serde_json::to_value(VerificationReport::broken("TXN-2", ViolationKind::Content)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"ok": false, "firstBrokenEntryId": "TXN-2", "violationKind": "content"})
        );
        let ok = serde_json::to_value(VerificationReport::verified()).unwrap();
        assert_eq!(
            ok,
            serde_json::json!({"ok": true, "firstBrokenEntryId": null, "violationKind": null})
        );
    }

    #[test]
    fn report_display_differentiates_reasons() {
        assert_eq!(VerificationReport::verified().to_string(), "verified");
        assert_eq!(
            VerificationReport::broken("TXN-7", ViolationKind::Linkage).to_string(),
            "failed at entry TXN-7: chain broken or reordered"
        );
    }
}
