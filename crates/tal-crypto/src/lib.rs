//! Cryptographic core of the Ticket Audit Ledger.
//!
//! Provides the domain-separated entry hasher (SHA-256 or BLAKE3 over a
//! length-prefixed canonical encoding) and the hash-chain verifier that
//! distinguishes content tampering from linkage tampering.
//!
//! All digests wrap established libraries. Nothing here mutates a chain.

pub mod chain;
pub mod hasher;

pub use chain::{
    ChainLink, ChainScan, ChainVerifier, ScanCheckpoint, ScanProgress, VerificationReport,
    ViolationKind,
};
pub use hasher::{DigestAlgorithm, EntryHasher, HasherError};
