use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tal_types::{EntryId, FraudScore, LedgerEntry};
use tracing::{debug, warn};

use crate::error::LedgerError;

/// One row of the journal.
///
/// On-disk framing:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized JournalRecord)]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalRecord {
    /// A sealed ledger entry, in append order.
    Entry(LedgerEntry),
    /// Fraud metadata attached after the fact.
    FraudScore { id: EntryId, score: FraudScore },
}

/// Flush strategy for journal writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every record.
    EveryWrite,
    /// Flush to the OS page cache only.
    #[default]
    OsDefault,
}

/// Errors from journal I/O.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("record of {0} bytes exceeds the frame limit")]
    RecordTooLarge(usize),

    #[error("journal writer lock poisoned")]
    Poisoned,
}

impl From<JournalError> for LedgerError {
    fn from(e: JournalError) -> Self {
        LedgerError::Journal(e.to_string())
    }
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: u64 = 8;

struct JournalWriter {
    writer: BufWriter<File>,
    offset: u64,
}

impl JournalWriter {
    /// Cut the file back to `len` bytes and point the writer at the new end.
    /// Bytes still buffered in the old writer are discarded, never flushed.
    fn truncate(&mut self, path: &Path, len: u64) -> Result<(), JournalError> {
        let file = OpenOptions::new().read(true).append(true).open(path)?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        let (_file, _unwritten) = stale.into_parts();
        self.writer.get_ref().set_len(len)?;
        self.writer.get_ref().sync_all()?;
        self.offset = len;
        Ok(())
    }
}

/// Append-only, CRC-framed record log backing [`crate::JournalLedger`].
///
/// Recovery reads front to back. A record failing its CRC is skipped with a
/// warning; the gap it leaves shows up as a linkage violation when the chain
/// is verified. A torn tail ends recovery and is cut off the file, so later
/// appends land directly after the last intact frame.
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    sync_mode: SyncMode,
}

impl Journal {
    /// Open (or create) the journal file at `path`.
    pub fn open(path: &Path, sync_mode: SyncMode) -> Result<Self, JournalError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(JournalWriter {
                writer: BufWriter::new(file),
                offset,
            }),
            sync_mode,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current end-of-file offset.
    pub fn offset(&self) -> Result<u64, JournalError> {
        Ok(self.lock()?.offset)
    }

    /// Append one record. Returns the byte offset it was written at.
    ///
    /// A failed write leaves no partial frame behind: the file is truncated
    /// back to `record_offset` before the error is returned.
    pub fn append(&self, record: &JournalRecord) -> Result<u64, JournalError> {
        let frame = encode_frame(record)?;
        let mut w = self.lock()?;
        let record_offset = w.offset;

        if let Err(e) = write_frame(&mut w.writer, &frame, self.sync_mode) {
            warn!(offset = record_offset, error = %e, "journal append failed; truncating");
            w.truncate(&self.path, record_offset)?;
            return Err(e.into());
        }
        w.offset += frame.len() as u64;

        debug!(offset = record_offset, len = frame.len(), "journal append");
        Ok(record_offset)
    }

    /// Read every intact record, in write order.
    ///
    /// Anything after the last complete frame is truncated away and the
    /// append offset is reset to the end of that frame.
    pub fn recover(&self) -> Result<Vec<JournalRecord>, JournalError> {
        let mut w = self.lock()?;
        let mut reader = BufReader::new(File::open(&self.path)?);
        let file_len = reader.get_ref().metadata()?.len();
        let mut records = Vec::new();
        let mut offset = 0u64;

        while offset + HEADER_SIZE <= file_len {
            let mut header = [0u8; HEADER_SIZE as usize];
            reader.read_exact(&mut header)?;
            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + HEADER_SIZE + u64::from(length) > file_len {
                warn!(offset, length, file_len, "torn journal tail; stopping recovery");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            reader.read_exact(&mut payload)?;
            offset += HEADER_SIZE + u64::from(length);

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "journal CRC mismatch; skipping record"
                );
                continue;
            }

            match bincode::deserialize::<JournalRecord>(&payload) {
                Ok(record) => records.push(record),
                Err(e) => warn!(offset, error = %e, "undecodable journal record; skipping"),
            }
        }

        if offset < file_len {
            warn!(valid_len = offset, file_len, "truncating torn journal tail");
            w.truncate(&self.path, offset)?;
        } else {
            w.offset = file_len;
        }

        debug!(recovered = records.len(), "journal recovery complete");
        Ok(records)
    }

    /// Atomically replace the whole journal with `records`.
    ///
    /// Writes a sibling temp file and renames it over the journal, so a
    /// crash leaves either the old or the new content.
    pub fn rewrite(&self, records: &[JournalRecord]) -> Result<(), JournalError> {
        let mut w = self.lock()?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        let mut written = 0u64;
        {
            let mut out = BufWriter::new(tmp.as_file_mut());
            for record in records {
                let frame = encode_frame(record)?;
                out.write_all(&frame)?;
                written += frame.len() as u64;
            }
            out.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| JournalError::Io(e.error))?;

        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        w.writer = BufWriter::new(file);
        w.offset = written;

        debug!(records = records.len(), bytes = written, "journal rewritten");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, JournalWriter>, JournalError> {
        self.writer.lock().map_err(|_| JournalError::Poisoned)
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("path", &self.path)
            .field("sync_mode", &self.sync_mode)
            .finish_non_exhaustive()
    }
}

fn write_frame(writer: &mut BufWriter<File>, frame: &[u8], sync_mode: SyncMode) -> io::Result<()> {
    writer.write_all(frame)?;
    writer.flush()?;
    if sync_mode == SyncMode::EveryWrite {
        writer.get_ref().sync_all()?;
    }
    Ok(())
}

fn encode_frame(record: &JournalRecord) -> Result<Vec<u8>, JournalError> {
    let payload =
        bincode::serialize(record).map_err(|e| JournalError::Serialization(e.to_string()))?;
    let length =
        u32::try_from(payload.len()).map_err(|_| JournalError::RecordTooLarge(payload.len()))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE as usize + payload.len());
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}
