//! Append-only commit log.
//!
//! One file per store (`commits.log`), one frame per committed transaction:
//!
//! ```text
//! [len: u32 LE][bincode(CommitRecord): len bytes]
//! ```
//!
//! Replay stops at a torn tail frame (crash during append) and truncates the
//! file back to the last complete frame. A complete frame that fails to
//! decode is corruption and is reported, not skipped. A frame whose write
//! fails is cut back out of the file before the error reaches the caller.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::storage::CommitRecord;

pub const COMMIT_LOG_FILE: &str = "commits.log";

const FRAME_HEADER_LEN: usize = 4;

/// When a commit is considered durable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurabilityMode {
    /// `sync_data` after every commit.
    #[default]
    Sync,
    /// Write through the OS page cache, never sync.
    Buffered,
}

impl DurabilityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DurabilityMode::Sync => "sync",
            DurabilityMode::Buffered => "buffered",
        }
    }
}

impl FromStr for DurabilityMode {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sync" | "fsync" => Ok(DurabilityMode::Sync),
            "buffered" | "none" => Ok(DurabilityMode::Buffered),
            other => Err(BenchError::InvalidConfig(format!(
                "unknown durability mode '{}' (expected sync|buffered)",
                other
            ))),
        }
    }
}

/// Destination of commit frames. `File` in production.
trait LogSink: Send {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
    /// Cut the sink back to `len` bytes and continue writing from there.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogSink for File {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.write_all(frame)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::Start(len))?;
        Ok(())
    }
}

struct LogWriter {
    sink: Box<dyn LogSink>,
    /// Bytes of complete, acknowledged frames.
    len: u64,
    /// Set when a failed append could not be cut back out of the file.
    poisoned: bool,
}

pub struct CommitLog {
    path: PathBuf,
    durability: DurabilityMode,
    writer: Mutex<LogWriter>,
}

impl CommitLog {
    /// Create a fresh log file. Fails if one already exists.
    pub fn create(dir: &Path, durability: DurabilityMode) -> Result<Self> {
        let path = dir.join(COMMIT_LOG_FILE);
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        Ok(Self::with_sink(path, durability, Box::new(file), 0))
    }

    /// Open an existing log for appending, after replaying its records.
    pub fn open(dir: &Path, durability: DurabilityMode) -> Result<(Self, Vec<CommitRecord>)> {
        let path = dir.join(COMMIT_LOG_FILE);
        let records = replay(&path)?;
        let file = OpenOptions::new().write(true).open(&path)?;
        let len = file.metadata()?.len();
        let mut sink: Box<dyn LogSink> = Box::new(file);
        sink.truncate(len)?;
        Ok((Self::with_sink(path, durability, sink, len), records))
    }

    fn with_sink(path: PathBuf, durability: DurabilityMode, sink: Box<dyn LogSink>, len: u64) -> Self {
        Self {
            path,
            durability,
            writer: Mutex::new(LogWriter {
                sink,
                len,
                poisoned: false,
            }),
        }
    }

    /// Append one commit record. Returns the number of bytes written.
    ///
    /// A frame is acknowledged only once it is fully written (and synced in
    /// `Sync` mode). On failure the file is cut back to the last acknowledged
    /// frame so replay never sees the rejected commit; if even that fails the
    /// log refuses further appends.
    pub fn append(&self, record: &CommitRecord) -> Result<usize> {
        let payload = bincode::serialize(record)?;
        let len = u32::try_from(payload.len()).map_err(|_| {
            BenchError::InvalidFormat(format!("commit record too large: {} bytes", payload.len()))
        })?;
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);

        let mut writer = self.writer.lock().unwrap();
        if writer.poisoned {
            return Err(BenchError::StoreUnavailable {
                path: self.path.clone(),
                reason: "commit log was left with an unacknowledged frame".into(),
            });
        }

        let mut written = writer.sink.write_frame(&frame);
        if written.is_ok() && self.durability == DurabilityMode::Sync {
            written = writer.sink.sync();
        }
        if let Err(e) = written {
            let acknowledged = writer.len;
            if let Err(cut) = writer.sink.truncate(acknowledged) {
                tracing::error!(
                    "commit log {}: cannot drop failed frame at offset {}: {}",
                    self.path.display(),
                    acknowledged,
                    cut
                );
                writer.poisoned = true;
            }
            return Err(e.into());
        }

        writer.len += frame.len() as u64;
        Ok(frame.len())
    }
}

/// Read all complete records from a log file.
///
/// A partial frame at the end is truncated away with a warning.
pub fn replay(path: &Path) -> Result<Vec<CommitRecord>> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;

    let mut records = Vec::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let remaining = bytes.len() - offset;
        if remaining < FRAME_HEADER_LEN {
            truncate_torn_tail(path, offset, remaining)?;
            break;
        }

        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&bytes[offset..offset + FRAME_HEADER_LEN]);
        let len = u32::from_le_bytes(header) as usize;

        if remaining - FRAME_HEADER_LEN < len {
            truncate_torn_tail(path, offset, remaining)?;
            break;
        }

        let start = offset + FRAME_HEADER_LEN;
        let record: CommitRecord = bincode::deserialize(&bytes[start..start + len]).map_err(|e| {
            BenchError::InvalidFormat(format!("corrupt commit record at offset {}: {}", offset, e))
        })?;
        records.push(record);
        offset = start + len;
    }

    Ok(records)
}

fn truncate_torn_tail(path: &Path, offset: usize, remaining: usize) -> Result<()> {
    tracing::warn!(
        "commit log {}: dropping torn tail of {} bytes at offset {}",
        path.display(),
        remaining,
        offset
    );
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(offset as u64)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{EdgeRecord, NodeRecord, PropertyValue};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn record(tx_id: u64, node: u64) -> CommitRecord {
        let mut n = NodeRecord::new(node);
        n.properties.insert("name".to_string(), PropertyValue::from(format!("n{}", node)));
        CommitRecord {
            tx_id,
            nodes: vec![n],
            edges: vec![EdgeRecord { src: node, dst: 0, edge_type: "LIKES".to_string() }],
            ..Default::default()
        }
    }

    #[test]
    fn test_append_then_replay() {
        let dir = tempdir().unwrap();
        let log = CommitLog::create(dir.path(), DurabilityMode::Buffered).unwrap();
        log.append(&record(1, 10)).unwrap();
        log.append(&record(2, 11)).unwrap();
        drop(log);

        let records = replay(&dir.path().join(COMMIT_LOG_FILE)).unwrap();
        assert_eq!(records, vec![record(1, 10), record(2, 11)]);
    }

    #[test]
    fn test_create_refuses_existing_log() {
        let dir = tempdir().unwrap();
        let _log = CommitLog::create(dir.path(), DurabilityMode::Buffered).unwrap();
        assert!(CommitLog::create(dir.path(), DurabilityMode::Buffered).is_err());
    }

    #[test]
    fn test_replay_truncates_torn_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(COMMIT_LOG_FILE);
        let log = CommitLog::create(dir.path(), DurabilityMode::Sync).unwrap();
        let first = log.append(&record(1, 10)).unwrap();
        log.append(&record(2, 11)).unwrap();
        drop(log);

        // Chop the second frame in half
        let full_len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full_len - 5).unwrap();
        drop(file);

        let records = replay(&path).unwrap();
        assert_eq!(records, vec![record(1, 10)]);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), first as u64);
    }

    #[test]
    fn test_replay_rejects_corrupt_frame() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(COMMIT_LOG_FILE);
        let mut bytes = 3u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0xff, 0xff, 0xff]);
        std::fs::write(&path, bytes).unwrap();

        let err = replay(&path).unwrap_err();
        assert!(matches!(err, BenchError::InvalidFormat(_)));
    }

    #[test]
    fn test_open_appends_after_existing_records() {
        let dir = tempdir().unwrap();
        {
            let log = CommitLog::create(dir.path(), DurabilityMode::Buffered).unwrap();
            log.append(&record(1, 10)).unwrap();
        }
        {
            let (log, records) = CommitLog::open(dir.path(), DurabilityMode::Buffered).unwrap();
            assert_eq!(records.len(), 1);
            log.append(&record(2, 11)).unwrap();
        }
        let records = replay(&dir.path().join(COMMIT_LOG_FILE)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].tx_id, 2);
    }

    /// File sink whose writes or syncs can be made to fail on demand.
    struct FlakySink {
        file: File,
        fail_sync: Arc<AtomicBool>,
        /// Write this many bytes of the next frame, then fail.
        short_write: Arc<Mutex<Option<usize>>>,
        fail_truncate: bool,
    }

    impl LogSink for FlakySink {
        fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
            if let Some(n) = self.short_write.lock().unwrap().take() {
                self.file.write_all(&frame[..n])?;
                return Err(io::Error::new(io::ErrorKind::Other, "no space left on device"));
            }
            self.file.write_all(frame)
        }

        fn sync(&mut self) -> io::Result<()> {
            if self.fail_sync.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "sync failed"));
            }
            self.file.sync_data()
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            if self.fail_truncate {
                return Err(io::Error::new(io::ErrorKind::Other, "read-only filesystem"));
            }
            LogSink::truncate(&mut self.file, len)
        }
    }

    struct Faults {
        fail_sync: Arc<AtomicBool>,
        short_write: Arc<Mutex<Option<usize>>>,
    }

    fn flaky_log(dir: &Path, fail_truncate: bool) -> (CommitLog, Faults) {
        let path = dir.join(COMMIT_LOG_FILE);
        let file = OpenOptions::new().write(true).create_new(true).open(&path).unwrap();
        let faults = Faults {
            fail_sync: Arc::new(AtomicBool::new(false)),
            short_write: Arc::new(Mutex::new(None)),
        };
        let sink = FlakySink {
            file,
            fail_sync: Arc::clone(&faults.fail_sync),
            short_write: Arc::clone(&faults.short_write),
            fail_truncate,
        };
        (CommitLog::with_sink(path, DurabilityMode::Sync, Box::new(sink), 0), faults)
    }

    #[test]
    fn test_failed_sync_is_not_replayed() {
        let dir = tempdir().unwrap();
        let (log, faults) = flaky_log(dir.path(), false);
        log.append(&record(1, 10)).unwrap();

        faults.fail_sync.store(true, Ordering::SeqCst);
        assert!(matches!(log.append(&record(2, 11)), Err(BenchError::Io(_))));
        faults.fail_sync.store(false, Ordering::SeqCst);

        log.append(&record(3, 12)).unwrap();
        drop(log);

        let records = replay(&dir.path().join(COMMIT_LOG_FILE)).unwrap();
        assert_eq!(records, vec![record(1, 10), record(3, 12)]);
    }

    #[test]
    fn test_partial_write_is_cut_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(COMMIT_LOG_FILE);
        let (log, faults) = flaky_log(dir.path(), false);
        let first = log.append(&record(1, 10)).unwrap();

        *faults.short_write.lock().unwrap() = Some(6);
        assert!(log.append(&record(2, 11)).is_err());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), first as u64);

        log.append(&record(3, 12)).unwrap();
        drop(log);
        assert_eq!(replay(&path).unwrap(), vec![record(1, 10), record(3, 12)]);
    }

    #[test]
    fn test_log_refuses_appends_after_failed_cut() {
        let dir = tempdir().unwrap();
        let (log, faults) = flaky_log(dir.path(), true);
        log.append(&record(1, 10)).unwrap();

        faults.fail_sync.store(true, Ordering::SeqCst);
        assert!(log.append(&record(2, 11)).is_err());
        faults.fail_sync.store(false, Ordering::SeqCst);

        let err = log.append(&record(3, 12)).unwrap_err();
        assert_eq!(err.code(), "STORE_UNAVAILABLE");
    }

    #[test]
    fn test_durability_mode_from_str() {
        assert_eq!("sync".parse::<DurabilityMode>().unwrap(), DurabilityMode::Sync);
        assert_eq!("Buffered".parse::<DurabilityMode>().unwrap(), DurabilityMode::Buffered);
        assert!("eventually".parse::<DurabilityMode>().is_err());
    }
}
