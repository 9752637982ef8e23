//! Append-only log record file.

use crate::error::{Result, StoreError};
use crate::types::{Level, LogRecord, RecordId, RecordInput, Timestamp};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for the record log.
const LOG_MAGIC: &[u8; 4] = b"LRC\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

/// Append-only record log.
///
/// Records are framed with magic, version, and a checksum; bulk deletion
/// rewrites the surviving records to a temporary file which replaces the
/// log in one rename, so a delete either fully applies or has no effect.
pub struct RecordLog {
    /// Path to the log file.
    path: PathBuf,

    /// Log file handle.
    file: RwLock<File>,

    /// Next record ID to assign.
    next_id: RwLock<u64>,

    /// Current file size (for appending).
    file_size: RwLock<u64>,

    /// Number of writes since last sync.
    writes_since_sync: RwLock<u64>,

    /// Sync every N writes.
    sync_interval: u64,
}

impl RecordLog {
    /// Default sync interval - sync every 100 writes for balance of durability and performance.
    const DEFAULT_SYNC_INTERVAL: u64 = 100;

    /// Open or create a record log with default sync interval.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_sync_interval(path, Self::DEFAULT_SYNC_INTERVAL)
    }

    /// Open or create a record log with custom sync interval.
    /// - sync_interval = 1: sync every write (safest, slowest)
    /// - sync_interval = 100: sync every 100 writes (good balance)
    pub fn open_with_sync_interval(path: impl AsRef<Path>, sync_interval: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let file_size = file.metadata()?.len();

        // Recover the id counter by scanning if the file is non-empty
        let next_id = if file_size > 0 {
            Self::find_max_id(&file)? + 1
        } else {
            1
        };

        Ok(Self {
            path,
            file: RwLock::new(file),
            next_id: RwLock::new(next_id),
            file_size: RwLock::new(file_size),
            writes_since_sync: RwLock::new(0),
            sync_interval: sync_interval.max(1),
        })
    }

    /// Append a record to the log.
    ///
    /// Assigns the next id and returns the record with the offset where it
    /// was written.
    pub fn append(&self, input: RecordInput) -> Result<(LogRecord, u64)> {
        let mut file = self.file.write();

        let id = RecordId(*self.next_id.read());
        *self.next_id.write() += 1;

        let record = LogRecord {
            id,
            customer_id: input.customer_id,
            sent_at: input.sent_at,
            module: input.module,
            level: input.level,
            message: input.message,
        };

        let offset = *self.file_size.read();
        file.seek(SeekFrom::Start(offset))?;

        Self::write_record(&mut *file, &record)?;

        let new_size = file.stream_position()?;
        *self.file_size.write() = new_size;

        // Sync periodically based on sync_interval
        let mut writes = self.writes_since_sync.write();
        *writes += 1;
        if *writes >= self.sync_interval {
            file.sync_all()?;
            *writes = 0;
        }

        Ok((record, offset))
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let file = self.file.write();
        file.sync_all()?;
        *self.writes_since_sync.write() = 0;
        Ok(())
    }

    /// Read a record at a given offset.
    pub fn read_at(&self, offset: u64) -> Result<LogRecord> {
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        Self::read_record(&mut *file)
    }

    /// Iterate all records from the start of the log.
    pub fn iter(&self) -> RecordIterator<'_> {
        RecordIterator {
            log: self,
            offset: 0,
            end: *self.file_size.read(),
        }
    }

    /// Get current file size.
    pub fn size(&self) -> u64 {
        *self.file_size.read()
    }

    /// Keep only the records for which `keep` returns true.
    ///
    /// Survivors are rewritten to a temporary file, synced, and renamed over
    /// the log, so the deletion is all-or-nothing. Record ids are preserved
    /// and the id counter is not rewound. Returns the number of records
    /// removed.
    pub fn retain<F>(&self, keep: F) -> Result<u64>
    where
        F: Fn(&LogRecord) -> bool,
    {
        let mut file = self.file.write();
        let end = *self.file_size.read();

        let tmp_path = self.path.with_extension("rewrite");
        let result = Self::rewrite_surviving(&mut *file, end, &tmp_path, &keep);

        let removed = match result {
            Ok(removed) => removed,
            Err(e) => {
                // Leave the log untouched on failure
                let _ = std::fs::remove_file(&tmp_path);
                return Err(e);
            }
        };

        if removed == 0 {
            let _ = std::fs::remove_file(&tmp_path);
            return Ok(0);
        }

        std::fs::rename(&tmp_path, &self.path)?;

        let new_file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let new_size = new_file.metadata()?.len();
        *file = new_file;
        *self.file_size.write() = new_size;
        *self.writes_since_sync.write() = 0;

        Ok(removed)
    }

    /// Copy records passing `keep` from `file` into a fresh log at `tmp_path`.
    fn rewrite_surviving<F>(file: &mut File, end: u64, tmp_path: &Path, keep: &F) -> Result<u64>
    where
        F: Fn(&LogRecord) -> bool,
    {
        let mut tmp = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(tmp_path)?;

        let mut removed = 0u64;
        file.seek(SeekFrom::Start(0))?;
        while file.stream_position()? < end {
            let record = Self::read_record(file)?;
            if keep(&record) {
                Self::write_record(&mut tmp, &record)?;
            } else {
                removed += 1;
            }
        }

        tmp.sync_all()?;
        Ok(removed)
    }

    /// Write a record to the file at current position.
    fn write_record(file: &mut File, record: &LogRecord) -> Result<()> {
        // Magic
        file.write_all(LOG_MAGIC)?;

        // Version
        file.write_all(&[LOG_VERSION])?;

        // Flags (reserved)
        file.write_all(&[0u8])?;

        // Record ID
        file.write_all(&record.id.0.to_le_bytes())?;

        // Sent-at timestamp
        file.write_all(&record.sent_at.0.to_le_bytes())?;

        // Level bitmask
        file.write_all(&record.level.0.to_le_bytes())?;

        // Customer id
        Self::write_opt_str(file, record.customer_id.as_deref())?;

        // Module
        Self::write_opt_str(file, record.module.as_deref())?;

        // Message
        Self::write_opt_str(file, record.message.as_deref())?;

        // Checksum of the message payload
        let checksum = crc32fast::hash(record.message.as_deref().unwrap_or("").as_bytes());
        file.write_all(&checksum.to_le_bytes())?;

        Ok(())
    }

    /// Read a record from the file at current position.
    fn read_record(file: &mut File) -> Result<LogRecord> {
        // Magic
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != LOG_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid record magic".into()));
        }

        // Version
        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != LOG_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported log version: {}",
                version[0]
            )));
        }

        // Flags
        let mut _flags = [0u8; 1];
        file.read_exact(&mut _flags)?;

        // Record ID
        let mut id_bytes = [0u8; 8];
        file.read_exact(&mut id_bytes)?;
        let id = RecordId(u64::from_le_bytes(id_bytes));

        // Sent-at timestamp
        let mut ts_bytes = [0u8; 8];
        file.read_exact(&mut ts_bytes)?;
        let sent_at = Timestamp(i64::from_le_bytes(ts_bytes));

        // Level bitmask
        let mut level_bytes = [0u8; 4];
        file.read_exact(&mut level_bytes)?;
        let level = Level(u32::from_le_bytes(level_bytes));

        let customer_id = Self::read_opt_str(file)?;
        let module = Self::read_opt_str(file)?;
        let message = Self::read_opt_str(file)?;

        // Checksum
        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);
        let computed_checksum = crc32fast::hash(message.as_deref().unwrap_or("").as_bytes());

        if stored_checksum != computed_checksum {
            return Err(StoreError::ChecksumMismatch {
                expected: stored_checksum,
                got: computed_checksum,
            });
        }

        Ok(LogRecord {
            id,
            customer_id,
            sent_at,
            module,
            level,
            message,
        })
    }

    /// Write an optional string: presence byte, then length-prefixed bytes.
    fn write_opt_str(file: &mut File, value: Option<&str>) -> Result<()> {
        match value {
            Some(s) => {
                file.write_all(&[1u8])?;
                let bytes = s.as_bytes();
                file.write_all(&(bytes.len() as u32).to_le_bytes())?;
                file.write_all(bytes)?;
            }
            None => {
                file.write_all(&[0u8])?;
            }
        }
        Ok(())
    }

    /// Read an optional string written by `write_opt_str`.
    fn read_opt_str(file: &mut File) -> Result<Option<String>> {
        let mut present = [0u8; 1];
        file.read_exact(&mut present)?;
        if present[0] == 0 {
            return Ok(None);
        }

        let mut len_bytes = [0u8; 4];
        file.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        let mut bytes = vec![0u8; len];
        file.read_exact(&mut bytes)?;

        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Find the maximum record ID in the log.
    fn find_max_id(file: &File) -> Result<u64> {
        let mut file = file.try_clone()?;
        file.seek(SeekFrom::Start(0))?;

        let mut max_id = 0u64;
        let file_size = file.metadata()?.len();

        while file.stream_position()? < file_size {
            // Read magic
            let mut magic = [0u8; 4];
            if file.read_exact(&mut magic).is_err() {
                break;
            }
            if &magic != LOG_MAGIC {
                break;
            }

            // Skip version and flags
            file.seek(SeekFrom::Current(2))?;

            // Read ID
            let mut id_bytes = [0u8; 8];
            file.read_exact(&mut id_bytes)?;
            let id = u64::from_le_bytes(id_bytes);
            max_id = max_id.max(id);

            // Skip sent_at(8) + level(4)
            file.seek(SeekFrom::Current(12))?;

            // Skip the three optional strings
            for _ in 0..3 {
                let mut present = [0u8; 1];
                file.read_exact(&mut present)?;
                if present[0] != 0 {
                    let mut len_bytes = [0u8; 4];
                    file.read_exact(&mut len_bytes)?;
                    let len = u32::from_le_bytes(len_bytes) as i64;
                    file.seek(SeekFrom::Current(len))?;
                }
            }

            // Skip checksum
            file.seek(SeekFrom::Current(4))?;
        }

        Ok(max_id)
    }
}

/// Iterator over records in the log, yielding `(offset, record)`.
pub struct RecordIterator<'a> {
    log: &'a RecordLog,
    offset: u64,
    end: u64,
}

impl Iterator for RecordIterator<'_> {
    type Item = Result<(u64, LogRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.end {
            return None;
        }

        let current_offset = self.offset;
        let mut file = self.log.file.write();
        if let Err(e) = file.seek(SeekFrom::Start(current_offset)) {
            self.offset = self.end;
            return Some(Err(e.into()));
        }

        match RecordLog::read_record(&mut *file) {
            Ok(record) => {
                self.offset = file.stream_position().unwrap_or(self.end);
                Some(Ok((current_offset, record)))
            }
            Err(e) => {
                self.offset = self.end; // Stop iteration on error
                Some(Err(e))
            }
        }
    }
}
