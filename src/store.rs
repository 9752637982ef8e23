//! Main Store struct tying the log and indexes together.

use crate::error::{Result, StoreError};
use crate::records::{RecordIndex, RecordLog};
use crate::types::{CustomerFilter, LevelFilter, LogRecord, RecordInput, Timestamp};
use fs2::FileExt;
use parking_lot::RwLock;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Base path for the store.
    pub path: PathBuf,

    /// Sync the log to disk every N appends.
    pub sync_interval: u64,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./logstore"),
            sync_interval: 100,
            create_if_missing: true,
        }
    }
}

/// Magic bytes for store manifest.
const STORE_MAGIC: &[u8; 4] = b"LRS\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// The durable, time-ordered log record store.
///
/// Single-writer/many-reader: appends and bulk deletes hold the access lock
/// exclusively, reads hold it shared for the duration of the call. A read
/// therefore observes a consistent snapshot as of call time - a concurrent
/// write may or may not be visible, but never partially.
pub struct Store {
    /// Store configuration.
    config: StoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// Record log.
    log: RecordLog,

    /// Time and customer indexes.
    index: RecordIndex,

    /// Serializes writers against in-flight reads.
    access: RwLock<()>,
}

impl Store {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    /// Create a new store.
    pub fn create(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;

        Self::write_manifest(&config.path)?;

        let lock_file = Self::acquire_lock(&config.path)?;

        let log = RecordLog::open_with_sync_interval(
            config.path.join("records.log"),
            config.sync_interval,
        )?;

        Ok(Self {
            config,
            _lock_file: lock_file,
            log,
            index: RecordIndex::new(),
            access: RwLock::new(()),
        })
    }

    /// Open an existing store.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;

        let lock_file = Self::acquire_lock(&config.path)?;

        let log = RecordLog::open_with_sync_interval(
            config.path.join("records.log"),
            config.sync_interval,
        )?;

        let store = Self {
            config,
            _lock_file: lock_file,
            log,
            index: RecordIndex::new(),
            access: RwLock::new(()),
        };

        store.rebuild_index()?;

        Ok(store)
    }

    /// Rebuild the in-memory indexes by scanning the log.
    fn rebuild_index(&self) -> Result<()> {
        self.index.clear();
        for result in self.log.iter() {
            let (offset, record) = result?;
            self.index.add(&record, offset);
        }
        Ok(())
    }

    // --- Writes ---

    /// Append a record, assigning the next id.
    ///
    /// Fails only on an unrecoverable I/O error.
    pub fn append(&self, input: RecordInput) -> Result<LogRecord> {
        let _guard = self.access.write();

        let (record, offset) = self.log.append(input)?;
        self.index.add(&record, offset);

        Ok(record)
    }

    /// Delete all records with `sent_at < cutoff`.
    ///
    /// Atomic: either fully applies or has no effect. Idempotent. Returns
    /// the number of records removed.
    pub fn delete_before(&self, cutoff: Timestamp) -> Result<u64> {
        let _guard = self.access.write();

        let removed = self.log.retain(|record| record.sent_at >= cutoff)?;
        if removed > 0 {
            self.rebuild_index()?;
            debug!(removed, cutoff = cutoff.0, "deleted records before cutoff");
        }

        Ok(removed)
    }

    /// Delete every record. Atomic. Returns the number removed.
    pub fn delete_all(&self) -> Result<u64> {
        let _guard = self.access.write();

        let removed = self.log.retain(|_| false)?;
        if removed > 0 {
            self.index.clear();
            debug!(removed, "deleted all records");
        }

        Ok(removed)
    }

    // --- Reads ---

    /// All records with `sent_at >= from` passing both filters, in
    /// ascending `(sent_at, id)` order.
    ///
    /// The ordering is part of the contract: streaming sessions rely on it
    /// to deliver without visible reordering.
    pub fn query_range(
        &self,
        from: Timestamp,
        levels: LevelFilter,
        customer: &CustomerFilter,
    ) -> Result<Vec<LogRecord>> {
        let _guard = self.access.read();

        let offsets = self.index.collect_range(from, levels, customer);
        let mut records = Vec::with_capacity(offsets.len());
        for offset in offsets {
            records.push(self.log.read_at(offset)?);
        }

        Ok(records)
    }

    /// Number of records passing the customer filter.
    pub fn count(&self, customer: &CustomerFilter) -> u64 {
        let _guard = self.access.read();
        self.index.count(customer)
    }

    /// All customer ids present, sorted.
    pub fn distinct_customers(&self) -> Vec<String> {
        let _guard = self.access.read();
        self.index.distinct_customers()
    }

    // --- Maintenance ---

    /// Sync pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    /// Get the store path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // --- Private Helpers ---

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::create(manifest_path)?;

        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::open(manifest_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_path = path.join("LOCK");
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Level, RecordDraft, RecordId};
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> StoreConfig {
        StoreConfig {
            path: dir.path().join("store"),
            sync_interval: 1,
            create_if_missing: true,
        }
    }

    fn input(level: Level, sent_at: i64, customer: Option<&str>) -> RecordInput {
        let mut draft = RecordDraft::new(level).with_sent_at(Timestamp(sent_at));
        if let Some(c) = customer {
            draft = draft.with_customer(c);
        }
        RecordInput::from_draft(draft, Timestamp::now())
    }

    #[test]
    fn test_create_store() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();

        assert!(store.path().join("MANIFEST").exists());
        assert!(store.path().join("records.log").exists());
    }

    #[test]
    fn test_append_assigns_increasing_ids() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();

        let first = store.append(input(Level::INFO, 10, None)).unwrap();
        let second = store.append(input(Level::INFO, 5, None)).unwrap();

        assert_eq!(first.id, RecordId(1));
        assert_eq!(second.id, RecordId(2));
    }

    #[test]
    fn test_query_range_order_and_filters() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();

        store.append(input(Level::TRACE, 10, Some("custA"))).unwrap();
        store.append(input(Level::WARNING, 20, Some("custB"))).unwrap();
        store.append(input(Level::ERROR, 30, Some("custA"))).unwrap();

        // The warning-or-error slice across all customers, in insertion order
        let warn_or_err = LevelFilter::from(Level::WARNING) | Level::ERROR;
        let records = store
            .query_range(Timestamp(0), warn_or_err, &CustomerFilter::All)
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, Level::WARNING);
        assert_eq!(records[1].level, Level::ERROR);

        // Exact customer match
        let records = store
            .query_range(Timestamp(0), LevelFilter::ALL, &CustomerFilter::parse("custA"))
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.customer_id.as_deref() == Some("custA")));
    }

    #[test]
    fn test_query_range_from_inclusive() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();

        store.append(input(Level::INFO, 10, None)).unwrap();
        store.append(input(Level::INFO, 20, None)).unwrap();

        let records = store
            .query_range(Timestamp(20), LevelFilter::ALL, &CustomerFilter::All)
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sent_at, Timestamp(20));
    }

    #[test]
    fn test_out_of_order_timestamps_sort_in_query() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();

        store.append(input(Level::INFO, 30, None)).unwrap();
        store.append(input(Level::INFO, 10, None)).unwrap();
        store.append(input(Level::INFO, 20, None)).unwrap();

        let records = store
            .query_range(Timestamp(0), LevelFilter::ALL, &CustomerFilter::All)
            .unwrap();
        let times: Vec<i64> = records.iter().map(|r| r.sent_at.0).collect();
        assert_eq!(times, vec![10, 20, 30]);
    }

    #[test]
    fn test_count_and_distinct_customers() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();

        store.append(input(Level::INFO, 10, Some("b"))).unwrap();
        store.append(input(Level::INFO, 20, Some("a"))).unwrap();
        store.append(input(Level::INFO, 30, Some("a"))).unwrap();
        store.append(input(Level::INFO, 40, None)).unwrap();

        assert_eq!(store.count(&CustomerFilter::All), 4);
        assert_eq!(store.count(&CustomerFilter::parse("a")), 2);
        assert_eq!(store.count(&CustomerFilter::parse("nope")), 0);
        assert_eq!(store.distinct_customers(), vec!["a", "b"]);
    }

    #[test]
    fn test_delete_before_partitions_records() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();

        for t in [10, 20, 30, 40] {
            store.append(input(Level::INFO, t, Some("c"))).unwrap();
        }

        let removed = store.delete_before(Timestamp(30)).unwrap();
        assert_eq!(removed, 2);

        let left = store
            .query_range(Timestamp(0), LevelFilter::ALL, &CustomerFilter::All)
            .unwrap();
        assert_eq!(left.len(), 2);
        assert!(left.iter().all(|r| r.sent_at >= Timestamp(30)));

        // Idempotent
        assert_eq!(store.delete_before(Timestamp(30)).unwrap(), 0);
    }

    #[test]
    fn test_delete_all() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(test_config(&dir)).unwrap();

        store.append(input(Level::INFO, 10, Some("a"))).unwrap();
        store.append(input(Level::ERROR, 20, Some("b"))).unwrap();

        assert_eq!(store.delete_all().unwrap(), 2);
        assert_eq!(store.count(&CustomerFilter::All), 0);
        assert!(store.distinct_customers().is_empty());
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        {
            let store = Store::create(config.clone()).unwrap();
            store.append(input(Level::ERROR, 10, Some("a"))).unwrap();
            store.append(input(Level::INFO, 20, Some("b"))).unwrap();
            store.sync().unwrap();
        }

        {
            let store = Store::open(config).unwrap();
            assert_eq!(store.count(&CustomerFilter::All), 2);
            assert_eq!(store.distinct_customers(), vec!["a", "b"]);

            // Ids continue after the recovered counter
            let record = store.append(input(Level::INFO, 30, None)).unwrap();
            assert_eq!(record.id, RecordId(3));
        }
    }

    #[test]
    fn test_store_lock() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        let _store1 = Store::create(config.clone()).unwrap();

        // Second store should fail to acquire lock
        let result = Store::open(config);
        assert!(matches!(result, Err(StoreError::Locked)));
    }
}
