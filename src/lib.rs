pub mod error;
pub mod model;
pub mod timeline;
pub mod validate;
pub mod storage;
pub mod index;
pub mod query;
pub mod server;
pub mod parser;
pub mod manager;

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};
use uuid::Uuid;

pub use crate::error::{FieldError, Result, StoreError, TelemetryError, ValidationError};
pub use crate::model::{TelemetryRecord, TelemetrySample};
pub use crate::query::{Page, QueryResult, TelemetryFilter};

use crate::index::RecordIndex;
use crate::model::{LogEntry, StoredRecord};
use crate::storage::Segment;

/// The telemetry record store.
///
/// Index state sits behind one `RwLock`: writers hold it across the durable
/// append so a record is never visible half-written, and a delete that has
/// returned is seen by every later read. Readers share the lock.
pub struct TelemetryStore {
    segment: Option<Mutex<Segment>>,
    index: RwLock<RecordIndex>,
}

impl fmt::Debug for TelemetryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryStore")
        .field("durable", &self.segment.is_some())
        .field("records", &self.index.read().map(|idx| idx.len()).unwrap_or(0))
        .finish()
    }
}

impl TelemetryStore {
    /// Opens the data file at `path`, creating it if missing, and rebuilds
    /// the indexes from it. Deleted entries found during replay are compacted
    /// away before the store is handed out.
    pub fn open(path: &Path, strict_durability: bool) -> Result<Self> {
        let mut segment = Segment::open(path, strict_durability)?;
        let entries = segment.replay()?;

        let mut index = RecordIndex::new();
        let mut dead = 0usize;
        for (offset, entry) in entries {
            match entry {
                LogEntry::Put(stored) => {
                    let record = stored.to_record().ok_or_else(|| StoreError::Corrupt {
                        offset,
                        reason: format!("record {} has an invalid timestamp", Uuid::from_u128(stored.key)),
                    })?;
                    index.insert(record, stored.seq);
                }
                LogEntry::Delete { key } => {
                    index.remove(&Uuid::from_u128(key));
                    // The put and the delete both become garbage
                    dead += 2;
                }
            }
        }

        info!(records = index.len(), path = %path.display(), "telemetry store opened");

        let store = Self {
            segment: Some(Mutex::new(segment)),
            index: RwLock::new(index),
        };
        if dead > 0 {
            store.compact()?;
        }
        Ok(store)
    }

    /// A store without a data file. Contents are lost when it is dropped.
    pub fn in_memory() -> Self {
        Self {
            segment: None,
            index: RwLock::new(RecordIndex::new()),
        }
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read_index()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Validates `sample`, normalizes its timestamp, assigns a fresh id and
    /// persists it. Nothing is written when validation fails.
    pub fn create(&self, sample: &TelemetrySample) -> Result<TelemetryRecord> {
        let valid = validate::validate_sample(sample)?;

        let mut index = self.write_index()?;
        let id = Self::next_id(&index);
        let record = TelemetryRecord {
            id,
            satellite_id: valid.satellite_id,
            timestamp: valid.timestamp,
            altitude: valid.altitude,
            velocity: valid.velocity,
            status: valid.status,
        };

        let seq = index.allocate_seq();
        self.append(&LogEntry::Put(StoredRecord::new(&record, seq)))?;
        index.insert(record.clone(), seq);

        debug!(%id, satellite = %record.satellite_id, "telemetry created");
        Ok(record)
    }

    /// Identity generation. Random v4 ids, redrawn in the (practically
    /// impossible) event of a clash with a live record.
    fn next_id(index: &RecordIndex) -> Uuid {
        loop {
            let id = Uuid::new_v4();
            if !index.contains(&id) {
                return id;
            }
        }
    }

    pub fn get(&self, id: Uuid) -> Result<TelemetryRecord> {
        let index = self.read_index()?;
        index
        .get(&id)
        .map(|entry| entry.record.clone())
        .ok_or(TelemetryError::NotFound { id })
    }

    /// Permanently removes a record.
    pub fn delete(&self, id: Uuid) -> Result<()> {
        let mut index = self.write_index()?;
        if !index.contains(&id) {
            return Err(TelemetryError::NotFound { id });
        }

        self.append(&LogEntry::Delete { key: id.as_u128() })?;
        index.remove(&id);

        debug!(%id, "telemetry deleted");
        Ok(())
    }

    pub fn query(&self, filter: &TelemetryFilter, page: Page) -> Result<QueryResult> {
        let index = self.read_index()?;
        Ok(query::execute(&index, filter, page))
    }

    /// Rewrites the data file so it holds only live records. A no-op for
    /// in-memory stores.
    pub fn compact(&self) -> Result<()> {
        let Some(segment) = &self.segment else { return Ok(()) };

        // Writers are held off for the whole rewrite
        let index = self.read_index()?;
        let mut segment = segment.lock().map_err(|_| StoreError::PoisonedLock("segment"))?;

        let before = segment.len();
        let live: Vec<LogEntry> = index.stored_records().map(LogEntry::Put).collect();
        segment.rewrite(&live)?;

        info!(live = live.len(), bytes_before = before, bytes_after = segment.len(), "data file compacted");
        Ok(())
    }

    fn append(&self, entry: &LogEntry) -> Result<()> {
        if let Some(segment) = &self.segment {
            let mut segment = segment.lock().map_err(|_| StoreError::PoisonedLock("segment"))?;
            segment.append(entry)?;
        }
        Ok(())
    }

    fn read_index(&self) -> Result<RwLockReadGuard<'_, RecordIndex>> {
        Ok(self.index.read().map_err(|_| StoreError::PoisonedLock("index"))?)
    }

    fn write_index(&self) -> Result<RwLockWriteGuard<'_, RecordIndex>> {
        Ok(self.index.write().map_err(|_| StoreError::PoisonedLock("index"))?)
    }
}
