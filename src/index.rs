use std::collections::btree_map::{self, BTreeMap};
use std::collections::HashMap;
use std::ops::Bound;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{StoredRecord, TelemetryRecord};

/// Sort key on the timeline. `seq` is the insertion sequence and makes keys
/// unique even when timestamps collide.
pub type TimeKey = (DateTime<Utc>, u64);

#[derive(Debug, Clone)]
pub struct IndexedRecord {
    pub record: TelemetryRecord,
    pub seq: u64,
}

impl IndexedRecord {
    fn key(&self) -> TimeKey {
        (self.record.timestamp, self.seq)
    }
}

/// Live records plus the ordered indexes the query engine drives from.
#[derive(Debug, Default)]
pub struct RecordIndex {
    records: HashMap<Uuid, IndexedRecord>,
    by_time: BTreeMap<TimeKey, Uuid>,
    by_satellite: HashMap<String, BTreeMap<TimeKey, Uuid>>,
    next_seq: u64,
}

impl RecordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &Uuid) -> Option<&IndexedRecord> {
        self.records.get(id)
    }

    /// Hands out the next insertion sequence number.
    pub fn allocate_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn insert(&mut self, record: TelemetryRecord, seq: u64) {
        // Replayed logs may carry sequences we have not handed out yet
        self.next_seq = self.next_seq.max(seq + 1);

        let entry = IndexedRecord { record, seq };
        let key = entry.key();
        let id = entry.record.id;
        let satellite_id = entry.record.satellite_id.clone();

        if let Some(old) = self.records.insert(id, entry) {
            self.unlink(&old);
        }
        self.by_time.insert(key, id);
        self.by_satellite.entry(satellite_id).or_default().insert(key, id);
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<IndexedRecord> {
        let entry = self.records.remove(id)?;
        self.unlink(&entry);
        Some(entry)
    }

    fn unlink(&mut self, entry: &IndexedRecord) {
        let key = entry.key();
        self.by_time.remove(&key);
        if let Some(keys) = self.by_satellite.get_mut(&entry.record.satellite_id) {
            keys.remove(&key);
            if keys.is_empty() {
                self.by_satellite.remove(&entry.record.satellite_id);
            }
        }
    }

    /// Every live record in ascending time order, in on-disk form.
    pub fn stored_records(&self) -> impl Iterator<Item = StoredRecord> + '_ {
        self.by_time.values().filter_map(|id| self.records.get(id)).map(|e| StoredRecord::new(&e.record, e.seq))
    }

    /// Keys within `[start, end]` across all satellites. `None` when the
    /// range is empty by construction (start after end).
    pub fn time_range(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Option<btree_map::Range<'_, TimeKey, Uuid>> {
        range_of(&self.by_time, start, end)
    }

    /// Keys within `[start, end]` for one satellite.
    pub fn satellite_range(
        &self,
        satellite_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Option<btree_map::Range<'_, TimeKey, Uuid>> {
        range_of(self.by_satellite.get(satellite_id)?, start, end)
    }
}

fn range_of(
    map: &BTreeMap<TimeKey, Uuid>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Option<btree_map::Range<'_, TimeKey, Uuid>> {
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return None;
        }
    }
    let lower = start.map_or(Bound::Unbounded, |s| Bound::Included((s, 0)));
    let upper = end.map_or(Bound::Unbounded, |e| Bound::Included((e, u64::MAX)));
    Some(map.range((lower, upper)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(sat: &str, hour: u32) -> TelemetryRecord {
        TelemetryRecord {
            id: Uuid::new_v4(),
            satellite_id: sat.into(),
            timestamp: Utc.with_ymd_and_hms(2026, 2, 23, hour, 0, 0).unwrap(),
            altitude: 400.0,
            velocity: 7.5,
            status: "healthy".into(),
        }
    }

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 23, h, 0, 0).unwrap()
    }

    #[test]
    fn ranges_are_inclusive() {
        let mut index = RecordIndex::new();
        for h in [10, 11, 12, 13] {
            let seq = index.allocate_seq();
            index.insert(record("SAT-1", h), seq);
        }
        let hits = index.time_range(Some(hour(11)), Some(hour(12))).unwrap().count();
        assert_eq!(hits, 2);
        assert_eq!(index.time_range(None, None).unwrap().count(), 4);
        assert!(index.time_range(Some(hour(13)), Some(hour(10))).is_none());
    }

    #[test]
    fn remove_unlinks_from_all_indexes() {
        let mut index = RecordIndex::new();
        let r = record("SAT-1", 10);
        let id = r.id;
        index.insert(r, 0);
        assert!(index.contains(&id));

        assert!(index.remove(&id).is_some());
        assert!(index.remove(&id).is_none());
        assert!(index.is_empty());
        assert_eq!(index.time_range(None, None).unwrap().count(), 0);
        assert!(index.satellite_range("SAT-1", None, None).is_none());
    }

    #[test]
    fn replayed_sequences_advance_the_counter() {
        let mut index = RecordIndex::new();
        index.insert(record("SAT-1", 10), 41);
        assert_eq!(index.allocate_seq(), 42);
    }

    #[test]
    fn equal_timestamps_are_kept_apart_by_seq() {
        let mut index = RecordIndex::new();
        index.insert(record("SAT-1", 10), 0);
        index.insert(record("SAT-2", 10), 1);
        assert_eq!(index.len(), 2);
        assert_eq!(index.time_range(Some(hour(10)), Some(hour(10))).unwrap().count(), 2);
        assert_eq!(index.satellite_range("SAT-2", None, None).unwrap().count(), 1);
    }
}
