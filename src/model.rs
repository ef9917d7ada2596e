use chrono::{DateTime, Utc};
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Candidate sample as submitted by a ground station. Nothing here is trusted
/// until it has passed `validate::validate_sample`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    pub satellite_id: String,
    /// RFC 3339 with an explicit offset, e.g. `2026-02-23T12:00:00+02:00`
    pub timestamp: String,
    pub altitude: f64,
    pub velocity: f64,
    pub status: String,
}

/// A stored telemetry record. `timestamp` is always on the UTC timeline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub id: Uuid,
    pub satellite_id: String,
    pub timestamp: DateTime<Utc>,
    /// Kilometres
    pub altitude: f64,
    /// Kilometres per second
    pub velocity: f64,
    pub status: String,
}

/// On-disk form of a record.
#[derive(Archive, RkyvDeserialize, RkyvSerialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct StoredRecord {
    pub key: u128,

    /// Insertion sequence, breaks ties between equal timestamps
    pub seq: u64,

    pub satellite_id: String,
    pub ts_secs: i64,
    pub ts_nanos: u32,
    pub altitude: f64,
    pub velocity: f64,
    pub status: String,
}

impl StoredRecord {
    pub fn new(record: &TelemetryRecord, seq: u64) -> Self {
        Self {
            key: record.id.as_u128(),
            seq,
            satellite_id: record.satellite_id.clone(),
            ts_secs: record.timestamp.timestamp(),
            ts_nanos: record.timestamp.timestamp_subsec_nanos(),
            altitude: record.altitude,
            velocity: record.velocity,
            status: record.status.clone(),
        }
    }

    /// `None` when the stored seconds/nanos do not form a valid instant.
    pub fn to_record(&self) -> Option<TelemetryRecord> {
        let timestamp = DateTime::<Utc>::from_timestamp(self.ts_secs, self.ts_nanos)?;
        Some(TelemetryRecord {
            id: Uuid::from_u128(self.key),
            satellite_id: self.satellite_id.clone(),
            timestamp,
            altitude: self.altitude,
            velocity: self.velocity,
            status: self.status.clone(),
        })
    }
}

/// One entry of the append-only data file.
#[derive(Archive, RkyvDeserialize, RkyvSerialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub enum LogEntry {
    Put(StoredRecord),
    Delete { key: u128 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stored_record_keeps_sub_second_precision() {
        let record = TelemetryRecord {
            id: Uuid::new_v4(),
            satellite_id: "SAT-1".into(),
            timestamp: Utc.timestamp_opt(1_771_848_000, 123_456_789).unwrap(),
            altitude: 400.5,
            velocity: 7.6,
            status: "healthy".into(),
        };
        let stored = StoredRecord::new(&record, 7);
        assert_eq!(stored.seq, 7);
        assert_eq!(stored.to_record(), Some(record));
    }

    #[test]
    fn record_serializes_camel_case() {
        let record = TelemetryRecord {
            id: Uuid::nil(),
            satellite_id: "SAT-1".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 2, 23, 12, 0, 0).unwrap(),
            altitude: 400.5,
            velocity: 7.6,
            status: "healthy".into(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["satelliteId"], "SAT-1");
        assert_eq!(json["timestamp"], "2026-02-23T12:00:00Z");
        assert_eq!(json["id"], "00000000-0000-0000-0000-000000000000");
    }
}
