//! Filtered, paginated range queries over the record index.
//!
//! A query drives from the narrowest ordered index available (the satellite's
//! own timeline when `satelliteId` is given, the global timeline otherwise),
//! walks it newest-first and applies the remaining predicates as it goes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::index::RecordIndex;
use crate::model::TelemetryRecord;
use crate::timeline;

/// Default page size.
pub const DEFAULT_LIMIT: usize = 100;

/// Largest page a single query may return.
pub const MAX_LIMIT: usize = 100;

/// Independently optional predicates, combined with AND.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use]
pub struct TelemetryFilter {
    pub satellite_id: Option<String>,
    pub status: Option<String>,
    /// Inclusive lower bound
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub end_time: Option<DateTime<Utc>>,
}

impl TelemetryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact, case-sensitive satellite match.
    pub fn satellite(mut self, satellite_id: impl Into<String>) -> Self {
        self.satellite_id = Some(satellite_id.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn since(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.end_time = Some(end);
        self
    }

    pub fn matches(&self, record: &TelemetryRecord) -> bool {
        self.satellite_id.as_ref().map_or(true, |s| *s == record.satellite_id)
            && self.status.as_ref().map_or(true, |s| *s == record.status)
            && self.start_time.map_or(true, |t| record.timestamp >= t)
            && self.end_time.map_or(true, |t| record.timestamp <= t)
    }
}

/// A validated pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    limit: usize,
    offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self { limit: DEFAULT_LIMIT, offset: 0 }
    }
}

impl Page {
    /// Out-of-range values are rejected, never clamped.
    pub fn new(limit: i64, offset: i64) -> Result<Self, ValidationError> {
        let mut errors = ValidationError::default();
        if limit <= 0 || limit > MAX_LIMIT as i64 {
            errors.push("limit", format!("must be between 1 and {}", MAX_LIMIT));
        }
        if offset < 0 {
            errors.push("offset", "must be greater than or equal to 0");
        }
        errors.into_result()?;
        Ok(Self { limit: limit as usize, offset: offset as usize })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// One page of matches plus the total match count before pagination.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub data: Vec<TelemetryRecord>,
}

/// Raw list request as it arrives on the query string.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ListParams {
    #[serde(rename = "satelliteId", default, skip_serializing_if = "Option::is_none")]
    pub satellite_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "startTime", alias = "start_time", default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(rename = "endTime", alias = "end_time", default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

impl ListParams {
    /// Validates every parameter, reporting all failures together. Empty
    /// strings count as absent.
    pub fn into_query(self) -> Result<(TelemetryFilter, Page), ValidationError> {
        let mut errors = ValidationError::default();

        let start_time = parse_bound(&mut errors, "startTime", self.start_time);
        let end_time = parse_bound(&mut errors, "endTime", self.end_time);

        let page = Page::new(
            self.limit.unwrap_or(DEFAULT_LIMIT as i64),
            self.offset.unwrap_or(0),
        );
        let page = match page {
            Ok(page) => page,
            Err(e) => {
                errors.errors.extend(e.errors);
                Page::default()
            }
        };
        errors.into_result()?;

        let filter = TelemetryFilter {
            satellite_id: self.satellite_id.filter(|s| !s.is_empty()),
            status: self.status.filter(|s| !s.is_empty()),
            start_time,
            end_time,
        };
        Ok((filter, page))
    }
}

fn parse_bound(errors: &mut ValidationError, field: &'static str, raw: Option<String>) -> Option<DateTime<Utc>> {
    let raw = raw.filter(|s| !s.trim().is_empty())?;
    match timeline::parse_utc(&raw) {
        Ok(ts) => Some(ts),
        Err(msg) => {
            errors.push(field, msg);
            None
        }
    }
}

/// Runs `filter` against `index`, newest first. Ties on timestamp go to the
/// later insertion.
pub fn execute(index: &RecordIndex, filter: &TelemetryFilter, page: Page) -> QueryResult {
    let range = match &filter.satellite_id {
        Some(sat) => index.satellite_range(sat, filter.start_time, filter.end_time),
        None => index.time_range(filter.start_time, filter.end_time),
    };

    let mut total = 0;
    let mut data = Vec::with_capacity(page.limit.min(index.len()));

    for (_, id) in range.into_iter().flatten().rev() {
        let Some(entry) = index.get(id) else { continue };
        if !filter.matches(&entry.record) {
            continue;
        }
        if total >= page.offset && data.len() < page.limit {
            data.push(entry.record.clone());
        }
        total += 1;
    }

    QueryResult { total, limit: page.limit, offset: page.offset, data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 23, hour, 0, 0).unwrap()
    }

    fn populate(rows: &[(&str, u32, &str)]) -> RecordIndex {
        let mut index = RecordIndex::new();
        for (sat, hour, status) in rows {
            let seq = index.allocate_seq();
            index.insert(
                TelemetryRecord {
                    id: Uuid::new_v4(),
                    satellite_id: sat.to_string(),
                    timestamp: at(*hour),
                    altitude: 400.0,
                    velocity: 7.5,
                    status: status.to_string(),
                },
                seq,
            );
        }
        index
    }

    #[test]
    fn page_bounds() {
        assert!(Page::new(1, 0).is_ok());
        assert!(Page::new(100, 0).is_ok());
        assert_eq!(Page::new(0, 0).unwrap_err().fields(), vec!["limit"]);
        assert_eq!(Page::new(101, 0).unwrap_err().fields(), vec!["limit"]);
        assert_eq!(Page::new(10, -1).unwrap_err().fields(), vec!["offset"]);
        assert_eq!(Page::new(-5, -1).unwrap_err().fields(), vec!["limit", "offset"]);
    }

    #[test]
    fn newest_first_with_total() {
        let index = populate(&[("V-1", 10, "healthy"), ("V-1", 12, "healthy"), ("V-2", 11, "healthy")]);
        let result = execute(&index, &TelemetryFilter::new().satellite("V-1"), Page::default());
        assert_eq!(result.total, 2);
        let hours: Vec<_> = result.data.iter().map(|r| r.timestamp).collect();
        assert_eq!(hours, vec![at(12), at(10)]);
    }

    #[test]
    fn predicates_are_anded() {
        let index = populate(&[
            ("V-1", 10, "healthy"),
            ("V-1", 11, "warning"),
            ("V-1", 12, "warning"),
            ("V-2", 11, "warning"),
        ]);
        let filter = TelemetryFilter::new().satellite("V-1").status("warning").since(at(11)).until(at(11));
        let result = execute(&index, &filter, Page::default());
        assert_eq!(result.total, 1);
        assert_eq!(result.data[0].timestamp, at(11));
        assert_eq!(result.data[0].status, "warning");
    }

    #[test]
    fn satellite_match_is_case_sensitive() {
        let index = populate(&[("sat-1", 10, "healthy")]);
        assert_eq!(execute(&index, &TelemetryFilter::new().satellite("SAT-1"), Page::default()).total, 0);
    }

    #[test]
    fn offset_past_end_keeps_total() {
        let index = populate(&[("V-1", 10, "healthy"), ("V-1", 11, "healthy")]);
        let result = execute(&index, &TelemetryFilter::new(), Page::new(10, 5).unwrap());
        assert_eq!(result.total, 2);
        assert!(result.data.is_empty());
        assert_eq!(result.offset, 5);
    }

    #[test]
    fn inverted_range_matches_nothing() {
        let index = populate(&[("V-1", 10, "healthy")]);
        let filter = TelemetryFilter::new().since(at(12)).until(at(8));
        assert_eq!(execute(&index, &filter, Page::default()).total, 0);
    }

    #[test]
    fn equal_timestamps_order_by_later_insert() {
        let index = populate(&[("A", 10, "healthy"), ("B", 10, "healthy"), ("C", 10, "healthy")]);
        let result = execute(&index, &TelemetryFilter::new(), Page::default());
        let sats: Vec<_> = result.data.iter().map(|r| r.satellite_id.as_str()).collect();
        assert_eq!(sats, vec!["C", "B", "A"]);
    }

    #[test]
    fn list_params_defaults_and_errors() {
        let (filter, page) = ListParams::default().into_query().unwrap();
        assert_eq!(filter, TelemetryFilter::default());
        assert_eq!(page, Page::default());

        let params = ListParams {
            satellite_id: Some(String::new()),
            start_time: Some("2026-02-23T12:00:00".into()),
            limit: Some(0),
            offset: Some(-1),
            ..Default::default()
        };
        let err = params.into_query().unwrap_err();
        assert_eq!(err.fields(), vec!["startTime", "limit", "offset"]);
    }

    #[test]
    fn list_params_accept_snake_case_aliases() {
        let params: ListParams =
            serde_json::from_str(r#"{"start_time": "2026-02-23T10:00:00+01:00", "end_time": "2026-02-23T12:00:00Z"}"#).unwrap();
        let (filter, _) = params.into_query().unwrap();
        assert_eq!(filter.start_time, Some(at(9)));
        assert_eq!(filter.end_time, Some(at(12)));
    }
}
