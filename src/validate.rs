use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::model::TelemetrySample;
use crate::timeline;

/// A sample that passed every check, timestamp already on the UTC timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidSample {
    pub satellite_id: String,
    pub timestamp: DateTime<Utc>,
    pub altitude: f64,
    pub velocity: f64,
    pub status: String,
}

/// Checks every field of `sample` and reports all failures at once.
pub fn validate_sample(sample: &TelemetrySample) -> Result<ValidSample, ValidationError> {
    let mut errors = ValidationError::default();

    if sample.satellite_id.is_empty() {
        errors.push("satelliteId", "must not be empty");
    }

    let timestamp = match timeline::parse_utc(&sample.timestamp) {
        Ok(ts) => Some(ts),
        Err(msg) => {
            errors.push("timestamp", msg);
            None
        }
    };

    check_positive(&mut errors, "altitude", sample.altitude);
    check_positive(&mut errors, "velocity", sample.velocity);

    if sample.status.is_empty() {
        errors.push("status", "must not be empty");
    }

    match (errors.into_result(), timestamp) {
        (Ok(()), Some(timestamp)) => Ok(ValidSample {
            satellite_id: sample.satellite_id.clone(),
            timestamp,
            altitude: sample.altitude,
            velocity: sample.velocity,
            status: sample.status.clone(),
        }),
        (Err(errors), _) => Err(errors),
        (Ok(()), None) => Err(ValidationError::field("timestamp", "is missing")),
    }
}

// NaN fails `> 0.0`, so only infinities need the extra check
fn check_positive(errors: &mut ValidationError, field: &'static str, value: f64) {
    if !(value > 0.0) {
        errors.push(field, "must be greater than 0");
    } else if !value.is_finite() {
        errors.push(field, "must be finite");
    }
}

/// Parses a record id supplied as text.
pub fn parse_id(raw: &str) -> Result<Uuid, ValidationError> {
    Uuid::parse_str(raw.trim()).map_err(|e| ValidationError::field("id", format!("is not a valid UUID: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TelemetrySample {
        TelemetrySample {
            satellite_id: "SAT-1".into(),
            timestamp: "2026-02-23T12:00:00Z".into(),
            altitude: 400.5,
            velocity: 7.6,
            status: "healthy".into(),
        }
    }

    #[test]
    fn accepts_valid_sample() {
        let valid = validate_sample(&sample()).unwrap();
        assert_eq!(valid.satellite_id, "SAT-1");
        assert_eq!(valid.timestamp.to_rfc3339(), "2026-02-23T12:00:00+00:00");
    }

    #[test]
    fn zero_and_negative_are_rejected() {
        for bad in [0.0, -0.0, -50.0, f64::NAN, f64::NEG_INFINITY] {
            let mut s = sample();
            s.altitude = bad;
            assert_eq!(validate_sample(&s).unwrap_err().fields(), vec!["altitude"]);

            let mut s = sample();
            s.velocity = bad;
            assert_eq!(validate_sample(&s).unwrap_err().fields(), vec!["velocity"]);
        }
    }

    #[test]
    fn infinity_is_rejected() {
        let mut s = sample();
        s.altitude = f64::INFINITY;
        let err = validate_sample(&s).unwrap_err();
        assert_eq!(err.errors[0].message, "must be finite");
    }

    #[test]
    fn reports_every_offending_field() {
        let s = TelemetrySample {
            satellite_id: String::new(),
            timestamp: "2026-02-23T12:00:00".into(),
            altitude: -1.0,
            velocity: 0.0,
            status: String::new(),
        };
        let err = validate_sample(&s).unwrap_err();
        assert_eq!(err.fields(), vec!["satelliteId", "timestamp", "altitude", "velocity", "status"]);
    }

    #[test]
    fn whitespace_strings_are_values() {
        let mut s = sample();
        s.satellite_id = " ".into();
        s.status = "\t".into();
        let valid = validate_sample(&s).unwrap();
        assert_eq!(valid.satellite_id, " ");
        assert_eq!(valid.status, "\t");
    }

    #[test]
    fn offset_is_normalized() {
        let mut s = sample();
        s.timestamp = "2026-02-23T17:30:00+05:30".into();
        assert_eq!(validate_sample(&s).unwrap().timestamp, validate_sample(&sample()).unwrap().timestamp);
    }

    #[test]
    fn parse_id_rejects_garbage() {
        assert!(parse_id("not-a-uuid").is_err());
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
    }
}
