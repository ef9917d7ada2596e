use std::io;
use serde::Serialize;
use uuid::Uuid;

/// One rejected input field and the reason it was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Input rejected before any side effect. Carries every offending field.
#[derive(Debug, Clone, PartialEq, Eq, Default, thiserror::Error)]
#[error("validation failed: {}", render(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn field(field: &'static str, message: impl Into<String>) -> Self {
        let mut err = Self::default();
        err.push(field, message);
        err
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError { field, message: message.into() });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Names of the rejected fields, in the order they were checked.
    pub fn fields(&self) -> Vec<&'static str> {
        self.errors.iter().map(|e| e.field).collect()
    }

    /// `Ok(())` when nothing was rejected, otherwise the collected errors.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

fn render(errors: &[FieldError]) -> String {
    errors
    .iter()
    .map(|e| format!("{} {}", e.field, e.message))
    .collect::<Vec<_>>()
    .join("; ")
}

/// Failures of the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode log entry: {0}")]
    Encode(String),

    #[error("corrupt log entry at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("poisoned lock: {0}")]
    PoisonedLock(&'static str),
}

/// Error returned by every `TelemetryStore` operation.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("telemetry {id} not found")]
    NotFound { id: Uuid },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<io::Error> for TelemetryError {
    fn from(err: io::Error) -> Self {
        Self::Store(StoreError::Io(err))
    }
}

pub type Result<T, E = TelemetryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_every_field() {
        let mut err = ValidationError::field("altitude", "must be greater than 0");
        err.push("velocity", "must be greater than 0");
        assert_eq!(
            err.to_string(),
            "validation failed: altitude must be greater than 0; velocity must be greater than 0"
        );
        assert_eq!(err.fields(), vec!["altitude", "velocity"]);

        let wrapped: TelemetryError = err.into();
        assert!(std::error::Error::source(&wrapped).is_none());
        assert!(wrapped.to_string().starts_with("validation failed: altitude"));
    }

    #[test]
    fn empty_error_is_ok() {
        assert!(ValidationError::default().into_result().is_ok());
    }
}
