//! Error taxonomy for a pipeline run
//!
//! Every stage has its own error type. [`PipelineError`] wraps them so the
//! orchestrator can classify a failure into an [`ErrorKind`] and hand it to
//! the reporter exactly once.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::storage::StorageError;

/// Result type alias for a whole pipeline run
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failures of the external measurement tool
#[derive(Debug, Error)]
pub enum MeasurementError {
    /// The tool could not be started at all
    #[error("failed to launch measurement tool `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("measurement tool did not finish within {}s", .0.as_secs())]
    Timeout(Duration),

    /// Non-zero exit; `code` is `None` when the process was killed by a signal
    #[error("measurement tool failed with exit code {}: {}", display_code(.code), .output)]
    Process { code: Option<i32>, output: String },

    #[error("measurement tool produced no output")]
    EmptyOutput,

    #[error("measurement tool output is not a valid measurement: {0}")]
    Parse(String),
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

/// Failures while turning a raw measurement into a record
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("unrecognised measurement schema: {0}")]
    UnknownSchema(String),

    #[error("required field `{0}` is missing")]
    MissingField(&'static str),

    #[error("field `{field}` has an unexpected type (expected {expected})")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

/// Failures of the chat notification transport
///
/// These never abort a run; they are returned so callers and tests can
/// observe them.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notifications are not configured")]
    NotConfigured,

    #[error("failed to reach chat backend: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("chat backend rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Invalid or missing startup configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{key} has an invalid value `{value}`: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(key: &'static str, value: impl Into<String>, reason: impl ToString) -> Self {
        Self::Invalid {
            key,
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

/// Any failure that ends a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Measurement(#[from] MeasurementError),

    #[error("failed to normalise measurement: {0}")]
    Build(#[from] BuildError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Run manually interrupted.")]
    Interrupted,
}

/// Classification of a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigurationError,
    MeasurementTimeout,
    MeasurementProcessError,
    MeasurementEmptyOutput,
    MeasurementParseError,
    UnitConversionError,
    PersistenceRejected,
    NotificationDeliveryFailure,
    Interrupted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ConfigurationError => "ConfigurationError",
            ErrorKind::MeasurementTimeout => "MeasurementTimeout",
            ErrorKind::MeasurementProcessError => "MeasurementProcessError",
            ErrorKind::MeasurementEmptyOutput => "MeasurementEmptyOutput",
            ErrorKind::MeasurementParseError => "MeasurementParseError",
            ErrorKind::UnitConversionError => "UnitConversionError",
            ErrorKind::PersistenceRejected => "PersistenceRejected",
            ErrorKind::NotificationDeliveryFailure => "NotificationDeliveryFailure",
            ErrorKind::Interrupted => "Interrupted",
        };
        f.write_str(name)
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Config(_) => ErrorKind::ConfigurationError,
            PipelineError::Measurement(e) => match e {
                MeasurementError::Timeout(_) => ErrorKind::MeasurementTimeout,
                MeasurementError::Spawn { .. } | MeasurementError::Process { .. } => {
                    ErrorKind::MeasurementProcessError
                }
                MeasurementError::EmptyOutput => ErrorKind::MeasurementEmptyOutput,
                MeasurementError::Parse(_) => ErrorKind::MeasurementParseError,
            },
            PipelineError::Build(_) => ErrorKind::UnitConversionError,
            PipelineError::Storage(_) => ErrorKind::PersistenceRejected,
            PipelineError::Interrupted => ErrorKind::Interrupted,
        }
    }
}

impl NotificationError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::NotificationDeliveryFailure
    }
}
