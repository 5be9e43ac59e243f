//! Measurement acquisition
//!
//! The external speed test tool is a black box. This module runs it
//! ([`client`]) and recognises which of the known output shapes it produced
//! ([`schema`]).

pub mod client;
pub mod schema;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::MeasurementError;

pub use client::CommandMeasurementClient;
pub use schema::{BandwidthUnit, Readings, Schema};

/// The as-parsed output of the measurement tool
///
/// Exists only within a single run and is never persisted as-is. Field
/// access goes through [`Schema`], which knows where each value lives.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMeasurement {
    payload: Map<String, Value>,
}

impl RawMeasurement {
    /// Parse the tool's stdout into a raw measurement
    ///
    /// Whitespace-only output is `EmptyOutput`; anything that is not a single
    /// JSON object is a `Parse` error.
    pub fn parse(output: &str) -> Result<Self, MeasurementError> {
        let trimmed = output.trim();
        if trimmed.is_empty() {
            return Err(MeasurementError::EmptyOutput);
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(payload)) => Ok(Self { payload }),
            Ok(other) => Err(MeasurementError::Parse(format!(
                "expected a JSON object, got {}",
                json_type(&other)
            ))),
            Err(e) => Err(MeasurementError::Parse(e.to_string())),
        }
    }

    /// Look up a value by JSON pointer (e.g. `/download/bandwidth`)
    pub fn get(&self, pointer: &str) -> Option<&Value> {
        let mut segments = pointer.trim_start_matches('/').split('/');
        let first = segments.next()?;
        segments.try_fold(self.payload.get(first)?, |value, key| value.get(key))
    }

    pub fn schema(&self) -> Option<Schema> {
        Schema::detect(self)
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Source of raw measurements
///
/// Implementations spawn at most one external process per call and never
/// retry.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    async fn measure(&self) -> Result<RawMeasurement, MeasurementError>;
}
