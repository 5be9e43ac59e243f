//! Known output shapes of the measurement tool
//!
//! | Schema         | Detected by                          | Bandwidth unit |
//! |----------------|--------------------------------------|----------------|
//! | `Ookla`        | `download` is an object              | bytes/s        |
//! | `SpeedtestCli` | `download` is a number, has `client` | bits/s         |
//! | `Mbps`         | `download` is a number, no `client`  | Mbps           |
//!
//! Detection happens once in [`Schema::detect`]; each variant has exactly
//! one extraction function.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use super::{RawMeasurement, json_type};
use crate::error::BuildError;

/// Unit a schema reports bandwidth in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandwidthUnit {
    BytesPerSecond,
    BitsPerSecond,
    MegabitsPerSecond,
}

impl BandwidthUnit {
    pub fn to_mbps(self, value: f64) -> f64 {
        match self {
            BandwidthUnit::BytesPerSecond => value / 125_000.0,
            BandwidthUnit::BitsPerSecond => value / 1_000_000.0,
            BandwidthUnit::MegabitsPerSecond => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// Ookla CLI (`speedtest --format=json`), bandwidth nested under `download.bandwidth`
    Ookla,
    /// Python `speedtest-cli --json`, flat bits/s with a `client` object
    SpeedtestCli,
    /// Already-normalized flat output in Mbps
    Mbps,
}

/// Values extracted from a raw measurement, speeds already in Mbps
#[derive(Debug, Clone, PartialEq)]
pub struct Readings {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub ping_jitter: Option<f64>,
    pub ping_low: Option<f64>,
    pub ping_high: Option<f64>,
    pub isp: String,
    pub ip: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Schema {
    pub fn detect(raw: &RawMeasurement) -> Option<Schema> {
        match raw.get("/download")? {
            Value::Object(_) => Some(Schema::Ookla),
            Value::Number(_) if matches!(raw.get("/client"), Some(Value::Object(_))) => {
                Some(Schema::SpeedtestCli)
            }
            Value::Number(_) => Some(Schema::Mbps),
            _ => None,
        }
    }

    pub fn bandwidth_unit(self) -> BandwidthUnit {
        match self {
            Schema::Ookla => BandwidthUnit::BytesPerSecond,
            Schema::SpeedtestCli => BandwidthUnit::BitsPerSecond,
            Schema::Mbps => BandwidthUnit::MegabitsPerSecond,
        }
    }

    pub fn extract(self, raw: &RawMeasurement) -> Result<Readings, BuildError> {
        match self {
            Schema::Ookla => extract_ookla(raw),
            Schema::SpeedtestCli => extract_speedtest_cli(raw),
            Schema::Mbps => extract_mbps(raw),
        }
    }
}

fn extract_ookla(raw: &RawMeasurement) -> Result<Readings, BuildError> {
    let unit = Schema::Ookla.bandwidth_unit();
    let download = required_number(raw, "/download/bandwidth", "download.bandwidth")?;
    let upload = required_number(raw, "/upload/bandwidth", "upload.bandwidth")?;

    Ok(Readings {
        download_mbps: unit.to_mbps(download),
        upload_mbps: unit.to_mbps(upload),
        ping_ms: required_number(raw, "/ping/latency", "ping.latency")?,
        ping_jitter: optional_number(raw, "/ping/jitter"),
        ping_low: optional_number(raw, "/ping/low"),
        ping_high: optional_number(raw, "/ping/high"),
        isp: required_string(raw, "/isp", "isp")?,
        ip: required_string(raw, "/interface/externalIp", "interface.externalIp")?,
        timestamp: timestamp(raw),
    })
}

fn extract_speedtest_cli(raw: &RawMeasurement) -> Result<Readings, BuildError> {
    let unit = Schema::SpeedtestCli.bandwidth_unit();
    Ok(Readings {
        download_mbps: unit.to_mbps(required_number(raw, "/download", "download")?),
        upload_mbps: unit.to_mbps(required_number(raw, "/upload", "upload")?),
        ping_ms: required_number(raw, "/ping", "ping")?,
        ping_jitter: None,
        ping_low: None,
        ping_high: None,
        isp: required_string(raw, "/client/isp", "client.isp")?,
        ip: required_string(raw, "/client/ip", "client.ip")?,
        timestamp: timestamp(raw),
    })
}

fn extract_mbps(raw: &RawMeasurement) -> Result<Readings, BuildError> {
    let unit = Schema::Mbps.bandwidth_unit();

    // ping is either a bare latency or an object like the Ookla one
    let (ping_ms, ping_jitter, ping_low, ping_high) = match raw.get("/ping") {
        Some(Value::Object(_)) => (
            required_number(raw, "/ping/latency", "ping.latency")?,
            optional_number(raw, "/ping/jitter"),
            optional_number(raw, "/ping/low"),
            optional_number(raw, "/ping/high"),
        ),
        _ => (
            required_number(raw, "/ping", "ping")?,
            optional_number(raw, "/jitter"),
            None,
            None,
        ),
    };

    Ok(Readings {
        download_mbps: unit.to_mbps(required_number(raw, "/download", "download")?),
        upload_mbps: unit.to_mbps(required_number(raw, "/upload", "upload")?),
        ping_ms,
        ping_jitter,
        ping_low,
        ping_high,
        isp: required_string(raw, "/isp", "isp")?,
        ip: required_string(raw, "/ip", "ip")?,
        timestamp: timestamp(raw),
    })
}

fn required_number(
    raw: &RawMeasurement,
    pointer: &str,
    field: &'static str,
) -> Result<f64, BuildError> {
    match raw.get(pointer) {
        None | Some(Value::Null) => Err(BuildError::MissingField(field)),
        Some(value) => value.as_f64().ok_or(BuildError::InvalidField {
            field,
            expected: "number",
        }),
    }
}

fn optional_number(raw: &RawMeasurement, pointer: &str) -> Option<f64> {
    match raw.get(pointer)? {
        Value::Null => None,
        Value::Number(n) => n.as_f64(),
        other => {
            warn!(
                "ignoring {pointer}: expected number, got {}",
                json_type(other)
            );
            None
        }
    }
}

fn required_string(
    raw: &RawMeasurement,
    pointer: &str,
    field: &'static str,
) -> Result<String, BuildError> {
    match raw.get(pointer) {
        None | Some(Value::Null) => Err(BuildError::MissingField(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(BuildError::InvalidField {
            field,
            expected: "string",
        }),
    }
}

fn timestamp(raw: &RawMeasurement) -> Option<DateTime<Utc>> {
    let value = raw.get("/timestamp")?.as_str()?;
    match DateTime::parse_from_rfc3339(value) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            warn!("ignoring unparseable timestamp `{value}`: {e}");
            None
        }
    }
}
