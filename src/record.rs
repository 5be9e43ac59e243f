//! Normalized records
//!
//! A [`NormalizedRecord`] is the unit-consistent, schema-stable shape that
//! gets stored: speeds in Mbps, latencies in milliseconds, every number
//! rounded to two decimals, optional values serialized as `null`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, instrument, warn};

use crate::dns::DnsResults;
use crate::error::BuildError;
use crate::measurement::RawMeasurement;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub timestamp: DateTime<Utc>,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub ping_jitter: Option<f64>,
    pub ping_low: Option<f64>,
    pub ping_high: Option<f64>,
    /// Serialized as one `dns_<label>_ms` field per probe
    #[serde(flatten)]
    pub dns: DnsLatencies,
    pub isp: String,
    pub ip: String,
}

impl NormalizedRecord {
    /// Resolution latency for a probe label, `None` if unavailable or not probed
    pub fn dns_ms(&self, label: &str) -> Option<f64> {
        self.dns.get(label)
    }
}

/// Field name of a DNS probe result
pub fn dns_field(label: &str) -> String {
    format!("dns_{label}_ms")
}

/// Probe latencies in milliseconds keyed by probe label
///
/// Labels never appear in the serialized record on their own, every entry is
/// written as `dns_<label>_ms` and only those fields are read back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DnsLatencies(BTreeMap<String, Option<f64>>);

impl DnsLatencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, millis: Option<f64>) {
        self.0.insert(label.into(), millis);
    }

    /// Latency for `label`, `None` if unavailable or not probed
    pub fn get(&self, label: &str) -> Option<f64> {
        self.0.get(label).copied().flatten()
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.0.contains_key(label)
    }
}

impl<L: Into<String>> FromIterator<(L, Option<f64>)> for DnsLatencies {
    fn from_iter<I: IntoIterator<Item = (L, Option<f64>)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(label, millis)| (label.into(), millis))
                .collect(),
        )
    }
}

impl Serialize for DnsLatencies {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, millis) in &self.0 {
            map.serialize_entry(&dns_field(label), millis)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DnsLatencies {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DnsFieldVisitor;

        impl<'de> Visitor<'de> for DnsFieldVisitor {
            type Value = DnsLatencies;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of `dns_<label>_ms` fields")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut latencies = DnsLatencies::new();
                while let Some(key) = access.next_key::<String>()? {
                    if let Some(label) = dns_label(&key) {
                        latencies.insert(label, access.next_value()?);
                    } else {
                        access.next_value::<IgnoredAny>()?;
                    }
                }
                Ok(latencies)
            }
        }

        deserializer.deserialize_map(DnsFieldVisitor)
    }
}

fn dns_label(field: &str) -> Option<&str> {
    field
        .strip_prefix("dns_")?
        .strip_suffix("_ms")
        .filter(|label| !label.is_empty())
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct RecordBuilder;

impl RecordBuilder {
    /// Normalize a raw measurement together with this run's DNS probes
    #[instrument(skip_all)]
    pub fn build(raw: &RawMeasurement, dns: &DnsResults) -> Result<NormalizedRecord, BuildError> {
        let schema = raw.schema().ok_or_else(|| {
            BuildError::UnknownSchema(match raw.get("/download") {
                None => "no `download` field".to_string(),
                Some(_) => "`download` is neither an object nor a number".to_string(),
            })
        })?;
        debug!("detected {schema:?} schema");

        let readings = schema.extract(raw)?;

        let timestamp = readings.timestamp.unwrap_or_else(|| {
            warn!("measurement carries no usable timestamp, using current time");
            Utc::now()
        });

        let dns = dns
            .iter()
            .map(|(label, outcome)| (label.as_str(), outcome.as_millis_f64().map(round2)))
            .collect();

        Ok(NormalizedRecord {
            timestamp,
            download_mbps: round2(readings.download_mbps),
            upload_mbps: round2(readings.upload_mbps),
            ping_ms: round2(readings.ping_ms),
            ping_jitter: readings.ping_jitter.map(round2),
            ping_low: readings.ping_low.map(round2),
            ping_high: readings.ping_high.map(round2),
            dns,
            isp: readings.isp,
            ip: readings.ip,
        })
    }
}
