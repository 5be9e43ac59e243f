//! HTTP events API backend
//!
//! Inserts one record per request into an append-only datasource:
//!
//! ```text
//! POST {base_url}/v0/events?name={datasource}
//! Authorization: Bearer {token}
//! ```
//!
//! The backend answers `202 Accepted` with a JSON body such as
//! `{"successful_rows": 1, "quarantined_rows": 0}`.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::{debug, info, instrument, trace};

use super::backend::{Acknowledgement, RecordStore};
use super::error::{StorageError, StorageResult};
use crate::record::NormalizedRecord;

const EVENTS_PATH: &str = "/v0/events";

#[derive(Debug, Clone)]
pub struct EventsApiStore {
    client: Client,
    url: Url,
    token: String,
}

impl EventsApiStore {
    pub fn new(base_url: &str, datasource: &str, token: impl Into<String>) -> StorageResult<Self> {
        let raw = format!("{}{EVENTS_PATH}", base_url.trim_end_matches('/'));
        let mut url = Url::parse(&raw)
            .map_err(|e| StorageError::InvalidConfig(format!("{raw}: {e}")))?;
        url.query_pairs_mut().append_pair("name", datasource);

        Ok(Self {
            client: Client::new(),
            url,
            token: token.into(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl RecordStore for EventsApiStore {
    #[instrument(skip_all, fields(url = %self.url))]
    async fn persist(&self, record: &NormalizedRecord) -> StorageResult<Acknowledgement> {
        trace!("sending record: {record:?}");

        let response = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.token)
            .json(record)
            .send()
            .await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StorageError::ConnectionFailed(format!("reading response body: {e}")))?;
        debug!("events API answered {status}: {body}");

        if !status.is_success() {
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let accepted_rows = parse_acknowledgement(status.as_u16(), &body)?;
        info!("record stored ({accepted_rows} row(s) accepted)");

        Ok(Acknowledgement {
            status: status.as_u16(),
            accepted_rows,
        })
    }

    fn name(&self) -> &'static str {
        "events-api"
    }
}

/// Validate the acknowledgement body of a successful response
///
/// An empty body is never an acknowledgement. A JSON object reporting row
/// counts must report at least one stored row and no quarantined rows. Any
/// other non-empty body counts as a single accepted row.
fn parse_acknowledgement(status: u16, body: &str) -> StorageResult<u64> {
    let rejected = || StorageError::EmptyAcknowledgement {
        status,
        body: body.to_string(),
    };

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(rejected());
    }

    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(trimmed) else {
        return Ok(1);
    };

    let Some(successful) = fields.get("successful_rows") else {
        return Ok(1);
    };

    let quarantined = fields
        .get("quarantined_rows")
        .and_then(Value::as_i64)
        .unwrap_or(0);

    match successful.as_i64() {
        Some(rows) if rows > 0 && quarantined == 0 => Ok(rows as u64),
        _ => Err(rejected()),
    }
}
