//! In-memory storage backend (no persistence)
//!
//! Records live only as long as the process. This backend is useful for:
//! - Dry runs that should not touch the real datasource
//! - Testing the pipeline without an HTTP backend

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use super::backend::{Acknowledgement, RecordStore};
use super::error::StorageResult;
use crate::record::NormalizedRecord;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<NormalizedRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records persisted so far
    pub fn records(&self) -> Vec<NormalizedRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn persist(&self, record: &NormalizedRecord) -> StorageResult<Acknowledgement> {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        records.push(record.clone());
        debug!("in-memory backend now holds {} record(s)", records.len());

        Ok(Acknowledgement {
            status: 200,
            accepted_rows: 1,
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
