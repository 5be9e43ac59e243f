//! Storage backend trait definition
//!
//! This module defines the `RecordStore` trait that every persistence
//! backend implements.

use async_trait::async_trait;

use super::error::StorageResult;
use crate::record::NormalizedRecord;

/// Confirmation that the backend accepted a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    /// HTTP status (or a synthetic 200 for in-process backends)
    pub status: u16,

    /// Number of rows the backend reports as stored
    pub accepted_rows: u64,
}

/// Trait for durable record storage
///
/// A run calls `persist` exactly once. Implementations must not buffer,
/// retry or queue records: a failed attempt is returned to the caller and
/// the record is dropped.
///
/// ## Error Handling
///
/// An error status, a transport failure and an empty or negative
/// acknowledgement all map to a `StorageError`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a single normalized record
    async fn persist(&self, record: &NormalizedRecord) -> StorageResult<Acknowledgement>;

    /// Short backend name for logging
    fn name(&self) -> &'static str;
}
