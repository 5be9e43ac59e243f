//! Unattended network performance monitoring
//!
//! One run measures bandwidth and latency with an external speed test tool,
//! probes DNS resolution latency, normalizes everything into a
//! [`record::NormalizedRecord`], persists it and alerts when the download
//! speed falls below a configured threshold.

pub mod config;
pub mod dns;
pub mod error;
pub mod measurement;
pub mod notify;
pub mod pipeline;
pub mod record;
pub mod reporter;
pub mod storage;
pub mod threshold;

pub use error::{ErrorKind, PipelineError};
pub use pipeline::{Orchestrator, RunOutcome, Stage};
pub use record::NormalizedRecord;
