//! Storage backends for normalized records
//!
//! ## Backends
//!
//! - **Events API** (default): HTTP insert endpoint authenticated with a
//!   bearer token, one JSON record per request
//! - **In-Memory**: keeps records for the lifetime of the process, used for
//!   dry runs and tests
//!
//! ## Usage
//!
//! ```no_run
//! use speedwatch::storage::{RecordStore, events::EventsApiStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = EventsApiStore::new("https://api.us-east.aws.tinybird.co", "speedtest", "token")?;
//! # let _ = store.name();
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod events;
pub mod memory;

pub use backend::{Acknowledgement, RecordStore};
pub use error::{StorageError, StorageResult};
