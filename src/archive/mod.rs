//! Log Archival Synchronization
//!
//! Mirrors rotating database log files into durable object storage. A file
//! is re-transferred only when the change detector judges the stored copy
//! stale; content is reassembled from fixed-size pages and committed as one
//! encrypted object.
//!
//! ## Architecture
//!
//! ```text
//! LogSource ──list_log_files──▶ LogArchiver ──decide──▶ detect
//!     │                             │
//!     └────────read_page───▶ assemble payload ──write_object──▶ LogStore
//! ```
//!
//! ## Key Properties
//!
//! - **Stateless runs**: prior sync state is reconstructed from the
//!   destination index each run
//! - **Per-file isolation**: one file's failure never halts the batch
//! - **Whole objects only**: partial pages are never committed
//! - **Encrypted at rest**: every write carries the encryption directive

pub mod config;
pub mod detect;
pub mod source;
pub mod store;
pub mod sync;
#[cfg(feature = "rds")]
pub mod rds_source;
#[cfg(feature = "s3")]
pub mod s3_store;

pub use config::{ArchiveConfig, ConfigError};
pub use detect::{decide, SyncReason, TransferDecision};
pub use source::{
    InMemoryLogSource, LogPage, LogSource, PageFaultKind, SourceError, SourceLogFile,
    TimestampUnit,
};
pub use store::{
    EncryptionPolicy, InMemoryLogStore, LocalFsLogStore, LogStore, RemoteObject, StoreError,
    StoreFaultKind,
};
pub use sync::{object_key, FileOutcome, FileReport, LogArchiver, RunError, RunReport};
#[cfg(feature = "rds")]
pub use rds_source::RdsLogSource;
#[cfg(feature = "s3")]
pub use s3_store::S3LogStore;
