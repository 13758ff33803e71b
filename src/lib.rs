//! Database log archival synchronizer.
//!
//! Mirrors rotating database engine log files into durable object storage,
//! re-transferring a file only when its content has changed. Each file is
//! reassembled from a paginated source API and committed as a single
//! encrypted object.

pub mod archive;

pub use archive::{
    decide, object_key, ArchiveConfig, ConfigError, EncryptionPolicy, FileOutcome, FileReport,
    InMemoryLogSource, InMemoryLogStore, LocalFsLogStore, LogArchiver, LogPage, LogSource,
    PageFaultKind, RemoteObject, RunError, RunReport, SourceError, SourceLogFile, StoreError,
    StoreFaultKind, SyncReason, TimestampUnit, TransferDecision,
};
#[cfg(feature = "rds")]
pub use archive::RdsLogSource;
#[cfg(feature = "s3")]
pub use archive::S3LogStore;
