//! Change Detection
//!
//! Pure staleness decision for one source file against the destination
//! index snapshot. The check is size + write time only; content is never
//! read here, and both timestamps arrive already normalized to milliseconds.

use crate::archive::source::SourceLogFile;
use crate::archive::store::RemoteObject;
use serde::{Deserialize, Serialize};

/// Why a transfer is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncReason {
    /// No destination object exists at the derived key.
    Missing,
    /// Source and destination byte sizes differ.
    SizeMismatch,
    /// The source was written strictly after the destination copy.
    SourceNewer,
}

/// Outcome of one staleness decision. Lives for a single decision cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferDecision {
    pub needs_sync: bool,
    /// Set exactly when `needs_sync` is true.
    pub reason: Option<SyncReason>,
}

impl TransferDecision {
    fn transfer(reason: SyncReason) -> Self {
        TransferDecision {
            needs_sync: true,
            reason: Some(reason),
        }
    }

    fn unchanged() -> Self {
        TransferDecision {
            needs_sync: false,
            reason: None,
        }
    }
}

/// Decide whether `source` must be re-transferred.
///
/// The checks run in order: existence, then size, then write time. Equal
/// size and a source timestamp not newer than the destination's counts as
/// unchanged even when bytes silently differ; the point is to avoid reading
/// file content just to decide.
pub fn decide(source: &SourceLogFile, remote: Option<&RemoteObject>) -> TransferDecision {
    let remote = match remote {
        Some(r) => r,
        None => return TransferDecision::transfer(SyncReason::Missing),
    };
    if source.size_bytes != remote.size_bytes {
        return TransferDecision::transfer(SyncReason::SizeMismatch);
    }
    if source.last_written_ms > remote.last_modified_ms {
        return TransferDecision::transfer(SyncReason::SourceNewer);
    }
    TransferDecision::unchanged()
}
