//! Sync Orchestration
//!
//! Drives one archival run: enumerate source files, decide staleness per
//! file, page stale files out of the source, and commit each assembled
//! payload as a single encrypted object.
//!
//! ```text
//! Pending → Deciding → Transferring → { Committed | Failed }
//! ```
//!
//! Failures are isolated per file; only the global preconditions
//! (destination access, source enumeration) abort a run. Steps before the
//! final write are read-only against both adapters, so a file that fails
//! mid-transfer leaves the destination exactly as it was.

use crate::archive::config::ArchiveConfig;
use crate::archive::detect::{decide, SyncReason};
use crate::archive::source::{LogSource, SourceError, SourceLogFile};
use crate::archive::store::{LogStore, StoreError};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Derive the destination key for a source file name.
pub fn object_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Per-file transfer phases.
///
/// Transitions never skip a state. `Committed` and `Failed` are terminal for
/// the file; neither aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilePhase {
    Pending,
    Deciding,
    Transferring,
    Committed,
    Failed,
}

fn advance(name: &str, phase: &mut FilePhase, next: FilePhase) {
    debug!(file = %name, from = ?phase, to = ?next, "transfer phase");
    *phase = next;
}

/// Recorded outcome for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// The assembled payload was written to the destination.
    Committed {
        /// Bytes written (assembled payload length, not the enumeration-time
        /// descriptor size).
        size_bytes: u64,
    },
    /// The destination copy is current; nothing was read or written.
    Skipped,
    /// The file's transfer failed; the destination was not touched.
    Failed { error: String },
}

/// Per-file entry in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    pub name: String,
    pub key: String,
    pub outcome: FileOutcome,
    /// Why a transfer was attempted; `None` for skipped files.
    pub reason: Option<SyncReason>,
}

impl FileReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, FileOutcome::Failed { .. })
    }
}

/// Outcome of one full archival run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub files: Vec<FileReport>,
}

impl RunReport {
    /// True when no file failed. Skips count as success.
    pub fn all_succeeded(&self) -> bool {
        !self.files.iter().any(FileReport::is_failed)
    }

    pub fn committed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Committed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.outcome == FileOutcome::Skipped)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.files.iter().filter(|f| f.is_failed()).count()
    }

    /// One-line human summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "{} files: {} committed, {} skipped, {} failed",
            self.files.len(),
            self.committed(),
            self.skipped(),
            self.failed()
        )
    }
}

/// Error type for run-level failures
///
/// Per-file errors never surface here; they are downgraded to `Failed`
/// entries in the report. Only the global preconditions abort a run.
#[derive(Debug)]
pub enum RunError {
    /// Source enumeration failed; no files are known, nothing to iterate.
    Source(SourceError),
    /// Destination preflight failed.
    Store(StoreError),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Source(e) => write!(f, "source enumeration failed: {}", e),
            RunError::Store(e) => write!(f, "destination preflight failed: {}", e),
        }
    }
}

impl std::error::Error for RunError {}

/// Orchestrates one archival run over a log source and a destination store.
///
/// All "memory" of prior sync state is reconstructed each run from the
/// destination index; the orchestrator owns no persistent state.
pub struct LogArchiver<S, D> {
    source: S,
    store: D,
    config: ArchiveConfig,
}

impl<S: LogSource, D: LogStore> LogArchiver<S, D> {
    pub fn new(source: S, store: D, config: ArchiveConfig) -> Self {
        LogArchiver {
            source,
            store,
            config,
        }
    }

    /// Run one full synchronization pass.
    ///
    /// Files are independent units of work, partitioned by name; with
    /// `max_in_flight > 1` they fan out through a bounded pool, while page
    /// retrieval inside each file stays strictly sequential on its cursor
    /// chain.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        self.store.verify_access().await.map_err(RunError::Store)?;

        let files = self
            .source
            .list_log_files()
            .await
            .map_err(RunError::Source)?;
        info!(
            instance = %self.config.instance_id,
            files = files.len(),
            "starting archival run"
        );

        // One unit of work per file name, even if the source enumerates a
        // name twice.
        let mut seen = BTreeSet::new();
        let mut unique = Vec::with_capacity(files.len());
        for file in files {
            if seen.insert(file.name.clone()) {
                unique.push(file);
            } else {
                warn!(file = %file.name, "source enumerated duplicate name, keeping first");
            }
        }

        let tasks: Vec<_> = unique.into_iter().map(|f| self.sync_file(f)).collect();
        let mut reports: Vec<FileReport> = stream::iter(tasks)
            .buffer_unordered(self.config.max_in_flight.max(1))
            .collect()
            .await;
        reports.sort_by(|a, b| a.name.cmp(&b.name));

        let report = RunReport { files: reports };
        info!(summary = %report.summary(), "archival run finished");
        Ok(report)
    }

    /// Transfer one file end to end, downgrading every error to an outcome.
    async fn sync_file(&self, file: SourceLogFile) -> FileReport {
        let key = object_key(&self.config.prefix, &file.name);
        let mut phase = FilePhase::Pending;

        advance(&file.name, &mut phase, FilePhase::Deciding);
        let remote = match self.store.lookup(&key).await {
            Ok(remote) => remote,
            Err(e) => {
                // Cannot determine staleness; fail toward re-transfer rather
                // than silently skipping a possible archival gap.
                warn!(file = %file.name, error = %e, "destination lookup failed, re-transferring");
                None
            }
        };

        let decision = decide(&file, remote.as_ref());
        if !decision.needs_sync {
            debug!(file = %file.name, "destination copy is current");
            return FileReport {
                name: file.name,
                key,
                outcome: FileOutcome::Skipped,
                reason: None,
            };
        }

        advance(&file.name, &mut phase, FilePhase::Transferring);
        let payload = match self.assemble(&file.name).await {
            Ok(payload) => payload,
            Err(e) => {
                advance(&file.name, &mut phase, FilePhase::Failed);
                warn!(file = %file.name, error = %e, "transfer failed");
                return FileReport {
                    name: file.name,
                    key,
                    outcome: FileOutcome::Failed {
                        error: e.to_string(),
                    },
                    reason: decision.reason,
                };
            }
        };

        match self
            .store
            .write_object(&key, &payload, &self.config.encryption)
            .await
        {
            Ok(()) => {
                advance(&file.name, &mut phase, FilePhase::Committed);
                info!(
                    file = %file.name,
                    key = %key,
                    size = payload.len(),
                    reason = ?decision.reason,
                    "archived"
                );
                FileReport {
                    name: file.name,
                    key,
                    outcome: FileOutcome::Committed {
                        size_bytes: payload.len() as u64,
                    },
                    reason: decision.reason,
                }
            }
            Err(e) => {
                advance(&file.name, &mut phase, FilePhase::Failed);
                warn!(file = %file.name, error = %e, "destination write failed");
                FileReport {
                    name: file.name,
                    key,
                    outcome: FileOutcome::Failed {
                        error: e.to_string(),
                    },
                    reason: decision.reason,
                }
            }
        }
    }

    /// Page the file out of the source and concatenate in cursor-chain
    /// order. Partial content never leaves this function.
    async fn assemble(&self, name: &str) -> Result<Vec<u8>, SourceError> {
        let mut payload = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u64;
        loop {
            let page = self.source.read_page(name, cursor.as_deref()).await?;
            payload.extend_from_slice(&page.data);
            pages += 1;
            if !page.has_more {
                break;
            }
            match page.next_cursor {
                // A cursor that fails to advance would re-read the same page
                // forever.
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    return Err(SourceError::Unavailable(format!(
                        "page cursor for '{}' did not advance past '{}'",
                        name, next
                    )));
                }
                Some(next) => cursor = Some(next),
                None => {
                    return Err(SourceError::Unavailable(format!(
                        "page chain for '{}' reports more data but no cursor",
                        name
                    )));
                }
            }
        }
        debug!(file = %name, pages, bytes = payload.len(), "assembled");
        Ok(payload)
    }
}
