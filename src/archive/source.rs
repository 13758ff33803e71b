//! Log Source Adapter
//!
//! Abstraction over the API that exposes a database instance's log files:
//! enumeration with metadata, and per-file content retrieval in fixed-size
//! pages chained by an opaque cursor.
//!
//! The backing log API enforces a maximum page size, so full-file retrieval
//! is a loop over `read_page` until `has_more` goes false. The adapter never
//! holds more than one page; whole-file assembly belongs to the orchestrator.
//!
//! Implementations:
//! - `InMemoryLogSource`: scripted fake for unit tests
//! - `RdsLogSource`: production binding (feature `rds`)

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Unit of the raw write timestamps a source binding reports.
///
/// Some bindings report seconds since epoch, others milliseconds. Adapters
/// normalize to milliseconds before a descriptor leaves the boundary, so the
/// change detector never sees mixed units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampUnit {
    Seconds,
    Milliseconds,
}

impl TimestampUnit {
    /// Convert a raw source timestamp to milliseconds since epoch.
    pub fn to_millis(self, raw: u64) -> u64 {
        match self {
            TimestampUnit::Seconds => raw.saturating_mul(1000),
            TimestampUnit::Milliseconds => raw,
        }
    }
}

/// Descriptor for one source log file.
///
/// Produced fresh on every enumeration call; never persisted. `name` is
/// unique within the instance and doubles as the file's identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLogFile {
    /// File name as reported by the source, e.g. `error/mysql-error.log`.
    pub name: String,
    /// Size in bytes as reported at enumeration time.
    pub size_bytes: u64,
    /// Last write time, milliseconds since epoch (already normalized).
    pub last_written_ms: u64,
}

/// One page of file content.
#[derive(Debug, Clone)]
pub struct LogPage {
    /// The page's bytes.
    pub data: Bytes,
    /// Cursor for the next page; undefined once `has_more` is false.
    pub next_cursor: Option<String>,
    /// False on the terminal page.
    pub has_more: bool,
}

/// Error type for source operations
#[derive(Debug)]
pub enum SourceError {
    /// Enumeration or page read failed (network, auth, throttling).
    Unavailable(String),
    /// The file disappeared, e.g. rotated away mid-transfer.
    NotFound(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Unavailable(msg) => write!(f, "log source unavailable: {}", msg),
            SourceError::NotFound(name) => write!(f, "log file not found: {}", name),
        }
    }
}

impl std::error::Error for SourceError {}

/// Log source abstraction trait
///
/// Follows the manually boxed future pattern used by the store trait for
/// object safety without an async-trait dependency.
pub trait LogSource: Send + Sync + 'static {
    /// Enumerate all log files currently visible on the source.
    ///
    /// The sequence is finite and non-lazy; ordering is unspecified and must
    /// not be relied upon.
    fn list_log_files<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SourceLogFile>, SourceError>> + Send + 'a>>;

    /// Read one page of `name`. `cursor = None` starts from the beginning;
    /// pass the previous page's `next_cursor` to continue.
    fn read_page<'a>(
        &'a self,
        name: &'a str,
        cursor: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<LogPage, SourceError>> + Send + 'a>>;
}

// ============================================================================
// InMemoryLogSource - scripted fake for tests
// ============================================================================

/// How a scripted page fault presents to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFaultKind {
    /// Read fails as a transient source outage.
    Unavailable,
    /// Read fails as if the file rotated away.
    NotFound,
}

#[derive(Debug, Clone)]
struct PageFault {
    /// Pages served successfully before the fault fires.
    after_pages: usize,
    kind: PageFaultKind,
}

#[derive(Debug, Clone)]
struct SourceEntry {
    info: SourceLogFile,
    content: Bytes,
    page_size: usize,
    fault: Option<PageFault>,
    /// Serve non-terminal pages without a continuation cursor.
    break_chain: bool,
}

#[derive(Debug, Default)]
struct SourceInner {
    files: BTreeMap<String, SourceEntry>,
    list_failure: Option<String>,
    list_calls: u64,
    page_reads: u64,
}

/// In-memory log source for unit tests.
///
/// Files carry scripted content split into fixed-size pages; cursors are
/// page indices rendered as strings. Faults are scripted per file so tests
/// stay deterministic.
#[derive(Debug, Default)]
pub struct InMemoryLogSource {
    inner: Arc<RwLock<SourceInner>>,
}

impl InMemoryLogSource {
    /// Default page size for `add_file`.
    pub const DEFAULT_PAGE_SIZE: usize = 4096;

    /// Create an empty source.
    pub fn new() -> Self {
        InMemoryLogSource::default()
    }

    /// Add a file whose descriptor size matches its content length.
    pub fn add_file(&self, name: &str, last_written_ms: u64, content: impl Into<Bytes>) {
        let content = content.into();
        let info = SourceLogFile {
            name: name.to_string(),
            size_bytes: content.len() as u64,
            last_written_ms,
        };
        self.insert(info, content, Self::DEFAULT_PAGE_SIZE);
    }

    /// Add a file with an explicit descriptor and page size.
    ///
    /// The descriptor size may disagree with the content length; the source
    /// API reports both independently and so does this fake.
    pub fn insert(&self, info: SourceLogFile, content: impl Into<Bytes>, page_size: usize) {
        let name = info.name.clone();
        let entry = SourceEntry {
            info,
            content: content.into(),
            page_size: page_size.max(1),
            fault: None,
            break_chain: false,
        };
        self.inner.write().files.insert(name, entry);
    }

    /// Remove a file from the source (subsequent reads see `NotFound`).
    pub fn remove_file(&self, name: &str) {
        self.inner.write().files.remove(name);
    }

    /// Make `list_log_files` fail with the given message.
    pub fn fail_listing(&self, msg: &str) {
        self.inner.write().list_failure = Some(msg.to_string());
    }

    /// Make reads of `name` fail after `after_pages` successful pages.
    pub fn fail_read_after(&self, name: &str, after_pages: usize, kind: PageFaultKind) {
        if let Some(entry) = self.inner.write().files.get_mut(name) {
            entry.fault = Some(PageFault { after_pages, kind });
        }
    }

    /// Serve `name`'s non-terminal pages without a continuation cursor.
    pub fn break_cursor_chain(&self, name: &str) {
        if let Some(entry) = self.inner.write().files.get_mut(name) {
            entry.break_chain = true;
        }
    }

    /// Clear all scripted faults.
    pub fn clear_faults(&self) {
        let mut inner = self.inner.write();
        inner.list_failure = None;
        for entry in inner.files.values_mut() {
            entry.fault = None;
            entry.break_chain = false;
        }
    }

    /// Number of `list_log_files` calls made so far.
    pub fn list_calls(&self) -> u64 {
        self.inner.read().list_calls
    }

    /// Number of `read_page` calls made so far.
    pub fn page_reads(&self) -> u64 {
        self.inner.read().page_reads
    }
}

impl Clone for InMemoryLogSource {
    fn clone(&self) -> Self {
        InMemoryLogSource {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl LogSource for InMemoryLogSource {
    fn list_log_files<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SourceLogFile>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let mut inner = self.inner.write();
            inner.list_calls += 1;
            if let Some(msg) = &inner.list_failure {
                return Err(SourceError::Unavailable(msg.clone()));
            }
            Ok(inner.files.values().map(|e| e.info.clone()).collect())
        })
    }

    fn read_page<'a>(
        &'a self,
        name: &'a str,
        cursor: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<LogPage, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let mut inner = self.inner.write();
            inner.page_reads += 1;

            let entry = match inner.files.get(name) {
                Some(e) => e,
                None => return Err(SourceError::NotFound(name.to_string())),
            };

            let index: usize = match cursor {
                Some(raw) => raw.parse().map_err(|_| {
                    SourceError::Unavailable(format!("malformed cursor '{}'", raw))
                })?,
                None => 0,
            };

            if let Some(fault) = &entry.fault {
                if index >= fault.after_pages {
                    return match fault.kind {
                        PageFaultKind::Unavailable => Err(SourceError::Unavailable(format!(
                            "scripted read failure for '{}'",
                            name
                        ))),
                        PageFaultKind::NotFound => Err(SourceError::NotFound(name.to_string())),
                    };
                }
            }

            let start = index.saturating_mul(entry.page_size);
            if start > entry.content.len() || (start == entry.content.len() && index > 0) {
                return Err(SourceError::Unavailable(format!(
                    "cursor '{}' past end of '{}'",
                    index, name
                )));
            }

            let end = (start + entry.page_size).min(entry.content.len());
            let has_more = end < entry.content.len();
            let next_cursor = if has_more && !entry.break_chain {
                Some((index + 1).to_string())
            } else {
                None
            };

            Ok(LogPage {
                data: entry.content.slice(start..end),
                next_cursor,
                has_more,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_normalization() {
        assert_eq!(TimestampUnit::Seconds.to_millis(1_000), 1_000_000);
        assert_eq!(TimestampUnit::Milliseconds.to_millis(1_000), 1_000);
        // Overflow saturates instead of wrapping.
        assert_eq!(TimestampUnit::Seconds.to_millis(u64::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn lists_added_files() {
        let source = InMemoryLogSource::new();
        source.add_file("error/a.log", 1000, &b"aaaa"[..]);
        source.add_file("error/b.log", 2000, &b"bb"[..]);

        let files = source.list_log_files().await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "error/a.log");
        assert_eq!(files[0].size_bytes, 4);
        assert_eq!(files[1].last_written_ms, 2000);
    }

    #[tokio::test]
    async fn pages_chain_through_cursors() {
        let source = InMemoryLogSource::new();
        let info = SourceLogFile {
            name: "slow.log".to_string(),
            size_bytes: 9,
            last_written_ms: 0,
        };
        source.insert(info, &b"AAAABBBBC"[..], 4);

        let first = source.read_page("slow.log", None).await.unwrap();
        assert_eq!(&first.data[..], b"AAAA");
        assert!(first.has_more);

        let second = source
            .read_page("slow.log", first.next_cursor.as_deref())
            .await
            .unwrap();
        assert_eq!(&second.data[..], b"BBBB");
        assert!(second.has_more);

        let third = source
            .read_page("slow.log", second.next_cursor.as_deref())
            .await
            .unwrap();
        assert_eq!(&third.data[..], b"C");
        assert!(!third.has_more);
    }

    #[tokio::test]
    async fn empty_file_yields_one_terminal_page() {
        let source = InMemoryLogSource::new();
        source.add_file("empty.log", 0, &b""[..]);

        let page = source.read_page("empty.log", None).await.unwrap();
        assert!(page.data.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn unknown_file_is_not_found() {
        let source = InMemoryLogSource::new();
        let err = source.read_page("gone.log", None).await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }

    #[tokio::test]
    async fn scripted_fault_fires_after_pages() {
        let source = InMemoryLogSource::new();
        let info = SourceLogFile {
            name: "flaky.log".to_string(),
            size_bytes: 8,
            last_written_ms: 0,
        };
        source.insert(info, &b"AAAABBBB"[..], 4);
        source.fail_read_after("flaky.log", 1, PageFaultKind::Unavailable);

        let first = source.read_page("flaky.log", None).await.unwrap();
        assert_eq!(&first.data[..], b"AAAA");

        let err = source
            .read_page("flaky.log", first.next_cursor.as_deref())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn listing_failure_is_scripted() {
        let source = InMemoryLogSource::new();
        source.add_file("a.log", 0, &b"x"[..]);
        source.fail_listing("auth expired");

        let err = source.list_log_files().await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));

        source.clear_faults();
        assert_eq!(source.list_log_files().await.unwrap().len(), 1);
    }
}
