//! Destination Index
//!
//! Trait-based abstraction over the durable object store that holds archived
//! log files: prefix-scoped listing with stored metadata, and an encrypted
//! write path. Writes are idempotent, and every write carries a server-side
//! encryption directive; archived database logs never land unencrypted.
//!
//! Implementations:
//! - `InMemoryLogStore`: for unit tests
//! - `LocalFsLogStore`: for development and local testing
//! - `S3LogStore`: for production (feature `s3`)

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

/// Metadata snapshot for one stored object, read at decision time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    /// Object key (namespace prefix + source file name).
    pub key: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Destination-native modification time, milliseconds since epoch.
    pub last_modified_ms: u64,
}

/// Server-side encryption directive attached to every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionPolicy {
    /// SSE with a managed key service; `key_id = None` uses the default key.
    Kms {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key_id: Option<String>,
    },
    /// Store-managed AES-256.
    Aes256,
}

/// Error type for destination store operations
#[derive(Debug)]
pub enum StoreError {
    /// Listing or write failed (network, throttling, missing namespace).
    Unavailable(String),
    /// The caller is not allowed to list or write here.
    PermissionDenied(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "destination store unavailable: {}", msg),
            StoreError::PermissionDenied(msg) => write!(f, "permission denied: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            ErrorKind::PermissionDenied => StoreError::PermissionDenied(e.to_string()),
            _ => StoreError::Unavailable(e.to_string()),
        }
    }
}

/// Destination store abstraction trait
///
/// Manually boxed futures keep the trait object safe without an async-trait
/// dependency.
pub trait LogStore: Send + Sync + 'static {
    /// Cheap probe that the destination namespace is reachable at all.
    ///
    /// Failure is a global precondition failure: the run aborts before any
    /// file work starts.
    fn verify_access<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

    /// List objects whose key starts with `prefix`, with stored metadata.
    fn list_objects<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RemoteObject>, StoreError>> + Send + 'a>>;

    /// Write `payload` at `key` with the mandatory encryption directive.
    ///
    /// Writes are idempotent: writing the same key twice with an identical
    /// payload yields the same observable final state.
    fn write_object<'a>(
        &'a self,
        key: &'a str,
        payload: &'a [u8],
        encryption: &'a EncryptionPolicy,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

    /// Probe a single key: prefix-scoped listing plus exact-key match.
    fn lookup<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RemoteObject>, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let objects = self.list_objects(key).await?;
            Ok(objects.into_iter().find(|o| o.key == key))
        })
    }
}

// ============================================================================
// InMemoryLogStore - for tests
// ============================================================================

/// How a scripted store fault presents to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreFaultKind {
    /// Operation fails as a transient outage.
    Unavailable,
    /// Operation fails as an authorization error.
    PermissionDenied,
}

impl StoreFaultKind {
    fn to_error(&self, what: &str) -> StoreError {
        match self {
            StoreFaultKind::Unavailable => {
                StoreError::Unavailable(format!("scripted {} failure", what))
            }
            StoreFaultKind::PermissionDenied => {
                StoreError::PermissionDenied(format!("scripted {} denial", what))
            }
        }
    }
}

#[derive(Debug, Clone)]
struct StoredEntry {
    payload: Vec<u8>,
    last_modified_ms: u64,
    encryption: EncryptionPolicy,
}

#[derive(Debug, Default)]
struct StoreInner {
    objects: BTreeMap<String, StoredEntry>,
    /// Manual clock stamped onto writes so tests control modification times.
    clock_ms: u64,
    writes: u64,
    list_fault: Option<StoreFaultKind>,
    write_fault: Option<StoreFaultKind>,
    access_fault: Option<StoreFaultKind>,
}

/// In-memory destination store for unit tests.
///
/// Records, per object, the payload, the write timestamp and the encryption
/// policy it was written with, plus a write counter so tests can assert that
/// an unchanged second run performs zero writes.
#[derive(Debug, Default)]
pub struct InMemoryLogStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl InMemoryLogStore {
    /// Create an empty store.
    pub fn new() -> Self {
        InMemoryLogStore::default()
    }

    /// Set the clock used to stamp subsequent writes.
    pub fn set_clock_ms(&self, clock_ms: u64) {
        self.inner.write().clock_ms = clock_ms;
    }

    /// Seed an object directly, bypassing the write counter.
    pub fn seed(&self, key: &str, payload: impl Into<Vec<u8>>, last_modified_ms: u64) {
        self.inner.write().objects.insert(
            key.to_string(),
            StoredEntry {
                payload: payload.into(),
                last_modified_ms,
                encryption: EncryptionPolicy::Kms { key_id: None },
            },
        );
    }

    /// Total number of `write_object` calls that committed.
    pub fn write_count(&self) -> u64 {
        self.inner.read().writes
    }

    /// Stored payload at `key`, if any.
    pub fn payload(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.read().objects.get(key).map(|e| e.payload.clone())
    }

    /// Encryption policy `key` was written with, if stored.
    pub fn encryption_of(&self, key: &str) -> Option<EncryptionPolicy> {
        self.inner.read().objects.get(key).map(|e| e.encryption.clone())
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.inner.read().objects.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().objects.is_empty()
    }

    /// Make `list_objects` (and `lookup`) fail.
    pub fn fail_listings(&self, kind: StoreFaultKind) {
        self.inner.write().list_fault = Some(kind);
    }

    /// Make `write_object` fail.
    pub fn fail_writes(&self, kind: StoreFaultKind) {
        self.inner.write().write_fault = Some(kind);
    }

    /// Make `verify_access` fail.
    pub fn fail_access(&self, kind: StoreFaultKind) {
        self.inner.write().access_fault = Some(kind);
    }

    /// Clear all scripted faults.
    pub fn clear_faults(&self) {
        let mut inner = self.inner.write();
        inner.list_fault = None;
        inner.write_fault = None;
        inner.access_fault = None;
    }
}

impl Clone for InMemoryLogStore {
    fn clone(&self) -> Self {
        InMemoryLogStore {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl LogStore for InMemoryLogStore {
    fn verify_access<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(async move {
            match &self.inner.read().access_fault {
                Some(kind) => Err(kind.to_error("access check")),
                None => Ok(()),
            }
        })
    }

    fn list_objects<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RemoteObject>, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let inner = self.inner.read();
            if let Some(kind) = &inner.list_fault {
                return Err(kind.to_error("listing"));
            }
            Ok(inner
                .objects
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, e)| RemoteObject {
                    key: k.clone(),
                    size_bytes: e.payload.len() as u64,
                    last_modified_ms: e.last_modified_ms,
                })
                .collect())
        })
    }

    fn write_object<'a>(
        &'a self,
        key: &'a str,
        payload: &'a [u8],
        encryption: &'a EncryptionPolicy,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let mut inner = self.inner.write();
            if let Some(kind) = &inner.write_fault {
                return Err(kind.to_error("write"));
            }
            let entry = StoredEntry {
                payload: payload.to_vec(),
                last_modified_ms: inner.clock_ms,
                encryption: encryption.clone(),
            };
            inner.objects.insert(key.to_string(), entry);
            inner.writes += 1;
            Ok(())
        })
    }
}

// ============================================================================
// LocalFsLogStore - for development
// ============================================================================

/// Local filesystem destination for development and testing.
///
/// Files land under `base_path` keyed by their object key. The encryption
/// directive is accepted for call-shape parity but local files are written
/// as-is.
#[derive(Debug, Clone)]
pub struct LocalFsLogStore {
    base_path: PathBuf,
}

impl LocalFsLogStore {
    /// Create a store rooted at `base_path`.
    pub fn new(base_path: PathBuf) -> Self {
        LocalFsLogStore { base_path }
    }

    /// Root directory of the store.
    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }

    fn ensure_parent(path: &PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn modified_ms(metadata: &std::fs::Metadata) -> u64 {
        metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn walk_dir(
        dir: &PathBuf,
        base: &PathBuf,
        prefix: &str,
        objects: &mut Vec<RemoteObject>,
    ) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                Self::walk_dir(&path, base, prefix, objects)?;
            } else if path.is_file() {
                let key = match path.strip_prefix(base) {
                    Ok(rel) => rel.to_string_lossy().to_string(),
                    Err(_) => continue,
                };
                if key.starts_with(prefix) {
                    let metadata = std::fs::metadata(&path)?;
                    objects.push(RemoteObject {
                        key,
                        size_bytes: metadata.len(),
                        last_modified_ms: Self::modified_ms(&metadata),
                    });
                }
            }
        }
        Ok(())
    }
}

impl LogStore for LocalFsLogStore {
    fn verify_access<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(&self.base_path).await?;
            Ok(())
        })
    }

    fn list_objects<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RemoteObject>, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            if !self.base_path.exists() {
                return Ok(Vec::new());
            }
            let mut objects = Vec::new();
            Self::walk_dir(&self.base_path, &self.base_path, prefix, &mut objects)?;
            objects.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(objects)
        })
    }

    fn write_object<'a>(
        &'a self,
        key: &'a str,
        payload: &'a [u8],
        _encryption: &'a EncryptionPolicy,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.full_path(key);
            Self::ensure_parent(&path)?;
            tokio::fs::write(&path, payload).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inmemory_write_then_lookup() {
        let store = InMemoryLogStore::new();
        store.set_clock_ms(42);
        store
            .write_object("logs/a.log", b"hello", &EncryptionPolicy::Aes256)
            .await
            .unwrap();

        let found = store.lookup("logs/a.log").await.unwrap().unwrap();
        assert_eq!(found.size_bytes, 5);
        assert_eq!(found.last_modified_ms, 42);
        assert_eq!(store.encryption_of("logs/a.log"), Some(EncryptionPolicy::Aes256));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn inmemory_lookup_misses_cleanly() {
        let store = InMemoryLogStore::new();
        store.seed("logs/other.log", vec![0u8; 8], 0);
        assert!(store.lookup("logs/a.log").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn inmemory_list_scopes_by_prefix() {
        let store = InMemoryLogStore::new();
        store.seed("logs/error/a.log", vec![1], 0);
        store.seed("logs/error/b.log", vec![2], 0);
        store.seed("logs/slow/c.log", vec![3], 0);

        let listed = store.list_objects("logs/error/").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|o| o.key.starts_with("logs/error/")));
    }

    #[tokio::test]
    async fn inmemory_scripted_faults() {
        let store = InMemoryLogStore::new();
        store.fail_writes(StoreFaultKind::PermissionDenied);
        let err = store
            .write_object("k", b"x", &EncryptionPolicy::Aes256)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PermissionDenied(_)));
        assert_eq!(store.write_count(), 0);

        store.fail_listings(StoreFaultKind::Unavailable);
        assert!(store.list_objects("").await.is_err());

        store.clear_faults();
        assert!(store.list_objects("").await.is_ok());
    }

    #[tokio::test]
    async fn localfs_write_list_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsLogStore::new(dir.path().to_path_buf());
        store.verify_access().await.unwrap();

        let policy = EncryptionPolicy::Kms { key_id: None };
        store
            .write_object("logs/error/a.log", b"payload", &policy)
            .await
            .unwrap();
        store
            .write_object("logs/slow/b.log", b"zz", &policy)
            .await
            .unwrap();

        let listed = store.list_objects("logs/error/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "logs/error/a.log");
        assert_eq!(listed[0].size_bytes, 7);

        let found = store.lookup("logs/slow/b.log").await.unwrap().unwrap();
        assert_eq!(found.size_bytes, 2);
        assert!(found.last_modified_ms > 0);
    }

    #[tokio::test]
    async fn localfs_overwrite_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsLogStore::new(dir.path().to_path_buf());
        let policy = EncryptionPolicy::Aes256;

        store.write_object("a.log", b"same", &policy).await.unwrap();
        store.write_object("a.log", b"same", &policy).await.unwrap();

        let listed = store.list_objects("").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].size_bytes, 4);
    }
}
