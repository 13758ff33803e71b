//! S3 Destination Index
//!
//! Production `LogStore` over the `object_store` crate. The store is built
//! with the server-side-encryption directive derived from the configured
//! `EncryptionPolicy`, so every PUT it issues carries the directive and
//! archived logs never land unencrypted.
//!
//! Keys are taken as-is (the orchestrator owns prefix derivation); the
//! bucket is the namespace root.

use crate::archive::store::{EncryptionPolicy, LogStore, RemoteObject, StoreError};
use object_store::aws::{AmazonS3, AmazonS3Builder, AmazonS3ConfigKey};
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore as ObjectStoreTrait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Destination index over an S3 bucket (or S3-compatible endpoint).
#[derive(Clone)]
pub struct S3LogStore {
    store: Arc<AmazonS3>,
    bucket: String,
}

impl S3LogStore {
    /// Build a store for `bucket` in `region`.
    ///
    /// Credentials and any custom endpoint come from the standard
    /// environment (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
    /// `AWS_ENDPOINT`, ...). The encryption directive is applied at
    /// construction and rides on every write.
    pub fn new(
        bucket: &str,
        region: &str,
        encryption: &EncryptionPolicy,
    ) -> Result<Self, StoreError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_region(region);
        builder = apply_encryption(builder, encryption)?;

        let store = builder
            .build()
            .map_err(|e| StoreError::Unavailable(format!("cannot build S3 store: {}", e)))?;

        Ok(S3LogStore {
            store: Arc::new(store),
            bucket: bucket.to_string(),
        })
    }

    /// Bucket this store writes into.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl std::fmt::Debug for S3LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3LogStore")
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Translate the policy into the store's encryption configuration keys.
fn apply_encryption(
    builder: AmazonS3Builder,
    encryption: &EncryptionPolicy,
) -> Result<AmazonS3Builder, StoreError> {
    let sse: AmazonS3ConfigKey = parse_config_key("aws_server_side_encryption")?;
    match encryption {
        EncryptionPolicy::Kms { key_id } => {
            let mut builder = builder.with_config(sse, "aws:kms");
            if let Some(key_id) = key_id {
                let kms_key = parse_config_key("aws_sse_kms_key_id")?;
                builder = builder.with_config(kms_key, key_id.clone());
            }
            Ok(builder)
        }
        EncryptionPolicy::Aes256 => Ok(builder.with_config(sse, "AES256")),
    }
}

fn parse_config_key(name: &str) -> Result<AmazonS3ConfigKey, StoreError> {
    name.parse()
        .map_err(|e| StoreError::Unavailable(format!("unsupported store option '{}': {}", name, e)))
}

/// Convert backend errors into the store taxonomy.
fn map_error(err: object_store::Error) -> StoreError {
    classify(err.to_string())
}

/// The underlying crate folds the HTTP status into the error text, so
/// authorization failures are recognized by message.
fn classify(msg: String) -> StoreError {
    if msg.contains("AccessDenied") || msg.contains("403") {
        StoreError::PermissionDenied(msg)
    } else {
        StoreError::Unavailable(msg)
    }
}

impl LogStore for S3LogStore {
    fn verify_access<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(async move {
            // One shallow listing round-trip stands in for a bucket HEAD:
            // it fails fast on a missing bucket or rejected credentials.
            self.store
                .list_with_delimiter(None)
                .await
                .map(|_| ())
                .map_err(map_error)
        })
    }

    fn list_objects<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RemoteObject>, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            use futures::TryStreamExt;

            let prefix_path = ObjectPath::from(prefix);
            let metas: Vec<_> = self
                .store
                .list(Some(&prefix_path))
                .try_collect()
                .await
                .map_err(map_error)?;

            Ok(metas
                .into_iter()
                .map(|meta| RemoteObject {
                    key: meta.location.to_string(),
                    size_bytes: meta.size as u64,
                    last_modified_ms: meta
                        .last_modified
                        .timestamp_millis()
                        .try_into()
                        .unwrap_or(0),
                })
                .collect())
        })
    }

    /// Targeted single-key probe.
    ///
    /// The backend evaluates listing prefixes on a path-segment basis, so
    /// the default list-plus-match probe would miss the exact key; a HEAD
    /// request is both correct and one round trip.
    fn lookup<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RemoteObject>, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let path = ObjectPath::from(key);
            match self.store.head(&path).await {
                Ok(meta) => Ok(Some(RemoteObject {
                    key: meta.location.to_string(),
                    size_bytes: meta.size as u64,
                    last_modified_ms: meta
                        .last_modified
                        .timestamp_millis()
                        .try_into()
                        .unwrap_or(0),
                })),
                Err(object_store::Error::NotFound { .. }) => Ok(None),
                Err(e) => Err(map_error(e)),
            }
        })
    }

    fn write_object<'a>(
        &'a self,
        key: &'a str,
        payload: &'a [u8],
        _encryption: &'a EncryptionPolicy,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        // The directive was baked into the store at construction; the
        // argument stays in the signature so the call shape is uniform
        // across backends.
        Box::pin(async move {
            let path = ObjectPath::from(key);
            self.store
                .put(&path, bytes::Bytes::copy_from_slice(payload).into())
                .await
                .map(|_| ())
                .map_err(map_error)
        })
    }
}
