//! Archiver Configuration
//!
//! Explicit configuration bundle handed to the orchestrator at construction.
//! The core never reads ambient environment state; the binary builds one of
//! these from a TOML file or from environment variables and passes it in.
//!
//! Environment variables:
//! - `DBLOG_INSTANCE_ID`: source database instance identifier (required)
//! - `DBLOG_BUCKET`: destination bucket (required)
//! - `DBLOG_REGION`: region for both bindings (required)
//! - `DBLOG_PREFIX`: destination key prefix (default: empty)
//! - `DBLOG_TIMESTAMP_UNIT`: `seconds` or `milliseconds` (default: milliseconds)
//! - `DBLOG_SSE`: `kms` or `aes256` (default: kms)
//! - `DBLOG_KMS_KEY_ID`: explicit KMS key (default: store's default key)
//! - `DBLOG_MAX_IN_FLIGHT`: bounded fan-out across files (default: 1)

use crate::archive::source::TimestampUnit;
use crate::archive::store::EncryptionPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for one archival run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Source database instance identifier.
    pub instance_id: String,
    /// Destination bucket (namespace root).
    pub bucket: String,
    /// Key prefix under which all archived objects for this instance live.
    #[serde(default)]
    pub prefix: String,
    /// Region for both the source and destination bindings.
    pub region: String,
    /// Unit of the source binding's raw write timestamps.
    #[serde(default = "default_timestamp_unit")]
    pub timestamp_unit: TimestampUnit,
    /// Server-side encryption applied to every write.
    #[serde(default = "default_encryption")]
    pub encryption: EncryptionPolicy,
    /// Bounded fan-out across files; 1 processes one file fully before the
    /// next.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_timestamp_unit() -> TimestampUnit {
    TimestampUnit::Milliseconds
}

fn default_encryption() -> EncryptionPolicy {
    EncryptionPolicy::Kms { key_id: None }
}

fn default_max_in_flight() -> usize {
    1
}

/// Error type for configuration loading
#[derive(Debug)]
pub enum ConfigError {
    /// A required setting is absent.
    Missing(&'static str),
    /// A setting is present but unusable.
    Invalid(String),
    /// Config file could not be read.
    Io(std::io::Error),
    /// Config file could not be parsed.
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(name) => write!(f, "missing required setting: {}", name),
            ConfigError::Invalid(msg) => write!(f, "invalid setting: {}", msg),
            ConfigError::Io(e) => write!(f, "cannot read config file: {}", e),
            ConfigError::Parse(msg) => write!(f, "cannot parse config file: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl ArchiveConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = ArchiveConfig {
            instance_id: require_env("DBLOG_INSTANCE_ID")?,
            bucket: require_env("DBLOG_BUCKET")?,
            prefix: std::env::var("DBLOG_PREFIX").unwrap_or_default(),
            region: require_env("DBLOG_REGION")?,
            timestamp_unit: match std::env::var("DBLOG_TIMESTAMP_UNIT") {
                Ok(raw) => parse_timestamp_unit(&raw)?,
                Err(_) => default_timestamp_unit(),
            },
            encryption: encryption_from_env()?,
            max_in_flight: match std::env::var("DBLOG_MAX_IN_FLIGHT") {
                Ok(raw) => raw.parse().map_err(|_| {
                    ConfigError::Invalid(format!("DBLOG_MAX_IN_FLIGHT '{}' is not a number", raw))
                })?,
                Err(_) => default_max_in_flight(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: ArchiveConfig =
            toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration for tests.
    pub fn test() -> Self {
        ArchiveConfig {
            instance_id: "test-db".to_string(),
            bucket: "test-bucket".to_string(),
            prefix: "logs".to_string(),
            region: "us-east-1".to_string(),
            timestamp_unit: TimestampUnit::Milliseconds,
            encryption: EncryptionPolicy::Kms { key_id: None },
            max_in_flight: 1,
        }
    }

    /// Reject configurations the orchestrator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance_id.is_empty() {
            return Err(ConfigError::Missing("instance_id"));
        }
        if self.bucket.is_empty() {
            return Err(ConfigError::Missing("bucket"));
        }
        if self.region.is_empty() {
            return Err(ConfigError::Missing("region"));
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "max_in_flight must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn parse_timestamp_unit(raw: &str) -> Result<TimestampUnit, ConfigError> {
    match raw {
        "seconds" | "s" => Ok(TimestampUnit::Seconds),
        "milliseconds" | "ms" => Ok(TimestampUnit::Milliseconds),
        other => Err(ConfigError::Invalid(format!(
            "timestamp unit '{}' (expected 'seconds' or 'milliseconds')",
            other
        ))),
    }
}

fn encryption_from_env() -> Result<EncryptionPolicy, ConfigError> {
    match std::env::var("DBLOG_SSE").as_deref() {
        Ok("kms") | Err(_) => Ok(EncryptionPolicy::Kms {
            key_id: std::env::var("DBLOG_KMS_KEY_ID").ok(),
        }),
        Ok("aes256") => Ok(EncryptionPolicy::Aes256),
        Ok(other) => Err(ConfigError::Invalid(format!(
            "encryption '{}' (expected 'kms' or 'aes256')",
            other
        ))),
    }
}
