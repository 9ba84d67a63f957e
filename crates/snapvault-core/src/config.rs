use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use snapvault_catalog::{NamingConvention, RetentionPolicy, DEFAULT_PREFIX};
use snapvault_crypto::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};

use crate::error::{SnapvaultError, SnapvaultResult};

/// Top-level configuration (loaded from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapvaultConfig {
    /// Snapshot file produced by the database collaborator; also the restore target
    pub snapshot_path: PathBuf,
    /// Hex-encoded master key file. Absent means backups are stored unencrypted.
    pub encryption_key_path: Option<PathBuf>,
    pub storage: StorageConfig,
    pub encryption: EncryptionConfig,
    pub retention: RetentionConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    pub bucket: String,
    /// Object name prefix for backups (default: "backup")
    pub objects_prefix: String,
    /// TOML file with access_key / secret_key (falls back to env vars)
    pub credentials_file: Option<PathBuf>,
    /// Enforce HTTPS for S3 connections (warn/error on HTTP endpoints)
    pub enforce_tls: bool,
    /// Root path inside the bucket
    pub root: Option<String>,
    /// Per-request timeout in seconds (0 disables)
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Plaintext bytes per encrypted chunk. Must match between backup and restore.
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Backups older than this are prune candidates, e.g. "15d", "1d12h"
    pub max_age: String,
    /// Valid backups always kept, whatever their age
    pub min_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for SnapvaultConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("/var/lib/snapvault/snapshot.db"),
            encryption_key_path: None,
            storage: StorageConfig::default(),
            encryption: EncryptionConfig::default(),
            retention: RetentionConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "snapvault".into(),
            objects_prefix: DEFAULT_PREFIX.into(),
            credentials_file: None,
            enforce_tls: false,
            root: None,
            request_timeout_secs: 60,
        }
    }
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age: "15d".into(),
            min_count: 20,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl SnapvaultConfig {
    pub fn from_toml(content: &str) -> SnapvaultResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| SnapvaultError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SnapvaultResult<()> {
        if self.encryption.chunk_size == 0 {
            return Err(SnapvaultError::Config(
                "encryption.chunk_size must be greater than zero".into(),
            ));
        }
        if self.encryption.chunk_size > MAX_CHUNK_SIZE {
            return Err(SnapvaultError::Config(format!(
                "encryption.chunk_size must not exceed {MAX_CHUNK_SIZE} bytes"
            )));
        }
        if self.storage.objects_prefix.is_empty() {
            return Err(SnapvaultError::Config(
                "storage.objects_prefix must not be empty".into(),
            ));
        }
        parse_max_age(&self.retention.max_age)?;
        Ok(())
    }

    pub fn naming(&self) -> SnapvaultResult<NamingConvention> {
        Ok(NamingConvention::new(self.storage.objects_prefix.clone())?)
    }
}

impl RetentionConfig {
    pub fn policy(&self) -> SnapvaultResult<RetentionPolicy> {
        Ok(RetentionPolicy::new(parse_max_age(&self.max_age)?, self.min_count))
    }
}

/// Parse an age such as `15d`, `36h` or `1w2d12h`.
///
/// Units: `s`, `m`, `h`, `d`, `w`. Every number needs a unit; components add up.
pub fn parse_max_age(input: &str) -> SnapvaultResult<Duration> {
    let invalid =
        |reason: &str| SnapvaultError::Config(format!("invalid max age '{input}': {reason}"));

    let s = input.trim();
    if s.is_empty() {
        return Err(invalid("empty"));
    }

    let mut total = Duration::zero();
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }

        if digits.is_empty() {
            return Err(invalid("expected a number before each unit"));
        }
        let value: i64 = digits.parse().map_err(|_| invalid("number out of range"))?;
        digits.clear();

        let seconds_per_unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            'd' => 24 * 60 * 60,
            'w' => 7 * 24 * 60 * 60,
            other => return Err(invalid(&format!("unknown unit '{other}'"))),
        };
        let component = value
            .checked_mul(seconds_per_unit)
            .and_then(Duration::try_seconds)
            .ok_or_else(|| invalid("duration out of range"))?;
        total = total
            .checked_add(&component)
            .ok_or_else(|| invalid("duration out of range"))?;
    }

    if !digits.is_empty() {
        return Err(invalid("missing unit after trailing number"));
    }
    Ok(total)
}
