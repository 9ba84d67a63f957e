//! S3 credentials: credentials file first, environment second

use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;

use crate::config::StorageConfig;
use crate::error::{SnapvaultError, SnapvaultResult};

#[derive(Debug)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
    pub source: String,
}

#[derive(Deserialize)]
struct CredentialsFile {
    access_key: String,
    secret_key: String,
}

impl S3Credentials {
    /// `storage.credentials_file` when set, otherwise the process environment.
    pub fn load(storage: &StorageConfig) -> SnapvaultResult<Self> {
        match &storage.credentials_file {
            Some(path) => Self::from_file(path),
            None => Self::from_lookup(|name| std::env::var(name).ok()),
        }
    }

    pub fn from_file(path: &Path) -> SnapvaultResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SnapvaultError::Config(format!("reading credentials file {}: {e}", path.display()))
        })?;
        let parsed: CredentialsFile = toml::from_str(&content).map_err(|e| {
            SnapvaultError::Config(format!("parsing credentials file {}: {e}", path.display()))
        })?;

        Ok(Self {
            access_key_id: parsed.access_key,
            secret_access_key: SecretString::from(parsed.secret_key),
            source: format!("file:{}", path.display()),
        })
    }

    /// Reads AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY, falling back to the
    /// SNAPVAULT_-prefixed names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SnapvaultResult<Self> {
        let var = |primary: &str, fallback: &str| {
            lookup(primary)
                .filter(|v| !v.is_empty())
                .or_else(|| lookup(fallback).filter(|v| !v.is_empty()))
        };

        let access_key = var("AWS_ACCESS_KEY_ID", "SNAPVAULT_ACCESS_KEY_ID").ok_or_else(|| {
            SnapvaultError::Config(
                "S3 credentials not set\n\
                 Set storage.credentials_file, \
                 or export AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY."
                    .into(),
            )
        })?;
        let secret_key = var("AWS_SECRET_ACCESS_KEY", "SNAPVAULT_SECRET_ACCESS_KEY")
            .ok_or_else(|| SnapvaultError::Config("AWS_SECRET_ACCESS_KEY not set".into()))?;

        Ok(Self {
            access_key_id: access_key,
            secret_access_key: SecretString::from(secret_key),
            source: "env".into(),
        })
    }
}
