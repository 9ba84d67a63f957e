//! Backup object naming
//!
//! ```text
//! {prefix}-{RFC 3339 timestamp, UTC, whole seconds}.dump   encrypted or plain payload
//! {prefix}-{RFC 3339 timestamp, UTC, whole seconds}.key    wrapped data key
//! ```
//!
//! e.g. `backup-2024-03-01T12:00:00Z.dump`

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::Serialize;

use crate::error::{CatalogError, CatalogResult};

pub const DEFAULT_PREFIX: &str = "backup";

const PAYLOAD_EXTENSION: &str = "dump";
const KEY_EXTENSION: &str = "key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Payload,
    Key,
}

impl ObjectKind {
    pub fn extension(self) -> &'static str {
        match self {
            ObjectKind::Payload => PAYLOAD_EXTENSION,
            ObjectKind::Key => KEY_EXTENSION,
        }
    }
}

/// A storage object name, parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    pub timestamp: DateTime<Utc>,
    pub kind: ObjectKind,
}

/// Maps backup timestamps to object names and back for one prefix.
#[derive(Debug, Clone)]
pub struct NamingConvention {
    prefix: String,
    pattern: Regex,
}

impl NamingConvention {
    /// The prefix is matched literally; regex metacharacters in it are escaped.
    pub fn new(prefix: impl Into<String>) -> CatalogResult<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(CatalogError::InvalidPrefix("prefix must not be empty".into()));
        }

        let pattern = Regex::new(&format!(
            r"^{}-(\d+-\d+-\d+T\d+:\d+:\d+Z)\.({PAYLOAD_EXTENSION}|{KEY_EXTENSION})$",
            regex::escape(&prefix)
        ))
        .map_err(|e| CatalogError::InvalidPrefix(format!("{prefix}: {e}")))?;

        Ok(Self { prefix, pattern })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Name of one object of a backup. Sub-second precision is dropped.
    pub fn object_name(&self, timestamp: DateTime<Utc>, kind: ObjectKind) -> String {
        format!(
            "{}-{}.{}",
            self.prefix,
            timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            kind.extension()
        )
    }

    /// `(payload_name, key_name)` for a backup taken at `timestamp`.
    pub fn object_names(&self, timestamp: DateTime<Utc>) -> (String, String) {
        (
            self.object_name(timestamp, ObjectKind::Payload),
            self.object_name(timestamp, ObjectKind::Key),
        )
    }

    pub fn parse(&self, name: &str) -> CatalogResult<ObjectInfo> {
        let captures = self
            .pattern
            .captures(name)
            .ok_or_else(|| CatalogError::UnrecognizedName(name.to_string()))?;

        let raw = &captures[1];
        let timestamp = DateTime::parse_from_rfc3339(raw)
            .map_err(|e| CatalogError::MalformedTimestamp {
                name: name.to_string(),
                timestamp: raw.to_string(),
                reason: e.to_string(),
            })?
            .with_timezone(&Utc);

        let kind = match &captures[2] {
            PAYLOAD_EXTENSION => ObjectKind::Payload,
            _ => ObjectKind::Key,
        };

        Ok(ObjectInfo { timestamp, kind })
    }
}
