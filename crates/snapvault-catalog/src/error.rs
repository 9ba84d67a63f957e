use chrono::{DateTime, Utc};
use thiserror::Error;

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The object does not follow the naming convention; callers skip it.
    #[error("object name does not match the backup naming convention: {0}")]
    UnrecognizedName(String),

    /// The object follows the convention but its timestamp is not RFC 3339.
    #[error("timestamp '{timestamp}' in object '{name}' does not parse: {reason}")]
    MalformedTimestamp {
        name: String,
        timestamp: String,
        reason: String,
    },

    #[error("invalid object prefix: {0}")]
    InvalidPrefix(String),

    #[error("no backup found for timestamp {0}")]
    NotFound(DateTime<Utc>),

    #[error("no valid backups found")]
    NoValidBackups,
}
