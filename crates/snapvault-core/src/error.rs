use thiserror::Error;

use snapvault_catalog::CatalogError;
use snapvault_crypto::CryptoError;

pub type SnapvaultResult<T> = Result<T, SnapvaultError>;

#[derive(Debug, Error)]
pub enum SnapvaultError {
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("storage error: {0}")]
    Storage(#[from] opendal::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("backup already exists at {timestamp}: {object}")]
    BackupExists { timestamp: String, object: String },

    #[error("key rotation failed at {object}: {source}")]
    Rotation {
        object: String,
        #[source]
        source: CryptoError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
