use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Failures surfaced by the codec, the chunk streams and the key envelope.
///
/// `AuthenticationFailed` deliberately covers both a wrong key and tampered
/// data; callers cannot tell the two apart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid key length: {actual} bytes (expected {expected})")]
    KeyLength { expected: usize, actual: usize },

    #[error("invalid nonce length: {actual} bytes (expected {expected})")]
    NonceLength { expected: usize, actual: usize },

    #[error("authentication failed: wrong key or corrupted data")]
    AuthenticationFailed,

    #[error("invalid encrypted format: {0}")]
    InvalidFormat(String),

    #[error("nonce counter exhausted for this stream")]
    CounterExhausted,

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("key could not be opened with either the previous or the new master key: {0}")]
    RotationFailed(Box<CryptoError>),
}

impl From<CryptoError> for std::io::Error {
    fn from(err: CryptoError) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidData, err)
    }
}
