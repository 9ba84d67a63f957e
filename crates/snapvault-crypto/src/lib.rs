//! snapvault-crypto: envelope encryption for cluster snapshot backups
//!
//! Construction: chunk-then-encrypt with XChaCha20-Poly1305
//!
//! Pipeline: snapshot bytes → fixed-size plaintext chunks → seal each chunk
//! → concatenate records
//!
//! Key hierarchy:
//! ```text
//! Master Key (256-bit, caller supplied, hex-encoded file at rest)
//!   └── Data Key (per backup, 256-bit random, wrapped by master key → `.key` object)
//!       └── Chunk AEAD: XChaCha20-Poly1305 (key=data_key, nonce=base_128bit||counter_be64)
//! ```
//!
//! Every encrypted value, standalone or per chunk, has the same record shape:
//! `[24-byte nonce][ciphertext][16-byte Poly1305 tag]`.

pub mod aead;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod nonce;
pub mod stream;

pub use aead::{decrypt_bytes, encrypt_bytes, open, seal};
pub use envelope::{rewrap, rewrap_converter, unwrap_data_key, wrap_data_key};
pub use error::{CryptoError, CryptoResult};
pub use keys::{DataKey, MasterKey};
pub use nonce::{new_incrementing_nonce, new_random_nonce, IncrementingNonce, Nonce};
pub use stream::{ciphertext_len, DecryptStream, EncryptStream};

/// Size of a master or data key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of the fixed part of an incrementing nonce (timestamp + random)
pub const NONCE_BASE_SIZE: usize = 16;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Per-record overhead added to every sealed chunk or value
pub const RECORD_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// Size of a wrapped data key object: nonce (24) + key (32) + tag (16)
pub const WRAPPED_KEY_SIZE: usize = NONCE_SIZE + KEY_SIZE + TAG_SIZE;

/// Default plaintext chunk size (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Largest accepted plaintext chunk size (256 MiB); both streams buffer a whole chunk
pub const MAX_CHUNK_SIZE: usize = 256 * 1024 * 1024;
