//! Key material: caller-supplied master keys and per-backup data keys

use rand::RngCore;
use secrecy::SecretString;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::KEY_SIZE;

/// Fixed-size key newtype: zeroized on drop, redacted in `Debug`.
macro_rules! key_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name {
            bytes: [u8; KEY_SIZE],
        }

        impl $name {
            pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
                Self { bytes }
            }

            /// Length-checked copy of `bytes`.
            pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
                copy_key(bytes).map(Self::from_bytes)
            }

            pub fn generate() -> Self {
                Self::from_bytes(random_key_bytes())
            }

            pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.bytes
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                self.bytes.zeroize();
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(concat!(stringify!($name), "([REDACTED])"))
            }
        }
    };
}

key_type! {
    /// A long-lived 256-bit master key. Only ever used to wrap data keys.
    #[derive(Clone)]
    MasterKey
}

key_type! {
    /// A per-backup 256-bit data key. Generated fresh for every stream, never reused.
    DataKey
}

impl MasterKey {
    /// Decode hex key material as stored in a master key file.
    ///
    /// Leading and trailing whitespace (a trailing newline, typically) is ignored.
    pub fn from_hex(encoded: &str) -> CryptoResult<Self> {
        let mut decoded = hex::decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("master key is not valid hex: {e}")))?;

        let result = copy_key(&decoded).map(Self::from_bytes).map_err(|_| {
            CryptoError::InvalidKey(format!(
                "master key decodes to {} bytes (expected {KEY_SIZE})",
                decoded.len()
            ))
        });
        decoded.zeroize();
        result
    }

    /// Hex encoding suitable for writing a master key file.
    pub fn to_hex(&self) -> SecretString {
        SecretString::from(hex::encode(self.bytes))
    }
}

fn random_key_bytes() -> [u8; KEY_SIZE] {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

fn copy_key(bytes: &[u8]) -> CryptoResult<[u8; KEY_SIZE]> {
    if bytes.len() != KEY_SIZE {
        return Err(CryptoError::KeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        });
    }
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(bytes);
    Ok(key)
}
