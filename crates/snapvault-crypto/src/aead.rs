//! Single-buffer XChaCha20-Poly1305 encryption/decryption
//!
//! Encrypted record format (binary):
//! ```text
//! [24 bytes: nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! ```
//!
//! `seal`/`open` work on the body (`ciphertext || tag`) with an explicit nonce.
//! `encrypt_bytes`/`decrypt_bytes` generate or consume a random nonce and carry
//! it at the front of the record.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};

use crate::error::{CryptoError, CryptoResult};
use crate::nonce::new_random_nonce;
use crate::{KEY_SIZE, NONCE_SIZE};

/// Encrypt `plaintext` under `key` and `nonce`, returning `ciphertext || tag`.
///
/// Deterministic for identical inputs. The key must be exactly 32 bytes.
pub fn seal(plaintext: &[u8], key: &[u8], nonce: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = cipher_for(key)?;
    let nonce = xnonce(nonce)?;

    cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::InvalidFormat("plaintext too large for a single record".into()))
}

/// Decrypt a `ciphertext || tag` body.
///
/// Any verification failure is reported as `AuthenticationFailed`, whatever the cause.
pub fn open(body: &[u8], key: &[u8], nonce: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = cipher_for(key)?;
    let nonce = xnonce(nonce)?;

    cipher
        .decrypt(nonce, body)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Seal `plaintext` and prepend the nonce: `nonce || ciphertext || tag`.
pub(crate) fn seal_record(plaintext: &[u8], key: &[u8], nonce: &[u8]) -> CryptoResult<Vec<u8>> {
    let body = seal(plaintext, key, nonce)?;

    let mut record = Vec::with_capacity(NONCE_SIZE + body.len());
    record.extend_from_slice(nonce);
    record.extend_from_slice(&body);
    Ok(record)
}

/// One-shot encryption with a fresh random nonce.
///
/// Returns: `[24-byte nonce][ciphertext][16-byte tag]`
pub fn encrypt_bytes(plaintext: &[u8], key: &[u8]) -> CryptoResult<Vec<u8>> {
    seal_record(plaintext, key, &new_random_nonce())
}

/// One-shot decryption of a record produced by `encrypt_bytes`.
pub fn decrypt_bytes(record: &[u8], key: &[u8]) -> CryptoResult<Vec<u8>> {
    if record.len() < NONCE_SIZE {
        return Err(CryptoError::InvalidFormat(format!(
            "encrypted record too short: {} bytes (nonce alone is {NONCE_SIZE})",
            record.len()
        )));
    }

    let (nonce, body) = record.split_at(NONCE_SIZE);
    open(body, key, nonce)
}

fn cipher_for(key: &[u8]) -> CryptoResult<XChaCha20Poly1305> {
    XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::KeyLength {
        expected: KEY_SIZE,
        actual: key.len(),
    })
}

fn xnonce(nonce: &[u8]) -> CryptoResult<&XNonce> {
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::NonceLength {
            expected: NONCE_SIZE,
            actual: nonce.len(),
        });
    }
    Ok(XNonce::from_slice(nonce))
}
