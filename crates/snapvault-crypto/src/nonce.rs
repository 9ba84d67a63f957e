//! Nonce construction for XChaCha20-Poly1305
//!
//! Random nonce (standalone values such as a wrapped data key):
//! ```text
//! [8 bytes: unix epoch nanos, BE][16 bytes: random]
//! ```
//!
//! Incrementing nonce (one per chunk of a stream):
//! ```text
//! [8 bytes: unix epoch nanos, BE][8 bytes: random][8 bytes: counter, BE]
//! ```
//!
//! The 16-byte base is fixed for the lifetime of a stream; the counter starts
//! at zero and is consumed strictly in chunk order.

use rand::RngCore;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{CryptoError, CryptoResult};
use crate::{NONCE_BASE_SIZE, NONCE_SIZE};

/// A full-width XChaCha20-Poly1305 nonce.
pub type Nonce = [u8; NONCE_SIZE];

/// Counters stay within the signed 64-bit range; reaching it ends the stream.
const MAX_COUNTER: u64 = i64::MAX as u64;

/// Generate a one-shot nonce: timestamp followed by random fill.
pub fn new_random_nonce() -> Nonce {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..8].copy_from_slice(&epoch_nanos_be());
    rand::thread_rng().fill_bytes(&mut nonce[8..]);
    nonce
}

/// Start a per-stream nonce sequence with a freshly generated base.
pub fn new_incrementing_nonce() -> IncrementingNonce {
    IncrementingNonce::new()
}

/// Per-stream nonce generator: `base || counter_be64`.
#[derive(Debug, Clone)]
pub struct IncrementingNonce {
    base: [u8; NONCE_BASE_SIZE],
    counter: u64,
}

impl IncrementingNonce {
    pub fn new() -> Self {
        let mut base = [0u8; NONCE_BASE_SIZE];
        base[..8].copy_from_slice(&epoch_nanos_be());
        rand::thread_rng().fill_bytes(&mut base[8..]);
        Self { base, counter: 0 }
    }

    /// Rebuild a sequence from a known base, e.g. the first record of a stream.
    pub fn from_parts(base: [u8; NONCE_BASE_SIZE], counter: u64) -> Self {
        Self { base, counter }
    }

    pub fn base(&self) -> &[u8; NONCE_BASE_SIZE] {
        &self.base
    }

    /// The counter value the next call will emit.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Emit the next nonce and advance the counter.
    ///
    /// Returns `CounterExhausted` once the signed 64-bit range is used up. The
    /// state does not advance on failure, so every later call fails the same way.
    pub fn next_nonce(&mut self) -> CryptoResult<Nonce> {
        if self.counter >= MAX_COUNTER {
            return Err(CryptoError::CounterExhausted);
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..NONCE_BASE_SIZE].copy_from_slice(&self.base);
        nonce[NONCE_BASE_SIZE..].copy_from_slice(&self.counter.to_be_bytes());
        self.counter += 1;
        Ok(nonce)
    }
}

impl Default for IncrementingNonce {
    fn default() -> Self {
        Self::new()
    }
}

fn epoch_nanos_be() -> [u8; 8] {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    nanos.to_be_bytes()
}
