//! Chunked stream encryption/decryption over `std::io::Read`
//!
//! Stream format (binary):
//! ```text
//! [record 0][record 1]...[record n-1]
//! record i = [16-byte nonce base][8-byte i, BE][ciphertext][16-byte tag]
//! ```
//!
//! There is no header and no chunk count. Every record except the last holds
//! exactly `chunk_size` plaintext bytes, so the reader must be constructed with
//! the same `chunk_size` the writer used.
//!
//! Both streams are pull-based: a `read` call seals or opens as many whole
//! chunks as it needs to satisfy the caller, buffering the surplus. Once the
//! source is exhausted or any error occurs the stream is terminal and the
//! source is never read again.

use std::io::{self, Read};

use zeroize::Zeroize;

use crate::aead::{open, seal_record};
use crate::envelope::{unwrap_data_key, wrap_data_key};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{DataKey, MasterKey};
use crate::nonce::IncrementingNonce;
use crate::{MAX_CHUNK_SIZE, NONCE_BASE_SIZE, NONCE_SIZE, RECORD_OVERHEAD};

/// Ciphertext length for `plaintext_len` bytes encrypted in chunks of `chunk_size`.
///
/// Fails with `InvalidFormat` for a chunk size the streams would reject, or a
/// length that does not fit in a `u64`.
pub fn ciphertext_len(plaintext_len: u64, chunk_size: usize) -> CryptoResult<u64> {
    check_chunk_size(chunk_size)?;

    plaintext_len
        .div_ceil(chunk_size as u64)
        .checked_mul(RECORD_OVERHEAD as u64)
        .and_then(|overhead| overhead.checked_add(plaintext_len))
        .ok_or_else(|| {
            CryptoError::InvalidFormat(format!(
                "ciphertext length of {plaintext_len} plaintext bytes overflows u64"
            ))
        })
}

/// Encrypting adapter: plaintext source in, chunked ciphertext out.
pub struct EncryptStream<R> {
    source: R,
    master_key: MasterKey,
    data_key: DataKey,
    nonce: IncrementingNonce,
    chunk: Vec<u8>,
    pending: Pending,
    state: StreamState,
}

impl<R: Read> EncryptStream<R> {
    /// Generate a fresh data key and nonce base for a new stream over `source`.
    pub fn new(master_key: &MasterKey, source: R, chunk_size: usize) -> CryptoResult<Self> {
        check_chunk_size(chunk_size)?;

        Ok(Self {
            source,
            master_key: master_key.clone(),
            data_key: DataKey::generate(),
            nonce: IncrementingNonce::new(),
            chunk: vec![0u8; chunk_size],
            pending: Pending::default(),
            state: StreamState::Open,
        })
    }

    /// This stream's data key wrapped under the master key.
    ///
    /// Can be called at any point; each call uses a new random nonce, but every
    /// result unwraps to the same data key.
    pub fn wrapped_data_key(&self) -> CryptoResult<Vec<u8>> {
        wrap_data_key(&self.data_key, &self.master_key)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk.len()
    }

    /// Number of chunks sealed so far.
    pub fn chunks_sealed(&self) -> u64 {
        self.nonce.counter()
    }
}

impl<R: Read> Read for EncryptStream<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let Self {
            source,
            data_key,
            nonce,
            chunk,
            pending,
            state,
            ..
        } = self;

        read_buffered(out, pending, state, |pending| {
            seal_next_chunk(source, chunk, data_key, nonce, pending)
        })
    }
}

impl<R> Drop for EncryptStream<R> {
    fn drop(&mut self) {
        self.chunk.zeroize();
    }
}

/// Decrypting adapter: chunked ciphertext source in, plaintext out.
pub struct DecryptStream<R> {
    source: R,
    data_key: DataKey,
    sequence: Option<IncrementingNonce>,
    record: Vec<u8>,
    pending: Pending,
    state: StreamState,
}

impl<R: Read> DecryptStream<R> {
    /// Unwrap the stream's data key and prepare to read records of
    /// `chunk_size + 40` bytes from `source`.
    ///
    /// Fails with `AuthenticationFailed` if `master_key` did not wrap `wrapped_key`.
    pub fn new(
        master_key: &MasterKey,
        wrapped_key: &[u8],
        source: R,
        chunk_size: usize,
    ) -> CryptoResult<Self> {
        check_chunk_size(chunk_size)?;
        let record_len = chunk_size.checked_add(RECORD_OVERHEAD).ok_or_else(|| {
            CryptoError::InvalidFormat(format!("chunk size {chunk_size} overflows record length"))
        })?;
        let data_key = unwrap_data_key(wrapped_key, master_key)?;

        Ok(Self {
            source,
            data_key,
            sequence: None,
            record: vec![0u8; record_len],
            pending: Pending::default(),
            state: StreamState::Open,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.record.len() - RECORD_OVERHEAD
    }
}

impl<R: Read> Read for DecryptStream<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let Self {
            source,
            data_key,
            sequence,
            record,
            pending,
            state,
        } = self;

        read_buffered(out, pending, state, |pending| {
            open_next_record(source, record, data_key, sequence, pending)
        })
    }
}

impl<R> Drop for DecryptStream<R> {
    fn drop(&mut self) {
        self.pending.data.zeroize();
    }
}

#[derive(Debug)]
enum StreamState {
    Open,
    Exhausted,
    Failed(Latched),
}

/// A terminal failure, replayed to every later `read`.
#[derive(Debug, Clone)]
enum Latched {
    Crypto(CryptoError),
    Source {
        kind: io::ErrorKind,
        message: String,
    },
}

impl Latched {
    fn to_io_error(&self) -> io::Error {
        match self {
            Latched::Crypto(err) => err.clone().into(),
            Latched::Source { kind, message } => io::Error::new(*kind, message.clone()),
        }
    }
}

impl From<CryptoError> for Latched {
    fn from(err: CryptoError) -> Self {
        Latched::Crypto(err)
    }
}

impl From<io::Error> for Latched {
    fn from(err: io::Error) -> Self {
        Latched::Source {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Output produced but not yet handed to the caller.
#[derive(Default)]
struct Pending {
    data: Vec<u8>,
    pos: usize,
}

impl Pending {
    fn len(&self) -> usize {
        self.data.len() - self.pos
    }

    fn push(&mut self, bytes: &[u8]) {
        if self.pos > 0 {
            self.data.drain(..self.pos);
            self.pos = 0;
        }
        self.data.extend_from_slice(bytes);
    }

    fn take_into(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len());
        out[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        if self.pos == self.data.len() {
            self.data.clear();
            self.pos = 0;
        }
        n
    }
}

/// Shared `read` body. `pull` processes one chunk and reports whether the
/// source is now exhausted.
fn read_buffered(
    out: &mut [u8],
    pending: &mut Pending,
    state: &mut StreamState,
    mut pull: impl FnMut(&mut Pending) -> Result<bool, Latched>,
) -> io::Result<usize> {
    if out.is_empty() {
        return Ok(0);
    }

    while pending.len() < out.len() && matches!(state, StreamState::Open) {
        match pull(pending) {
            Ok(true) => *state = StreamState::Exhausted,
            Ok(false) => {}
            Err(latched) => *state = StreamState::Failed(latched),
        }
    }

    if pending.len() > 0 {
        return Ok(pending.take_into(out));
    }

    match state {
        StreamState::Failed(latched) => Err(latched.to_io_error()),
        _ => Ok(0),
    }
}

fn seal_next_chunk<R: Read>(
    source: &mut R,
    chunk: &mut [u8],
    data_key: &DataKey,
    nonce: &mut IncrementingNonce,
    pending: &mut Pending,
) -> Result<bool, Latched> {
    let n = read_full(source, chunk)?;
    if n == 0 {
        return Ok(true);
    }

    let nonce = nonce.next_nonce()?;
    let record = seal_record(&chunk[..n], data_key.as_bytes(), &nonce)?;
    pending.push(&record);

    // read_full only comes up short at end of source
    Ok(n < chunk.len())
}

fn open_next_record<R: Read>(
    source: &mut R,
    record: &mut [u8],
    data_key: &DataKey,
    sequence: &mut Option<IncrementingNonce>,
    pending: &mut Pending,
) -> Result<bool, Latched> {
    let n = read_full(source, record)?;
    if n == 0 {
        return Ok(true);
    }
    if n < RECORD_OVERHEAD {
        return Err(CryptoError::InvalidFormat(format!(
            "truncated chunk record: {n} bytes (minimum {RECORD_OVERHEAD})"
        ))
        .into());
    }

    let (nonce, body) = record[..n].split_at(NONCE_SIZE);
    let mut plaintext = open(body, data_key.as_bytes(), nonce)?;

    let expected = sequence
        .get_or_insert_with(|| {
            let mut base = [0u8; NONCE_BASE_SIZE];
            base.copy_from_slice(&nonce[..NONCE_BASE_SIZE]);
            IncrementingNonce::from_parts(base, 0)
        })
        .next_nonce()?;
    if expected[..] != *nonce {
        plaintext.zeroize();
        return Err(CryptoError::InvalidFormat("chunk record out of sequence".into()).into());
    }

    pending.push(&plaintext);
    plaintext.zeroize();

    Ok(n < record.len())
}

/// Fill `buf` from `source`, stopping early only at end of source.
fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn check_chunk_size(chunk_size: usize) -> CryptoResult<()> {
    if chunk_size == 0 {
        return Err(CryptoError::InvalidFormat("chunk size must be non-zero".into()));
    }
    if chunk_size > MAX_CHUNK_SIZE {
        return Err(CryptoError::InvalidFormat(format!(
            "chunk size {chunk_size} exceeds the maximum of {MAX_CHUNK_SIZE} bytes"
        )));
    }
    Ok(())
}
