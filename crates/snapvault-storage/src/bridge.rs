//! Blocking `Read` pipelines against async OpenDAL objects
//!
//! The crypto streams are synchronous and pull-based. Objects are exposed to
//! them through `SyncIoBridge`, and the copy loop runs under `spawn_blocking`
//! so the runtime's worker threads never block.

use opendal::Operator;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tokio_util::compat::{FuturesAsyncReadCompatExt, FuturesAsyncWriteCompatExt};
use tokio_util::io::SyncIoBridge;

use snapvault_core::{SnapvaultError, SnapvaultResult};
use snapvault_crypto::CryptoError;

/// Progress callback: cumulative plaintext bytes processed.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// A blocking reader over the whole of `path`.
pub(crate) async fn object_reader(
    op: &Operator,
    path: &str,
) -> SnapvaultResult<impl Read + Send + 'static> {
    let reader = op
        .reader(path)
        .await?
        .into_futures_async_read(..)
        .await?
        .compat();
    Ok(SyncIoBridge::new(reader))
}

/// Stream `source` into a new object at `path`. Returns the bytes written.
///
/// The object only becomes visible once the whole source has been copied; on
/// error the pending write is dropped.
pub(crate) async fn write_object<R>(
    op: &Operator,
    path: &str,
    mut source: R,
) -> SnapvaultResult<u64>
where
    R: Read + Send + 'static,
{
    let writer = op
        .writer(path)
        .await?
        .into_futures_async_write()
        .compat_write();
    let mut sink = SyncIoBridge::new(writer);

    tokio::task::spawn_blocking(move || -> SnapvaultResult<u64> {
        let written = io::copy(&mut source, &mut sink).map_err(stream_error)?;
        sink.shutdown()?;
        Ok(written)
    })
    .await
    .map_err(join_error)?
}

/// Drain `source` into `dest` on a blocking thread, handing `dest` back.
pub(crate) async fn copy_to<R, W>(mut source: R, mut dest: W) -> SnapvaultResult<(u64, W)>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    tokio::task::spawn_blocking(move || -> SnapvaultResult<(u64, W)> {
        let copied = io::copy(&mut source, &mut dest).map_err(stream_error)?;
        dest.flush()?;
        Ok((copied, dest))
    })
    .await
    .map_err(join_error)?
}

/// Recover a `CryptoError` carried inside an I/O error from the crypto streams.
pub(crate) fn stream_error(err: io::Error) -> SnapvaultError {
    let crypto = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<CryptoError>())
        .cloned();
    match crypto {
        Some(crypto) => SnapvaultError::Crypto(crypto),
        None => SnapvaultError::Io(err),
    }
}

fn join_error(err: tokio::task::JoinError) -> SnapvaultError {
    SnapvaultError::Other(anyhow::anyhow!("stream task failed: {err}"))
}

/// Counts bytes pulled through it and reports them to a [`ProgressFn`].
pub(crate) struct ProgressReader<R> {
    inner: R,
    total: u64,
    progress: Option<ProgressFn>,
}

impl<R> ProgressReader<R> {
    pub(crate) fn new(inner: R, progress: Option<ProgressFn>) -> Self {
        Self {
            inner,
            total: 0,
            progress,
        }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.total += n as u64;
        if let (Some(cb), true) = (&self.progress, n > 0) {
            cb(self.total);
        }
        Ok(n)
    }
}
