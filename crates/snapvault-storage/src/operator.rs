//! OpenDAL Operator for the backup bucket

use opendal::layers::{LoggingLayer, RetryLayer, TimeoutLayer};
use opendal::Operator;
use secrecy::ExposeSecret;
use std::time::Duration;

use snapvault_core::config::StorageConfig;
use snapvault_core::credentials::S3Credentials;
use snapvault_core::{SnapvaultError, SnapvaultResult};

/// Build the S3 operator backups are read from and written to.
///
/// Path-style addressing (the opendal default) keeps MinIO and other
/// self-hosted stores working. Every request is logged and retried with
/// jitter; `request_timeout_secs > 0` adds a per-request deadline.
pub fn build_operator(
    storage: &StorageConfig,
    credentials: &S3Credentials,
) -> SnapvaultResult<Operator> {
    check_transport(storage)?;

    let mut s3 = opendal::services::S3::default()
        .endpoint(&storage.endpoint)
        .region(&storage.region)
        .bucket(&storage.bucket)
        .access_key_id(&credentials.access_key_id)
        .secret_access_key(credentials.secret_access_key.expose_secret());
    if let Some(root) = storage.root.as_deref() {
        s3 = s3.root(root);
    }

    let op = Operator::new(s3)?
        .layer(LoggingLayer::default())
        .layer(RetryLayer::new().with_max_times(5).with_jitter())
        .finish();

    Ok(match request_timeout(storage) {
        Some(timeout) => op.layer(TimeoutLayer::new().with_timeout(timeout)),
        None => op,
    })
}

/// Plain HTTP is refused under `enforce_tls`, tolerated with a warning otherwise.
fn check_transport(storage: &StorageConfig) -> SnapvaultResult<()> {
    if !storage.endpoint.starts_with("http://") {
        return Ok(());
    }
    if storage.enforce_tls {
        return Err(SnapvaultError::Config(format!(
            "storage endpoint {} is plain HTTP and storage.enforce_tls is set; \
             switch to https:// or disable enforce_tls for local testing",
            storage.endpoint
        )));
    }

    tracing::warn!(
        endpoint = %storage.endpoint,
        "storage endpoint is plain HTTP; credentials and backup objects are sent in the clear"
    );
    Ok(())
}

fn request_timeout(storage: &StorageConfig) -> Option<Duration> {
    (storage.request_timeout_secs > 0).then(|| Duration::from_secs(storage.request_timeout_secs))
}
