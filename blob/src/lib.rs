// Copyright 2024 Orbit project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The blob side-channel: out-of-band storage for payloads too large to inline on the wire. Both
//! directions go through the control plane to mint a presigned transfer URL, then perform the
//! actual byte transfer directly against that URL.

use std::fmt;

use bytes::Bytes;
use control_plane::ControlPlane;

/// Payloads serialized to more than this many bytes are routed through the blob side-channel
/// instead of being inlined on an `Input`/`GenericResult`.
pub const MAX_OBJECT_SIZE_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug)]
pub enum BlobError {
    /// The control-plane RPC that mints/resolves the transfer URL failed.
    ControlPlane(tonic::Status),
    /// The HTTP transfer itself failed.
    Transfer(reqwest::Error),
}

impl fmt::Display for BlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobError::ControlPlane(status) => write!(f, "control plane error: {status}"),
            BlobError::Transfer(err) => write!(f, "blob transfer error: {err}"),
        }
    }
}

impl std::error::Error for BlobError {}

impl From<tonic::Status> for BlobError {
    fn from(status: tonic::Status) -> Self {
        BlobError::ControlPlane(status)
    }
}

impl From<reqwest::Error> for BlobError {
    fn from(err: reqwest::Error) -> Self {
        BlobError::Transfer(err)
    }
}

/// Upload `bytes` out-of-band and return the blob id the control plane will recognize on a
/// subsequent `Input.args_blob_id` or `GenericResult.data_blob_id`.
pub async fn blob_upload(
    http: &reqwest::Client,
    control_plane: &dyn ControlPlane,
    bytes: Bytes,
) -> Result<String, BlobError> {
    let (blob_id, upload_url) = control_plane.blob_create(bytes.len() as u64).await?;
    log::debug!("uploading {} byte blob as {}", bytes.len(), blob_id);
    http.put(upload_url).body(bytes).send().await?.error_for_status()?;
    Ok(blob_id)
}

/// Download the bytes referenced by `blob_id`.
pub async fn blob_download(
    http: &reqwest::Client,
    control_plane: &dyn ControlPlane,
    blob_id: &str,
) -> Result<Bytes, BlobError> {
    let download_url = control_plane.blob_get(blob_id).await?;
    log::debug!("downloading blob {}", blob_id);
    let bytes = http.get(download_url).send().await?.error_for_status()?.bytes().await?;
    Ok(bytes)
}
