// Copyright 2024 Orbit project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Input encoder: serializes a call's `(args, kwargs)` into an `Input` record, routing to the
//! blob side-channel when the serialized size exceeds [`blob::MAX_OBJECT_SIZE_BYTES`].

use bytes::Bytes;
use control_plane::proto::{Input, InputPayload};
use control_plane::ControlPlane;
use serde::Serialize;

use crate::error::Error;

/// Encode one call's arguments into an [`Input`]. `idx` is `Some` in Map mode, `None` for a
/// single-call `Invocation`.
pub async fn encode_input<A, K>(
    http: &reqwest::Client,
    control_plane: &dyn ControlPlane,
    args: &A,
    kwargs: &K,
    idx: Option<u64>,
) -> Result<Input, Error>
where
    A: Serialize,
    K: Serialize,
{
    let payload_bytes = codec::encode(&(args, kwargs))
        .map_err(|err| Error::Invalid(format!("failed to serialize call arguments: {err}")))?;

    let payload = if payload_bytes.len() > blob::MAX_OBJECT_SIZE_BYTES {
        let blob_id = blob::blob_upload(http, control_plane, Bytes::from(payload_bytes)).await?;
        InputPayload::ArgsBlobId(blob_id)
    } else {
        InputPayload::Args(payload_bytes)
    };

    Ok(Input {
        idx,
        payload: Some(payload),
    })
}
