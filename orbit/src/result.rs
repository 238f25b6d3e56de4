// Copyright 2024 Orbit project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Result decoder: turns a `GenericResult` envelope into either the decoded success value or one
//! of the failure `Error` variants.

use control_plane::proto::{GenericResult, GenericResultStatus, ResultData};
use control_plane::ControlPlane;
use serde::de::DeserializeOwned;

use crate::error::{Error, RemoteException};

async fn resolve_data(
    http: &reqwest::Client,
    control_plane: &dyn ControlPlane,
    result: &GenericResult,
) -> Result<Vec<u8>, Error> {
    match &result.data {
        Some(ResultData::DataBlobId(blob_id)) => {
            Ok(blob::blob_download(http, control_plane, blob_id).await?.to_vec())
        }
        Some(ResultData::Data(bytes)) => Ok(bytes.clone()),
        None => Ok(Vec::new()),
    }
}

/// Decode `result` into a `T`, fetching the payload from the blob side-channel first if needed.
pub async fn process_result<T: DeserializeOwned>(
    http: &reqwest::Client,
    control_plane: &dyn ControlPlane,
    result: GenericResult,
) -> Result<T, Error> {
    let data = resolve_data(http, control_plane, &result).await?;

    if result.status == GenericResultStatus::Success as i32 {
        return codec::decode(&data)
            .map_err(|err| Error::Execution(format!("failed to deserialize result: {err}")));
    }

    if !data.is_empty() {
        return match codec::decode::<RemoteException>(&data) {
            Ok(exc) if exc.is_exception => Err(Error::RemoteException(exc)),
            Ok(exc) => Err(Error::Execution(format!(
                "Got remote exception of incorrect type {}",
                exc.kind
            ))),
            Err(deser_err) => Err(Error::Execution(format!(
                "Could not deserialize remote exception due to local error: {}\n\
                 This can happen if your local environment does not have the remote exception \
                 definitions.\nHere is the remote traceback:\n{}",
                deser_err,
                result.traceback.as_deref().unwrap_or("<no traceback>")
            ))),
        };
    }

    Err(Error::Remote(result.exception.unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use control_plane::proto::GeneratorStatus;
    use testutil::MockControlPlane;

    fn success_result(data: Vec<u8>) -> GenericResult {
        GenericResult {
            status: GenericResultStatus::Success as i32,
            gen_status: GeneratorStatus::None as i32,
            data: Some(ResultData::Data(data)),
            exception: None,
            traceback: None,
        }
    }

    fn failure_result(data: Option<Vec<u8>>, exception: Option<String>) -> GenericResult {
        GenericResult {
            status: GenericResultStatus::Failure as i32,
            gen_status: GeneratorStatus::None as i32,
            data: data.map(ResultData::Data),
            exception,
            traceback: Some("Traceback (most recent call last): ...".to_string()),
        }
    }

    #[tokio::test]
    async fn decodes_a_successful_inline_result() {
        let http = reqwest::Client::new();
        let control_plane = MockControlPlane::new();
        let data = codec::encode(&42_i64).unwrap();
        let value: i64 = process_result(&http, &control_plane, success_result(data)).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn propagates_a_decoded_remote_exception() {
        let http = reqwest::Client::new();
        let control_plane = MockControlPlane::new();
        let exc = RemoteException {
            is_exception: true,
            kind: "ValueError".to_string(),
            message: "Failure!".to_string(),
        };
        let data = codec::encode(&exc).unwrap();
        let err = process_result::<i64>(&http, &control_plane, failure_result(Some(data), None))
            .await
            .unwrap_err();
        match err {
            Error::RemoteException(got) => assert_eq!(got.message, "Failure!"),
            other => panic!("expected RemoteException, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reports_remote_error_when_no_payload_present() {
        let http = reqwest::Client::new();
        let control_plane = MockControlPlane::new();
        let err = process_result::<i64>(
            &http,
            &control_plane,
            failure_result(None, Some("boom".to_string())),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Remote(msg) if msg == "boom"));
    }

    #[tokio::test]
    async fn reports_execution_error_when_payload_is_not_deserializable() {
        let http = reqwest::Client::new();
        let control_plane = MockControlPlane::new();
        let err = process_result::<i64>(&http, &control_plane, failure_result(Some(vec![0xff, 0x00]), None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
    }

    #[tokio::test]
    async fn reports_execution_error_when_payload_is_not_exception_shaped() {
        let http = reqwest::Client::new();
        let control_plane = MockControlPlane::new();
        let exc = RemoteException {
            is_exception: false,
            kind: "NotAnException".to_string(),
            message: "whatever".to_string(),
        };
        let data = codec::encode(&exc).unwrap();
        let err = process_result::<i64>(&http, &control_plane, failure_result(Some(data), None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Execution(msg) if msg.contains("incorrect type")));
    }
}
