// Copyright 2024 Orbit project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The control plane is an external collaborator: this crate only describes the data-plane RPC
//! surface the invocation engine consumes and provides one concrete implementation over gRPC.
//! Callers (the `orbit` crate, and tests via `testutil`) depend on the [`ControlPlane`] trait, not
//! on this crate's gRPC specifics.

pub mod grpc_client;
pub mod proto;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tonic::{Request, Status};
use transport::channel::{self, LayeredChannel};

use grpc_client::GrpcClient;

/// Everything the invocation engine needs from the control plane, decoupled from the wire
/// transport.
#[async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    /// Allocate a fresh call context for `function_id`.
    async fn function_map(&self, function_id: &str) -> Result<String, Status>;

    /// Submit a batch of inputs for `call_id`. Retries indefinitely on transient errors and on
    /// `RESOURCE_EXHAUSTED` (server-side backpressure).
    async fn put_inputs(&self, function_id: &str, call_id: &str, inputs: Vec<proto::Input>) -> Result<(), Status>;

    /// Long-poll for outputs on `call_id`. `timeout` is capped at 60s server-side regardless of
    /// the value passed; `return_empty_on_timeout` makes a timed-out poll return an empty list
    /// rather than an error.
    async fn get_outputs(
        &self,
        call_id: &str,
        timeout: Duration,
        return_empty_on_timeout: bool,
    ) -> Result<Vec<proto::OutputItem>, Status>;

    /// Obtain a presigned upload slot for a blob of `content_length` bytes.
    async fn blob_create(&self, content_length: u64) -> Result<(String, String), Status>;

    /// Obtain a presigned download URL for `blob_id`.
    async fn blob_get(&self, blob_id: &str) -> Result<String, Status>;
}

/// Connection + retry knobs for [`GrpcControlPlane::connect`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub address: String,
    pub headers: BTreeMap<String, String>,
    pub rpc_concurrency_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            address: "http://127.0.0.1:443".to_string(),
            headers: BTreeMap::new(),
            rpc_concurrency_limit: 256,
        }
    }
}

/// gRPC-backed [`ControlPlane`]. Performs one RPC per call with no retry of its own — retry
/// policy is selected by the caller (Invocation/Map call sites) and applied around this trait,
/// not baked into the transport.
#[derive(Clone)]
pub struct GrpcControlPlane {
    client: GrpcClient,
}

impl GrpcControlPlane {
    pub async fn connect(config: ClientConfig) -> Result<Self, String> {
        let mut headers = config.headers;
        let endpoint = channel::create_endpoint(&config.address, &mut headers)?;
        let tonic_channel = endpoint
            .connect()
            .await
            .map_err(|err| format!("failed to connect to control plane at {}: {err}", config.address))?;
        let header_map = channel::headers_to_http_header_map(&headers)?;
        let layered: LayeredChannel = channel::layered_channel(tonic_channel, config.rpc_concurrency_limit, header_map);
        Ok(GrpcControlPlane::from_channel(layered))
    }

    pub fn from_channel(channel: LayeredChannel) -> Self {
        GrpcControlPlane {
            client: GrpcClient::new(channel),
        }
    }
}

#[async_trait]
impl ControlPlane for GrpcControlPlane {
    async fn function_map(&self, function_id: &str) -> Result<String, Status> {
        let request = Request::new(proto::FunctionMapRequest {
            function_id: function_id.to_string(),
        });
        let response = self.client.clone().function_map(request).await?;
        Ok(response.into_inner().call_id)
    }

    async fn put_inputs(&self, function_id: &str, call_id: &str, inputs: Vec<proto::Input>) -> Result<(), Status> {
        let request = Request::new(proto::FunctionPutInputsRequest {
            function_id: function_id.to_string(),
            call_id: call_id.to_string(),
            inputs,
        });
        self.client.clone().put_inputs(request).await?;
        Ok(())
    }

    async fn get_outputs(
        &self,
        call_id: &str,
        timeout: Duration,
        return_empty_on_timeout: bool,
    ) -> Result<Vec<proto::OutputItem>, Status> {
        let request = Request::new(proto::FunctionGetOutputsRequest {
            call_id: call_id.to_string(),
            timeout_secs: timeout.as_secs_f64(),
            return_empty_on_timeout,
        });
        let response = self.client.clone().get_outputs(request).await?;
        Ok(response.into_inner().outputs)
    }

    async fn blob_create(&self, content_length: u64) -> Result<(String, String), Status> {
        let request = Request::new(proto::BlobCreateRequest { content_length });
        let response = self.client.clone().blob_create(request).await?;
        let response = response.into_inner();
        Ok((response.blob_id, response.upload_url))
    }

    async fn blob_get(&self, blob_id: &str) -> Result<String, Status> {
        let request = Request::new(proto::BlobGetRequest {
            blob_id: blob_id.to_string(),
        });
        let response = self.client.clone().blob_get(request).await?;
        Ok(response.into_inner().download_url)
    }
}
