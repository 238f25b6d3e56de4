// Copyright 2024 Orbit project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Thin, hand-written tonic unary client for the control-plane RPC surface. Plays the role that
//! `tonic-build`-generated `*Client` structs normally play, without requiring a `.proto`/`protoc`
//! toolchain step for a schema this small and stable.

use http::uri::PathAndQuery;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::{IntoRequest, Request, Response, Status};
use transport::channel::LayeredChannel;

use crate::proto::*;

#[derive(Clone)]
pub struct GrpcClient {
    inner: Grpc<LayeredChannel>,
}

impl GrpcClient {
    pub fn new(channel: LayeredChannel) -> Self {
        GrpcClient {
            inner: Grpc::new(channel),
        }
    }

    async fn unary<Req, Resp>(
        &mut self,
        request: impl IntoRequest<Req>,
        path: &'static str,
    ) -> Result<Response<Resp>, Status>
    where
        Req: prost::Message + Clone + Send + Sync + 'static,
        Resp: prost::Message + Default + Clone + Send + Sync + 'static,
    {
        self.inner.ready().await.map_err(|err| {
            Status::unavailable(format!("control plane channel not ready: {err}"))
        })?;
        let codec = ProstCodec::default();
        let path = PathAndQuery::from_static(path);
        self.inner.unary(request.into_request(), path, codec).await
    }

    pub async fn function_map(
        &mut self,
        request: Request<FunctionMapRequest>,
    ) -> Result<Response<FunctionMapResponse>, Status> {
        self.unary(request, "/orbit.ControlPlane/FunctionMap").await
    }

    pub async fn put_inputs(
        &mut self,
        request: Request<FunctionPutInputsRequest>,
    ) -> Result<Response<FunctionPutInputsResponse>, Status> {
        self.unary(request, "/orbit.ControlPlane/FunctionPutInputs").await
    }

    pub async fn get_outputs(
        &mut self,
        request: Request<FunctionGetOutputsRequest>,
    ) -> Result<Response<FunctionGetOutputsResponse>, Status> {
        self.unary(request, "/orbit.ControlPlane/FunctionGetOutputs").await
    }

    pub async fn blob_create(
        &mut self,
        request: Request<BlobCreateRequest>,
    ) -> Result<Response<BlobCreateResponse>, Status> {
        self.unary(request, "/orbit.ControlPlane/BlobCreate").await
    }

    pub async fn blob_get(
        &mut self,
        request: Request<BlobGetRequest>,
    ) -> Result<Response<BlobGetResponse>, Status> {
        self.unary(request, "/orbit.ControlPlane/BlobGet").await
    }
}
