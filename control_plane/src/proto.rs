// Copyright 2024 Orbit project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Hand-authored wire message types for the control-plane RPC surface. The control plane's
//! full schema is explicitly out of scope for this crate (function registration,
//! image/secret/mount plumbing, ...); these messages cover only the data-plane calls the
//! invocation engine issues. Written directly against `prost::Message` rather than generated from
//! a `.proto` file via `prost-build`/`tonic-build`, since the schema this engine depends on is
//! small and stable.

use prost::{Enumeration, Message, Oneof};

#[derive(Clone, PartialEq, Message)]
pub struct FunctionMapRequest {
    #[prost(string, tag = "1")]
    pub function_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct FunctionMapResponse {
    #[prost(string, tag = "1")]
    pub call_id: String,
}

#[derive(Clone, PartialEq, Oneof)]
pub enum InputPayload {
    #[prost(bytes, tag = "2")]
    Args(Vec<u8>),
    #[prost(string, tag = "3")]
    ArgsBlobId(String),
}

#[derive(Clone, PartialEq, Message)]
pub struct Input {
    /// 0-based and dense within a Map; unset in single-call mode.
    #[prost(uint64, optional, tag = "1")]
    pub idx: Option<u64>,
    #[prost(oneof = "InputPayload", tags = "2, 3")]
    pub payload: Option<InputPayload>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FunctionPutInputsRequest {
    #[prost(string, tag = "1")]
    pub function_id: String,
    #[prost(string, tag = "2")]
    pub call_id: String,
    #[prost(message, repeated, tag = "3")]
    pub inputs: Vec<Input>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FunctionPutInputsResponse {}

#[derive(Clone, PartialEq, Message)]
pub struct FunctionGetOutputsRequest {
    #[prost(string, tag = "1")]
    pub call_id: String,
    #[prost(double, tag = "2")]
    pub timeout_secs: f64,
    #[prost(bool, tag = "3")]
    pub return_empty_on_timeout: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Enumeration)]
#[repr(i32)]
pub enum GenericResultStatus {
    Unspecified = 0,
    Success = 1,
    Failure = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Enumeration)]
#[repr(i32)]
pub enum GeneratorStatus {
    None = 0,
    Complete = 1,
}

#[derive(Clone, PartialEq, Oneof)]
pub enum ResultData {
    #[prost(bytes, tag = "3")]
    Data(Vec<u8>),
    #[prost(string, tag = "4")]
    DataBlobId(String),
}

#[derive(Clone, PartialEq, Message)]
pub struct GenericResult {
    #[prost(enumeration = "GenericResultStatus", tag = "1")]
    pub status: i32,
    #[prost(enumeration = "GeneratorStatus", tag = "2")]
    pub gen_status: i32,
    #[prost(oneof = "ResultData", tags = "3, 4")]
    pub data: Option<ResultData>,
    #[prost(string, optional, tag = "5")]
    pub exception: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub traceback: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OutputItem {
    #[prost(uint64, tag = "1")]
    pub idx: u64,
    #[prost(message, tag = "2")]
    pub result: Option<GenericResult>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FunctionGetOutputsResponse {
    #[prost(message, repeated, tag = "1")]
    pub outputs: Vec<OutputItem>,
}

#[derive(Clone, PartialEq, Message)]
pub struct BlobCreateRequest {
    #[prost(uint64, tag = "1")]
    pub content_length: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct BlobCreateResponse {
    #[prost(string, tag = "1")]
    pub blob_id: String,
    #[prost(string, tag = "2")]
    pub upload_url: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct BlobGetRequest {
    #[prost(string, tag = "1")]
    pub blob_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct BlobGetResponse {
    #[prost(string, tag = "1")]
    pub download_url: String,
}
