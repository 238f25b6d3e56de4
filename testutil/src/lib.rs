// Copyright 2024 Orbit project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! In-process mock of the [`ControlPlane`] trait, implemented directly rather than as a real gRPC
//! server (the `TestProvider`/`AlwaysErrorProvider` pattern used for `ByteStoreProvider` elsewhere
//! in this codebase — the transport boundary here is already a trait, so standing up an actual
//! server per test adds nothing). Lets the invocation engine's seed scenarios be driven
//! deterministically.

use std::collections::VecDeque;

use async_trait::async_trait;
use control_plane::proto::{Input, OutputItem};
use control_plane::ControlPlane;
use parking_lot::Mutex;
use tonic::{Code, Status};

#[derive(Default)]
struct State {
    next_call_id: u64,
    function_map_calls: u32,
    put_inputs_batches: Vec<Vec<Input>>,
    resource_exhausted_countdown: u32,
    put_inputs_failure: Option<(Code, String)>,
    output_batches: VecDeque<Vec<OutputItem>>,
    blob_base_url: Option<String>,
    next_blob_id: u64,
}

/// Scriptable stand-in for the control plane. Configure expected behavior with the `with_*`
/// builders and `push_*`/`set_*` methods before handing a `&MockControlPlane` to the code under
/// test, then inspect the recorded calls afterwards.
pub struct MockControlPlane {
    state: Mutex<State>,
}

impl MockControlPlane {
    pub fn new() -> Self {
        MockControlPlane {
            state: Mutex::new(State::default()),
        }
    }

    /// Point blob uploads/downloads at a real HTTP server (e.g. a `wiremock` instance) instead of
    /// the placeholder URLs used when no blob transfer is actually exercised.
    pub fn with_blob_base_url(base_url: impl Into<String>) -> Self {
        let mock = MockControlPlane::new();
        mock.state.lock().blob_base_url = Some(base_url.into());
        mock
    }

    /// Queue one `FunctionGetOutputs` response. An empty `Vec` simulates a long-poll that timed
    /// out with `return_empty_on_timeout = true`. Responses are served FIFO; once the queue is
    /// drained, further polls return an empty list forever (matching an indefinitely quiet call).
    pub fn push_output_batch(&self, batch: Vec<OutputItem>) {
        self.state.lock().output_batches.push_back(batch);
    }

    /// Make the next `n` `PutInputs` calls fail with `RESOURCE_EXHAUSTED` before succeeding.
    pub fn set_resource_exhausted_failures(&self, n: u32) {
        self.state.lock().resource_exhausted_countdown = n;
    }

    /// Make every subsequent `PutInputs` call fail permanently with `code`/`message`, e.g. to
    /// exercise a non-transient, non-retryable failure (unlike `set_resource_exhausted_failures`,
    /// which models transient backpressure that eventually clears).
    pub fn set_put_inputs_failure(&self, code: Code, message: impl Into<String>) {
        self.state.lock().put_inputs_failure = Some((code, message.into()));
    }

    pub fn function_map_call_count(&self) -> u32 {
        self.state.lock().function_map_calls
    }

    pub fn put_inputs_batches(&self) -> Vec<Vec<Input>> {
        self.state.lock().put_inputs_batches.clone()
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn function_map(&self, _function_id: &str) -> Result<String, Status> {
        let mut state = self.state.lock();
        state.function_map_calls += 1;
        let call_id = format!("ca-{}", state.next_call_id);
        state.next_call_id += 1;
        Ok(call_id)
    }

    async fn put_inputs(&self, _function_id: &str, _call_id: &str, inputs: Vec<Input>) -> Result<(), Status> {
        let mut state = self.state.lock();
        if let Some((code, message)) = state.put_inputs_failure.clone() {
            return Err(Status::new(code, message));
        }
        if state.resource_exhausted_countdown > 0 {
            state.resource_exhausted_countdown -= 1;
            return Err(Status::new(Code::ResourceExhausted, "backpressure"));
        }
        state.put_inputs_batches.push(inputs);
        Ok(())
    }

    async fn get_outputs(
        &self,
        _call_id: &str,
        _timeout: std::time::Duration,
        _return_empty_on_timeout: bool,
    ) -> Result<Vec<OutputItem>, Status> {
        let mut state = self.state.lock();
        Ok(state.output_batches.pop_front().unwrap_or_default())
    }

    async fn blob_create(&self, _content_length: u64) -> Result<(String, String), Status> {
        let mut state = self.state.lock();
        let blob_id = format!("blob-{}", state.next_blob_id);
        state.next_blob_id += 1;
        let base = state
            .blob_base_url
            .clone()
            .unwrap_or_else(|| "http://unused.invalid".to_string());
        Ok((blob_id.clone(), format!("{base}/blobs/{blob_id}")))
    }

    async fn blob_get(&self, blob_id: &str) -> Result<String, Status> {
        let state = self.state.lock();
        let base = state
            .blob_base_url
            .clone()
            .unwrap_or_else(|| "http://unused.invalid".to_string());
        Ok(format!("{base}/blobs/{blob_id}"))
    }
}

/// A control plane that fails every call, for exercising error propagation paths.
pub struct AlwaysErrorControlPlane {
    pub code: Code,
    pub message: String,
}

impl AlwaysErrorControlPlane {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        AlwaysErrorControlPlane {
            code,
            message: message.into(),
        }
    }

    fn status(&self) -> Status {
        Status::new(self.code, self.message.clone())
    }
}

#[async_trait]
impl ControlPlane for AlwaysErrorControlPlane {
    async fn function_map(&self, _function_id: &str) -> Result<String, Status> {
        Err(self.status())
    }

    async fn put_inputs(&self, _function_id: &str, _call_id: &str, _inputs: Vec<Input>) -> Result<(), Status> {
        Err(self.status())
    }

    async fn get_outputs(
        &self,
        _call_id: &str,
        _timeout: std::time::Duration,
        _return_empty_on_timeout: bool,
    ) -> Result<Vec<OutputItem>, Status> {
        Err(self.status())
    }

    async fn blob_create(&self, _content_length: u64) -> Result<(String, String), Status> {
        Err(self.status())
    }

    async fn blob_get(&self, _blob_id: &str) -> Result<String, Status> {
        Err(self.status())
    }
}
