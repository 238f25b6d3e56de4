// Copyright 2024 Orbit project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Single-call invocation lifecycle: allocate a call id, submit one input, and poll outputs
//! until a result (or a generator stream of results) arrives.

use std::time::{Duration, Instant};

use async_stream::stream;
use control_plane::proto::{GeneratorStatus, GenericResult};
use control_plane::ControlPlane;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use transport::RetryPolicy;

use crate::app::AppHandle;
use crate::error::Error;
use crate::input::encode_input;
use crate::result::process_result;
use crate::retry;

/// Maximum single `FunctionGetOutputs` poll advertised to the server, regardless of the caller's
/// overall deadline.
pub const BACKEND_POLL_MAX: Duration = Duration::from_secs(60);

/// A single in-flight call: owns the call id and the output poll cursor.
pub struct Invocation {
    app: AppHandle,
    function_id: String,
    call_id: String,
}

impl Invocation {
    /// Allocate a call id and submit one input. `FunctionMap` uses the default retry policy;
    /// `PutInputs` retries indefinitely, including on `RESOURCE_EXHAUSTED` backpressure.
    pub async fn create<A, K>(app: &AppHandle, function_id: &str, args: &A, kwargs: &K) -> Result<Invocation, Error>
    where
        A: Serialize,
        K: Serialize,
    {
        let default_policy = RetryPolicy::default_policy();
        let call_id = retry::call(&default_policy, || app.control_plane().function_map(function_id)).await?;
        let input = encode_input(app.http(), app.control_plane(), args, kwargs, None).await?;

        let put_inputs_policy = RetryPolicy::unlimited_with_backpressure();
        let inputs = vec![input];
        retry::call(&put_inputs_policy, || {
            app.control_plane().put_inputs(function_id, &call_id, inputs.clone())
        })
        .await?;

        Ok(Invocation {
            app: app.clone(),
            function_id: function_id.to_string(),
            call_id,
        })
    }

    /// Detach this invocation into a [`FunctionCall`] handle that can be polled later, possibly
    /// from a different task.
    pub fn into_call(self) -> FunctionCall {
        FunctionCall {
            app: self.app,
            function_id: self.function_id,
            call_id: self.call_id,
        }
    }

    /// Lazily poll for outputs. With `timeout = None`, polls forever until at least one output is
    /// observed. With `timeout = Some(_)`, re-polls (server timeout capped at
    /// [`BACKEND_POLL_MAX`]) until an output arrives or the deadline elapses; if `timeout` is
    /// zero, exactly one poll is still performed before giving up.
    pub fn get_items(&self, timeout: Option<Duration>) -> impl Stream<Item = Result<GenericResult, Error>> + '_ {
        stream! {
            let start = Instant::now();
            let mut first_iteration = true;
            loop {
                let backend_timeout = match timeout {
                    None => BACKEND_POLL_MAX,
                    Some(total) => {
                        if !first_iteration && Instant::now().saturating_duration_since(start) >= total {
                            return;
                        }
                        let remaining = total.saturating_sub(Instant::now().saturating_duration_since(start));
                        remaining.min(BACKEND_POLL_MAX)
                    }
                };
                first_iteration = false;

                let get_outputs_policy = RetryPolicy::unlimited_no_delay();
                match retry::call(&get_outputs_policy, || {
                    self.app.control_plane().get_outputs(&self.call_id, backend_timeout, true)
                })
                .await
                {
                    Ok(outputs) if !outputs.is_empty() => {
                        for item in outputs {
                            if let Some(result) = item.result {
                                yield Ok(result);
                            }
                        }
                        return;
                    }
                    Ok(_) => continue,
                    Err(status) => {
                        yield Err(Error::from(status));
                        return;
                    }
                }
            }
        }
    }

    /// Consume `get_items(None)`, assert the result isn't a generator item, and decode it.
    pub async fn run_function<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let items = self.get_items(None);
        futures::pin_mut!(items);
        match items.next().await {
            Some(Ok(result)) => {
                assert_eq!(
                    result.gen_status,
                    GeneratorStatus::None as i32,
                    "run_function received a generator item; use run_generator instead"
                );
                process_result(self.app.http(), self.app.control_plane(), result).await
            }
            Some(Err(err)) => Err(err),
            None => Err(Error::Remote("no output received".to_string())),
        }
    }

    /// Consume `get_items(timeout)`; fail with [`Error::Timeout`] if nothing arrives in time.
    pub async fn poll_function<T: DeserializeOwned>(&self, timeout: Duration) -> Result<T, Error> {
        let items = self.get_items(Some(timeout));
        futures::pin_mut!(items);
        match items.next().await {
            Some(Ok(result)) => process_result(self.app.http(), self.app.control_plane(), result).await,
            Some(Err(err)) => Err(err),
            None => Err(Error::Timeout),
        }
    }

    /// Repeatedly polls for outputs, decoding and yielding every item until one arrives with
    /// `gen_status == COMPLETE`.
    pub fn run_generator<T: DeserializeOwned + 'static>(&self) -> impl Stream<Item = Result<T, Error>> + '_ {
        stream! {
            loop {
                let items = self.get_items(None);
                futures::pin_mut!(items);
                let mut done = false;
                while let Some(item) = items.next().await {
                    match item {
                        Ok(result) => {
                            if result.gen_status == GeneratorStatus::Complete as i32 {
                                done = true;
                                break;
                            }
                            yield process_result(self.app.http(), self.app.control_plane(), result).await;
                        }
                        Err(err) => {
                            yield Err(err);
                            done = true;
                            break;
                        }
                    }
                }
                if done {
                    return;
                }
            }
        }
    }
}

/// A detached handle to an in-flight call, returned by [`submit`]. Holds no local buffer; the
/// result is fetched by re-opening an [`Invocation`] over the same call id.
#[derive(Clone)]
pub struct FunctionCall {
    app: AppHandle,
    function_id: String,
    call_id: String,
}

impl FunctionCall {
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Poll for the result with a deadline, delegating to [`Invocation::poll_function`].
    pub async fn get<T: DeserializeOwned>(&self, timeout: Duration) -> Result<T, Error> {
        let invocation = Invocation {
            app: self.app.clone(),
            function_id: self.function_id.clone(),
            call_id: self.call_id.clone(),
        };
        invocation.poll_function(timeout).await
    }
}

/// Fire-and-forget variant of [`Invocation::create`]: submits the call and hands back a detached
/// [`FunctionCall`] rather than keeping the `Invocation` around.
pub async fn submit<A, K>(app: &AppHandle, function_id: &str, args: &A, kwargs: &K) -> Result<FunctionCall, Error>
where
    A: Serialize,
    K: Serialize,
{
    let invocation = Invocation::create(app, function_id, args, kwargs).await?;
    Ok(invocation.into_call())
}

#[cfg(test)]
mod tests {
    use super::*;
    use control_plane::proto::{GenericResultStatus, OutputItem, ResultData};
    use std::sync::Arc;
    use testutil::MockControlPlane;

    fn success_output(idx: u64, value: i64) -> OutputItem {
        OutputItem {
            idx,
            result: Some(GenericResult {
                status: GenericResultStatus::Success as i32,
                gen_status: GeneratorStatus::None as i32,
                data: Some(ResultData::Data(codec::encode(&value).unwrap())),
                exception: None,
                traceback: None,
            }),
        }
    }

    fn generator_item(idx: u64, value: i64) -> OutputItem {
        OutputItem {
            idx,
            result: Some(GenericResult {
                status: GenericResultStatus::Success as i32,
                gen_status: GeneratorStatus::None as i32,
                data: Some(ResultData::Data(codec::encode(&value).unwrap())),
                exception: None,
                traceback: None,
            }),
        }
    }

    fn generator_complete(idx: u64) -> OutputItem {
        OutputItem {
            idx,
            result: Some(GenericResult {
                status: GenericResultStatus::Success as i32,
                gen_status: GeneratorStatus::Complete as i32,
                data: None,
                exception: None,
                traceback: None,
            }),
        }
    }

    fn app_with(control_plane: MockControlPlane) -> AppHandle {
        let control_plane: Arc<dyn control_plane::ControlPlane> = Arc::new(control_plane);
        AppHandle::new(control_plane, "ap-test")
    }

    #[tokio::test]
    async fn create_allocates_a_call_and_submits_one_input() {
        let mock = MockControlPlane::new();
        mock.push_output_batch(vec![success_output(0, 9)]);
        let app = app_with(mock);

        let invocation = Invocation::create(&app, "fn-double", &(3_i64,), &()).await.unwrap();
        let value: i64 = invocation.run_function().await.unwrap();
        assert_eq!(value, 9);
    }

    #[tokio::test]
    async fn run_function_waits_through_empty_long_polls() {
        let mock = MockControlPlane::new();
        mock.push_output_batch(vec![]);
        mock.push_output_batch(vec![]);
        mock.push_output_batch(vec![success_output(0, 5)]);
        let app = app_with(mock);

        let invocation = Invocation::create(&app, "fn-id", &(), &()).await.unwrap();
        let value: i64 = invocation.run_function().await.unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn poll_function_times_out_when_nothing_arrives() {
        let mock = MockControlPlane::new();
        mock.push_output_batch(vec![]);
        let app = app_with(mock);

        let invocation = Invocation::create(&app, "fn-id", &(), &()).await.unwrap();
        let err = invocation.poll_function::<i64>(Duration::from_secs(0)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test]
    async fn submit_then_get_resolves_the_same_call() {
        let mock = MockControlPlane::new();
        mock.push_output_batch(vec![success_output(0, 77)]);
        let app = app_with(mock);

        let call = submit(&app, "fn-id", &(), &()).await.unwrap();
        let value: i64 = call.get(Duration::from_secs(5)).await.unwrap();
        assert_eq!(value, 77);
    }

    #[tokio::test]
    async fn run_generator_yields_items_until_complete() {
        let mock = MockControlPlane::new();
        mock.push_output_batch(vec![generator_item(0, 1), generator_item(0, 2)]);
        mock.push_output_batch(vec![generator_complete(0)]);
        let app = app_with(mock);

        let invocation = Invocation::create(&app, "fn-id", &(), &()).await.unwrap();
        let items = invocation.run_generator::<i64>();
        futures::pin_mut!(items);
        let mut values = Vec::new();
        while let Some(item) = items.next().await {
            values.push(item.unwrap());
        }
        assert_eq!(values, vec![1, 2]);
    }
}
