// Copyright 2024 Orbit project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Parallel fan-out: three cooperating tasks (drain, pump, poll) share a call id and a set of
//! counters to submit a stream of inputs and reassemble their outputs, in input order for
//! ordinary functions and in arrival order for generators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use control_plane::proto::{GeneratorStatus, Input};
use control_plane::ControlPlane;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use transport::RetryPolicy;

use crate::app::AppHandle;
use crate::error::Error;
use crate::input::encode_input;
use crate::invocation::BACKEND_POLL_MAX;
use crate::result::process_result;
use crate::retry;

/// Maximum number of inputs per `PutInputs` batch.
pub const MAP_INVOCATION_CHUNK_SIZE: usize = 100;

struct Shared {
    num_inputs: AtomicU64,
    have_all_inputs: AtomicBool,
    num_outputs: AtomicU64,
    /// Set by drain/pump on a surfaced error so poll stops waiting for a termination condition
    /// (`num_outputs == num_inputs`) that an abandoned input can never satisfy.
    aborted: AtomicBool,
}

/// Submit `inputs` (already zipped into per-call argument tuples) against `function_id` and
/// stream back decoded results. `is_generator` switches between index-ordered reassembly
/// (ordinary functions) and arrival-order flat-map delivery (generators).
pub async fn starmap<T, A, K, S>(
    app: &AppHandle,
    function_id: &str,
    kwargs: K,
    inputs: S,
    is_generator: bool,
) -> Result<impl Stream<Item = Result<T, Error>>, Error>
where
    T: DeserializeOwned + Send + 'static,
    A: Serialize + Send + 'static,
    K: Serialize + Clone + Send + 'static,
    S: Stream<Item = A> + Send + Unpin + 'static,
{
    let output_rx = run_map(app.clone(), function_id.to_string(), kwargs, inputs, is_generator).await?;
    Ok(ReceiverStream::new(output_rx))
}

/// Convenience wrapper over [`starmap`] for a function of one positional argument.
pub async fn map<T, A, K, S>(
    app: &AppHandle,
    function_id: &str,
    kwargs: K,
    args: S,
    is_generator: bool,
) -> Result<impl Stream<Item = Result<T, Error>>, Error>
where
    T: DeserializeOwned + Send + 'static,
    A: Serialize + Send + 'static,
    K: Serialize + Clone + Send + 'static,
    S: Stream<Item = A> + Send + Unpin + 'static,
{
    starmap(app, function_id, kwargs, args.map(|a| (a,)), is_generator).await
}

/// Convenience wrapper over [`starmap`] for a function of two positional arguments, zipping the
/// two per-argument streams the way the source's `map` does for arbitrary arity. Rust's type
/// system makes a variadic zip awkward, so each arity gets its own thin wrapper over the same
/// `starmap` primitive rather than one generic `map`.
pub async fn map2<T, A1, A2, K, S1, S2>(
    app: &AppHandle,
    function_id: &str,
    kwargs: K,
    args1: S1,
    args2: S2,
    is_generator: bool,
) -> Result<impl Stream<Item = Result<T, Error>>, Error>
where
    T: DeserializeOwned + Send + 'static,
    A1: Serialize + Send + 'static,
    A2: Serialize + Send + 'static,
    K: Serialize + Clone + Send + 'static,
    S1: Stream<Item = A1> + Send + Unpin + 'static,
    S2: Stream<Item = A2> + Send + Unpin + 'static,
{
    starmap(app, function_id, kwargs, args1.zip(args2), is_generator).await
}

/// Drains the output stream of a non-generator [`map`] call for side effects only.
pub async fn for_each<T, A, K, S>(app: &AppHandle, function_id: &str, kwargs: K, args: S) -> Result<(), Error>
where
    T: DeserializeOwned + Send + 'static,
    A: Serialize + Send + 'static,
    K: Serialize + Clone + Send + 'static,
    S: Stream<Item = A> + Send + Unpin + 'static,
{
    let stream = map::<T, A, K, S>(app, function_id, kwargs, args, false).await?;
    futures::pin_mut!(stream);
    while let Some(item) = stream.next().await {
        item?;
    }
    Ok(())
}

async fn run_map<T, A, K, S>(
    app: AppHandle,
    function_id: String,
    kwargs: K,
    inputs: S,
    is_generator: bool,
) -> Result<mpsc::Receiver<Result<T, Error>>, Error>
where
    T: DeserializeOwned + Send + 'static,
    A: Serialize + Send + 'static,
    K: Serialize + Clone + Send + 'static,
    S: Stream<Item = A> + Send + Unpin + 'static,
{
    let default_policy = RetryPolicy::default_policy();
    let call_id = retry::call(&default_policy, || app.control_plane().function_map(&function_id)).await?;

    let shared = Arc::new(Shared {
        num_inputs: AtomicU64::new(0),
        have_all_inputs: AtomicBool::new(false),
        num_outputs: AtomicU64::new(0),
        aborted: AtomicBool::new(false),
    });

    let (input_tx, input_rx) = mpsc::channel::<Input>(4 * MAP_INVOCATION_CHUNK_SIZE);
    let (output_tx, output_rx) = mpsc::channel::<Result<T, Error>>(4 * MAP_INVOCATION_CHUNK_SIZE);

    tokio::spawn(drain_task(app.clone(), kwargs, inputs, shared.clone(), input_tx, output_tx.clone()));
    tokio::spawn(pump_task(app.clone(), function_id, call_id.clone(), input_rx, shared.clone(), output_tx.clone()));
    tokio::spawn(poll_task(app, call_id, is_generator, shared, output_tx));

    Ok(output_rx)
}

/// Drains `inputs`, encoding each into an `Input` and handing it to `pump_task`. An encode
/// failure aborts the Map: the input never reached the server, so `poll_task`'s
/// `num_outputs == num_inputs` termination check could never be satisfied for it. Surfacing the
/// error through `output_tx` (rather than logging and skipping it) matches the "Map engine
/// terminates on first surfaced error from any of its three tasks" contract.
async fn drain_task<T, A, K, S>(
    app: AppHandle,
    kwargs: K,
    mut inputs: S,
    shared: Arc<Shared>,
    input_tx: mpsc::Sender<Input>,
    output_tx: mpsc::Sender<Result<T, Error>>,
) where
    T: Send + 'static,
    A: Serialize + Send + 'static,
    K: Serialize,
    S: Stream<Item = A> + Send + Unpin + 'static,
{
    while let Some(arg) = inputs.next().await {
        let idx = shared.num_inputs.fetch_add(1, Ordering::SeqCst);
        match encode_input(app.http(), app.control_plane(), &arg, &kwargs, Some(idx)).await {
            Ok(input) => {
                if input_tx.send(input).await.is_err() {
                    return;
                }
            }
            Err(err) => {
                shared.num_inputs.fetch_sub(1, Ordering::SeqCst);
                shared.aborted.store(true, Ordering::SeqCst);
                let _ = output_tx.send(Err(err)).await;
                return;
            }
        }
    }
}

/// Batches `Input`s off `input_rx` and submits them via `PutInputs`. A non-transient failure
/// (surfaced immediately by `retry::call` rather than exhausting the retry budget) aborts the
/// Map the same way a drain-side encode failure does: the batch never reached the server, so
/// `poll_task` would otherwise wait forever for outputs that can never arrive.
async fn pump_task<T: Send + 'static>(
    app: AppHandle,
    function_id: String,
    call_id: String,
    mut input_rx: mpsc::Receiver<Input>,
    shared: Arc<Shared>,
    output_tx: mpsc::Sender<Result<T, Error>>,
) {
    let put_inputs_policy = RetryPolicy::unlimited_with_backpressure();
    let mut batch = Vec::with_capacity(MAP_INVOCATION_CHUNK_SIZE);

    loop {
        match input_rx.recv().await {
            Some(input) => {
                batch.push(input);
                while batch.len() < MAP_INVOCATION_CHUNK_SIZE {
                    match input_rx.try_recv() {
                        Ok(input) => batch.push(input),
                        Err(_) => break,
                    }
                }
                let to_send = std::mem::take(&mut batch);
                if let Err(status) = retry::call(&put_inputs_policy, || {
                    app.control_plane().put_inputs(&function_id, &call_id, to_send.clone())
                })
                .await
                {
                    shared.aborted.store(true, Ordering::SeqCst);
                    let _ = output_tx.send(Err(Error::from(status))).await;
                    return;
                }
            }
            None => {
                if !batch.is_empty() {
                    let to_send = std::mem::take(&mut batch);
                    if let Err(status) = retry::call(&put_inputs_policy, || {
                        app.control_plane().put_inputs(&function_id, &call_id, to_send.clone())
                    })
                    .await
                    {
                        shared.aborted.store(true, Ordering::SeqCst);
                        let _ = output_tx.send(Err(Error::from(status))).await;
                        return;
                    }
                }
                shared.have_all_inputs.store(true, Ordering::SeqCst);
                return;
            }
        }
    }
}

async fn poll_task<T: DeserializeOwned + Send + 'static>(
    app: AppHandle,
    call_id: String,
    is_generator: bool,
    shared: Arc<Shared>,
    output_tx: mpsc::Sender<Result<T, Error>>,
) {
    let get_outputs_policy = RetryPolicy::unlimited_no_delay();
    let mut pending: HashMap<u64, Result<T, Error>> = HashMap::new();

    loop {
        if shared.aborted.load(Ordering::SeqCst) {
            return;
        }

        let outputs = match retry::call(&get_outputs_policy, || {
            app.control_plane().get_outputs(&call_id, BACKEND_POLL_MAX, true)
        })
        .await
        {
            Ok(outputs) => outputs,
            Err(status) => {
                let _ = output_tx.send(Err(Error::from(status))).await;
                return;
            }
        };

        for item in outputs {
            let Some(result) = item.result else { continue };
            if is_generator {
                if result.gen_status == GeneratorStatus::Complete as i32 {
                    shared.num_outputs.fetch_add(1, Ordering::SeqCst);
                } else {
                    let decoded = process_result(app.http(), app.control_plane(), result).await;
                    if output_tx.send(decoded).await.is_err() {
                        return;
                    }
                }
            } else {
                let decoded = process_result(app.http(), app.control_plane(), result).await;
                pending.insert(item.idx, decoded);
            }
        }

        if !is_generator {
            while pending.contains_key(&shared.num_outputs.load(Ordering::SeqCst)) {
                let idx = shared.num_outputs.load(Ordering::SeqCst);
                let decoded = pending.remove(&idx).unwrap();
                if output_tx.send(decoded).await.is_err() {
                    return;
                }
                shared.num_outputs.fetch_add(1, Ordering::SeqCst);
            }
        }

        if shared.have_all_inputs.load(Ordering::SeqCst) && shared.num_outputs.load(Ordering::SeqCst) == shared.num_inputs.load(Ordering::SeqCst) {
            debug_assert!(pending.is_empty(), "pending outputs left over after Map reassembly completed");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use control_plane::proto::{GenericResult, GenericResultStatus, OutputItem, ResultData};
    use std::sync::Arc as StdArc;
    use testutil::{AlwaysErrorControlPlane, MockControlPlane};
    use tonic::Code;

    fn output(idx: u64, value: i64) -> OutputItem {
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

    fn app_with(control_plane: MockControlPlane) -> AppHandle {
        let control_plane: StdArc<dyn control_plane::ControlPlane> = StdArc::new(control_plane);
        AppHandle::new(control_plane, "ap-test")
    }

    #[tokio::test]
    async fn reassembles_out_of_order_outputs_in_input_order() {
        let mock = MockControlPlane::new();
        mock.push_output_batch(vec![output(2, 300), output(0, 100), output(1, 200)]);
        let app = app_with(mock);

        let inputs = futures::stream::iter(vec![1_i64, 2, 3]);
        let stream = starmap::<i64, _, (), _>(&app, "fn-triple", (), inputs.map(|n| (n,)), false)
            .await
            .unwrap();
        futures::pin_mut!(stream);

        let mut values = Vec::new();
        while let Some(item) = stream.next().await {
            values.push(item.unwrap());
        }
        assert_eq!(values, vec![100, 200, 300]);
    }

    #[tokio::test]
    async fn retries_put_inputs_through_resource_exhausted_backpressure() {
        let mock = MockControlPlane::new();
        mock.set_resource_exhausted_failures(2);
        mock.push_output_batch(vec![output(0, 42)]);
        let app = app_with(mock);

        let inputs = futures::stream::iter(vec![1_i64]);
        let stream = starmap::<i64, _, (), _>(&app, "fn-id", (), inputs.map(|n| (n,)), false)
            .await
            .unwrap();
        futures::pin_mut!(stream);

        let value = stream.next().await.unwrap().unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn tolerates_empty_long_polls_before_outputs_arrive() {
        let mock = MockControlPlane::new();
        mock.push_output_batch(vec![]);
        mock.push_output_batch(vec![]);
        mock.push_output_batch(vec![output(0, 9)]);
        let app = app_with(mock);

        let inputs = futures::stream::iter(vec![1_i64]);
        let stream = starmap::<i64, _, (), _>(&app, "fn-id", (), inputs.map(|n| (n,)), false)
            .await
            .unwrap();
        futures::pin_mut!(stream);

        let value = stream.next().await.unwrap().unwrap();
        assert_eq!(value, 9);
    }

    #[tokio::test]
    async fn for_each_drains_without_returning_values() {
        let mock = MockControlPlane::new();
        mock.push_output_batch(vec![output(0, 1), output(1, 2)]);
        let app = app_with(mock);

        let inputs = futures::stream::iter(vec![1_i64, 2]);
        for_each::<i64, _, (), _>(&app, "fn-id", (), inputs).await.unwrap();
    }

    /// Regression test: a non-transient `PutInputs` failure must surface through the output
    /// stream instead of leaving `poll_task` waiting forever for outputs an abandoned batch can
    /// never produce.
    #[tokio::test]
    async fn non_transient_put_inputs_failure_surfaces_instead_of_hanging() {
        let mock = MockControlPlane::new();
        mock.set_put_inputs_failure(Code::PermissionDenied, "no access");
        let app = app_with(mock);

        let inputs = futures::stream::iter(vec![1_i64, 2, 3]);
        let stream = starmap::<i64, _, (), _>(&app, "fn-id", (), inputs.map(|n| (n,)), false)
            .await
            .unwrap();
        futures::pin_mut!(stream);

        let first = stream.next().await.expect("stream should surface the error, not hang forever");
        assert!(matches!(first.unwrap_err(), Error::Transport(_)));
    }

    #[tokio::test]
    async fn surfaces_a_non_transient_control_plane_error_immediately() {
        let control_plane: StdArc<dyn control_plane::ControlPlane> =
            StdArc::new(AlwaysErrorControlPlane::new(Code::PermissionDenied, "no access"));
        let app = AppHandle::new(control_plane, "ap-test");

        let inputs = futures::stream::iter(vec![1_i64]);
        let err = starmap::<i64, _, (), _>(&app, "fn-id", (), inputs.map(|n| (n,)), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
