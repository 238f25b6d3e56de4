// Copyright 2024 Orbit project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! `FunctionHandle`: the user-facing wrapper around an already-registered `FunctionId`.
//! Registration itself (image, secrets, mounts, `FunctionCreate`) is out of scope — this type only
//! knows how to invoke a function it has been told already exists.

use async_stream::stream;
use futures::Stream;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::app::AppHandle;
use crate::error::Error;
use crate::invocation::{self, FunctionCall, Invocation};
use crate::map;

/// A registered remote function, identified by its `FunctionId` and whether it was registered as
/// a generator.
#[derive(Clone)]
pub struct FunctionHandle {
    app: AppHandle,
    function_id: String,
    is_generator: bool,
}

impl FunctionHandle {
    /// Wrap an already-registered function id. `is_generator` must match how the function was
    /// registered; this type has no way to discover it on its own.
    pub fn new(app: &AppHandle, function_id: impl Into<String>, is_generator: bool) -> Self {
        FunctionHandle {
            app: app.clone(),
            function_id: function_id.into(),
            is_generator,
        }
    }

    pub fn function_id(&self) -> &str {
        &self.function_id
    }

    /// Blocking single call: submit `(args, kwargs)` and wait for the decoded result.
    pub async fn call<T, A, K>(&self, args: &A, kwargs: &K) -> Result<T, Error>
    where
        T: DeserializeOwned,
        A: Serialize,
        K: Serialize,
    {
        assert!(!self.is_generator, "call() on a generator function; use call_generator()");
        let invocation = Invocation::create(&self.app, &self.function_id, args, kwargs).await?;
        invocation.run_function().await
    }

    /// Single call against a registered generator function; yields decoded items until the
    /// server signals completion.
    pub fn call_generator<'a, T, A, K>(&'a self, args: &'a A, kwargs: &'a K) -> impl Stream<Item = Result<T, Error>> + 'a
    where
        T: DeserializeOwned + 'static,
        A: Serialize,
        K: Serialize,
    {
        assert!(self.is_generator, "call_generator() on a non-generator function; use call()");
        stream! {
            let invocation = match Invocation::create(&self.app, &self.function_id, args, kwargs).await {
                Ok(invocation) => invocation,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };
            let items = invocation.run_generator::<T>();
            futures::pin_mut!(items);
            while let Some(item) = futures::StreamExt::next(&mut items).await {
                yield item;
            }
        }
    }

    /// Fire-and-forget: submit the call and return a detached handle the caller can poll later.
    pub async fn submit<A, K>(&self, args: &A, kwargs: &K) -> Result<FunctionCall, Error>
    where
        A: Serialize,
        K: Serialize,
    {
        invocation::submit(&self.app, &self.function_id, args, kwargs).await
    }

    /// Parallel map over one positional argument per call.
    pub async fn map<T, A, S>(&self, args: S) -> Result<impl Stream<Item = Result<T, Error>>, Error>
    where
        T: DeserializeOwned + Send + 'static,
        A: Serialize + Send + 'static,
        S: Stream<Item = A> + Send + Unpin + 'static,
    {
        map::map::<T, A, (), S>(&self.app, &self.function_id, (), args, self.is_generator).await
    }

    /// Parallel map over a stream of pre-zipped argument tuples.
    pub async fn starmap<T, A, S>(&self, args: S) -> Result<impl Stream<Item = Result<T, Error>>, Error>
    where
        T: DeserializeOwned + Send + 'static,
        A: Serialize + Send + 'static,
        S: Stream<Item = A> + Send + Unpin + 'static,
    {
        map::starmap::<T, A, (), S>(&self.app, &self.function_id, (), args, self.is_generator).await
    }

    /// Drives a non-generator [`map`](Self::map) call for side effects, discarding results.
    pub async fn for_each<T, A, S>(&self, args: S) -> Result<(), Error>
    where
        T: DeserializeOwned + Send + 'static,
        A: Serialize + Send + 'static,
        S: Stream<Item = A> + Send + Unpin + 'static,
    {
        map::for_each::<T, A, (), S>(&self.app, &self.function_id, (), args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use control_plane::proto::{GenericResult, GenericResultStatus, GeneratorStatus, OutputItem, ResultData};
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

    fn app_with(control_plane: MockControlPlane) -> AppHandle {
        let control_plane: Arc<dyn control_plane::ControlPlane> = Arc::new(control_plane);
        AppHandle::new(control_plane, "ap-test")
    }

    #[tokio::test]
    async fn call_submits_and_decodes_the_result() {
        let mock = MockControlPlane::new();
        mock.push_output_batch(vec![success_output(0, 64)]);
        let app = app_with(mock);

        let function = FunctionHandle::new(&app, "fn-square", false);
        let value: i64 = function.call(&(8_i64,), &()).await.unwrap();
        assert_eq!(value, 64);
    }
}
