// Copyright 2024 Orbit project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Thin adapter applying [`transport::retry::call`]'s backoff loop to plain
//! `Result<T, tonic::Status>` futures, since every control-plane call here returns a bare value
//! rather than a `tonic::Response<T>`.

use tonic::{Response, Status};
use transport::RetryPolicy;

pub use transport::retry::call as call_response;

pub async fn call<T, F, Fut>(policy: &RetryPolicy, f: F) -> Result<T, Status>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, Status>>,
{
    call_response((), policy, |_: ()| {
        let fut = f();
        async move { fut.await.map(Response::new) }
    })
    .await
    .map(Response::into_inner)
}
