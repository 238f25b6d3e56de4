// Copyright 2024 Orbit project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

// Tower layer that stamps a fixed set of headers (e.g. an auth token) onto every outbound
// request, regardless of which typed client method issued it.

use std::fmt;
use std::task::{Context, Poll};

use http::HeaderMap;
use tower_layer::Layer;
use tower_service::Service;

#[derive(Debug)]
pub struct SetRequestHeadersLayer {
    headers: HeaderMap,
}

impl SetRequestHeadersLayer {
    pub fn new(headers: HeaderMap) -> Self {
        SetRequestHeadersLayer { headers }
    }
}

impl<S> Layer<S> for SetRequestHeadersLayer {
    type Service = SetRequestHeaders<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SetRequestHeaders {
            inner,
            headers: self.headers.clone(),
        }
    }
}

#[derive(Clone)]
pub struct SetRequestHeaders<S> {
    inner: S,
    headers: HeaderMap,
}

impl<S> fmt::Debug for SetRequestHeaders<S>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetRequestHeaders")
            .field("inner", &self.inner)
            .field("headers", &self.headers)
            .finish()
    }
}

impl<ReqBody, S> Service<http::Request<ReqBody>> for SetRequestHeaders<S>
where
    S: Service<http::Request<ReqBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<ReqBody>) -> Self::Future {
        if !self.headers.is_empty() {
            let headers = req.headers_mut();
            for (name, value) in &self.headers {
                headers.insert(name, value.clone());
            }
        }
        self.inner.call(req)
    }
}
