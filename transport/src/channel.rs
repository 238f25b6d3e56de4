// Copyright 2024 Orbit project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

// Endpoint and channel construction for talking to the control plane over gRPC.

use std::collections::BTreeMap;

use http::header::{HeaderName, HeaderValue, USER_AGENT};
use http::HeaderMap;
use tonic::transport::{Channel, Endpoint};
use tower::limit::ConcurrencyLimit;
use tower::ServiceBuilder;

use crate::headers::{SetRequestHeaders, SetRequestHeadersLayer};

/// The fully layered service type every control-plane client method is built against. If this
/// becomes unwieldy as layers diverge between clients, switch to a boxed `dyn Service`.
pub type LayeredChannel = SetRequestHeaders<ConcurrencyLimit<Channel>>;

/// Build a Tonic [`Endpoint`] from an address string, attaching a user-agent header if present.
pub fn create_endpoint(addr: &str, headers: &mut BTreeMap<String, String>) -> Result<Endpoint, String> {
    let uri = tonic::transport::Uri::try_from(addr).map_err(|err| format!("invalid address: {err}"))?;
    let mut endpoint = Channel::builder(uri);

    if let Some(user_agent) = headers.remove(USER_AGENT.as_str()) {
        endpoint = endpoint
            .user_agent(user_agent)
            .map_err(|err| format!("unable to set user-agent header: {err}"))?;
    }

    Ok(endpoint)
}

pub fn headers_to_http_header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, String> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (key, value) in headers {
        let name = HeaderName::try_from(key.as_str()).map_err(|err| format!("invalid header name {key}: {err}"))?;
        let value =
            HeaderValue::try_from(value.as_str()).map_err(|err| format!("invalid header value for {key}: {err}"))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Wrap a bare channel with the concurrency limit and header-injection layers shared by every
/// control-plane client.
pub fn layered_channel(channel: Channel, concurrency_limit: usize, headers: HeaderMap) -> LayeredChannel {
    ServiceBuilder::new()
        .layer(SetRequestHeadersLayer::new(headers))
        .concurrency_limit(concurrency_limit)
        .service(channel)
}
