// Copyright 2024 Orbit project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Generic RPC transport wrapper for talking to the control plane: channel/endpoint setup,
//! header injection, and a retry policy for transient errors. Deliberately knows nothing about
//! the specific RPCs the control plane exposes — that lives in the `control_plane` crate, which
//! is the only crate that should depend on this one for anything beyond re-exports.

pub mod channel;
pub mod headers;
pub mod retry;

pub use retry::RetryPolicy;
pub use tonic::{Code, Status};
