// Copyright 2024 Orbit project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Error kinds. Written as a plain enum with manual `Display`/`std::error::Error` impls, matching
//! the no-`thiserror`/`anyhow` idiom used throughout this codebase.

use std::fmt;

use tonic::Status;

/// The shape a server-side failure payload must decode into to be treated as a propagatable
/// remote exception. Real exception *types* cannot cross the wire into an arbitrary Rust
/// process, so this is the closest structural equivalent: a recognizable `{kind, message}` pair.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RemoteException {
    /// Mirrors the `isinstance(exc, BaseException)` check the source performs after
    /// deserializing a failure payload: a payload can decode cleanly into this shape and still
    /// not represent an exception (e.g. the user's function legitimately returned a value that
    /// happens to match the wire shape on a FAILURE result).
    pub is_exception: bool,
    pub kind: String,
    pub message: String,
}

impl fmt::Display for RemoteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug)]
pub enum Error {
    /// Caller misuse: uninitialized function, bad argument shapes, and the like.
    Invalid(String),
    /// The server reported failure with only a string, no materializable payload.
    Remote(String),
    /// The server reported failure with a payload that could not be materialized locally.
    Execution(String),
    /// The server reported failure with a payload that decoded into a recognizable exception.
    RemoteException(RemoteException),
    /// `poll_function` exceeded its deadline.
    Timeout,
    /// A non-transient RPC error, or a transient one that exhausted its retry budget.
    Transport(Status),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Invalid(msg) => write!(f, "{msg}"),
            Error::Remote(msg) => write!(f, "remote error: {msg}"),
            Error::Execution(msg) => write!(f, "{msg}"),
            Error::RemoteException(exc) => write!(f, "remote exception: {exc}"),
            Error::Timeout => write!(f, "timed out waiting for a result"),
            Error::Transport(status) => write!(f, "transport error: {status}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Error::Transport(status)
    }
}

impl From<blob::BlobError> for Error {
    fn from(err: blob::BlobError) -> Self {
        match err {
            blob::BlobError::ControlPlane(status) => Error::Transport(status),
            blob::BlobError::Transfer(err) => Error::Execution(format!("blob transfer failed: {err}")),
        }
    }
}
