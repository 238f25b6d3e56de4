// Copyright 2024 Orbit project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Client-side remote invocation engine: turns function calls into input batches, drives output
//! polling against the control plane, and reassembles results — see the crate's sibling crates
//! (`control_plane`, `blob`, `codec`, `transport`) for the layers this builds on.

pub mod app;
pub mod error;
pub mod function;
pub mod input;
pub mod invocation;
pub mod map;
pub mod result;
mod retry;

pub use app::AppHandle;
pub use error::{Error, RemoteException};
pub use function::FunctionHandle;
pub use invocation::{FunctionCall, Invocation, BACKEND_POLL_MAX};
pub use map::MAP_INVOCATION_CHUNK_SIZE;
