// Copyright 2024 Orbit project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Application handle: the explicit, passed-around replacement for a process-wide "current
//! running app" global. Every invocation entry point takes an `&AppHandle` rather than reaching
//! for ambient state.

use std::env;
use std::sync::Arc;

use control_plane::ControlPlane;

struct Inner {
    control_plane: Arc<dyn ControlPlane>,
    http: reqwest::Client,
    app_id: String,
}

/// Shared handle to a running application: the transport the engine issues calls over, plus the
/// app's identity. Cheaply cloneable (`Arc` internals) so it can be handed to as many concurrent
/// invocations/maps as needed without contention.
#[derive(Clone)]
pub struct AppHandle {
    inner: Arc<Inner>,
}

/// Name of the container-assigned environment variable carrying the running app's id. Set by the
/// worker entrypoint (out of scope for this crate).
pub const APP_ID_ENV_VAR: &str = "ORBIT_APP_ID";

impl AppHandle {
    /// Construct a handle explicitly, e.g. from a CLI entry point that just connected to the
    /// control plane and registered an app.
    pub fn new(control_plane: Arc<dyn ControlPlane>, app_id: impl Into<String>) -> Self {
        AppHandle {
            inner: Arc::new(Inner {
                control_plane,
                http: reqwest::Client::new(),
                app_id: app_id.into(),
            }),
        }
    }

    /// In-container lookup: reads the app id the worker entrypoint assigned via environment
    /// variable, rather than touching a process-wide static. Fails if the variable is unset,
    /// which means this process was not launched as part of a running app.
    pub fn lookup(control_plane: Arc<dyn ControlPlane>) -> Result<Self, crate::error::Error> {
        let app_id = env::var(APP_ID_ENV_VAR)
            .map_err(|_| crate::error::Error::Invalid(format!("{APP_ID_ENV_VAR} is not set; not running inside an app container")))?;
        Ok(AppHandle::new(control_plane, app_id))
    }

    pub fn app_id(&self) -> &str {
        &self.inner.app_id
    }

    pub(crate) fn control_plane(&self) -> &dyn ControlPlane {
        self.inner.control_plane.as_ref()
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testutil::MockControlPlane;

    #[test]
    fn lookup_fails_when_the_env_var_is_unset() {
        env::remove_var(APP_ID_ENV_VAR);
        let control_plane: Arc<dyn ControlPlane> = Arc::new(MockControlPlane::new());
        assert!(AppHandle::lookup(control_plane).is_err());
    }

    #[test]
    fn lookup_reads_the_app_id_from_the_environment() {
        env::set_var(APP_ID_ENV_VAR, "ap-test123");
        let control_plane: Arc<dyn ControlPlane> = Arc::new(MockControlPlane::new());
        let app = AppHandle::lookup(control_plane).unwrap();
        assert_eq!(app.app_id(), "ap-test123");
        env::remove_var(APP_ID_ENV_VAR);
    }
}
