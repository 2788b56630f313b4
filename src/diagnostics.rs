//! Best-effort diagnostic reporting.
//!
//! Every diagnostic is logged locally. Unless the server asked for silence,
//! it is also sent to `POST /error` on a detached task whose failures are
//! swallowed.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::model::{ErrorReport, PreloadRequest, RemoteLogLevel};
use crate::transport::AdServerClient;

/// Sends diagnostics upstream, gated by the server-provided log level.
#[derive(Debug, Clone)]
pub struct DiagnosticReporter {
    client: Arc<dyn AdServerClient>,
    runtime: Handle,
    level: Arc<Mutex<RemoteLogLevel>>,
}

impl DiagnosticReporter {
    /// Create a reporter that spawns uploads on `runtime`.
    #[must_use]
    pub fn new(client: Arc<dyn AdServerClient>, runtime: Handle) -> Self {
        Self {
            client,
            runtime,
            level: Arc::new(Mutex::new(RemoteLogLevel::default())),
        }
    }

    /// Current upstream threshold.
    #[must_use]
    pub fn remote_level(&self) -> RemoteLogLevel {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the upstream threshold.
    pub fn set_remote_level(&self, level: RemoteLogLevel) {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner) = level;
    }

    /// Log an error and, if the threshold allows, report it upstream.
    ///
    /// Returns the upload task when one was spawned.
    pub fn report(&self, message: &str, request: Option<PreloadRequest>) -> Option<JoinHandle<()>> {
        tracing::error!(name: "ads.diagnostic", error = %message, "[AdsProvider] {message}");

        if self.remote_level() > RemoteLogLevel::Error {
            tracing::debug!("Upstream diagnostics silenced by server");
            return None;
        }

        let client = Arc::clone(&self.client);
        let report = ErrorReport::new(message, request);
        Some(self.runtime.spawn(async move {
            if let Err(e) = client.report_error(&report).await {
                tracing::debug!(error = %e, "Diagnostic upload failed");
            }
        }))
    }
}
