//! Shared application state.

use crate::apps;
use crate::config::Config;
use chrono::{DateTime, Utc};
use sigma_core::{CancelSignal, Canceller, Sigma, cancellation};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub sigma: Arc<Sigma>,
    pub config: Config,
    pub started_at: DateTime<Utc>,
    /// Fired on shutdown; every in-flight request is linked to it.
    shutdown: Canceller,
}

impl AppState {
    /// Build the dispatcher with the demo applications installed.
    pub fn new(config: Config) -> sigma_core::Result<Self> {
        let state = Self::empty(config);
        apps::install(&state.sigma, &state.config, state.started_at)?;
        Ok(state)
    }

    /// State with no routes or components registered.
    pub fn empty(config: Config) -> Self {
        let (shutdown, _) = cancellation();
        Self {
            sigma: Arc::new(Sigma::new()),
            config,
            started_at: Utc::now(),
            shutdown,
        }
    }

    pub fn shutdown_signal(&self) -> CancelSignal {
        self.shutdown.signal()
    }

    /// Link a new per-request canceller to server shutdown.
    pub fn request_cancellation(&self) -> (Canceller, CancelSignal) {
        self.shutdown.child()
    }

    /// Cancel every open stream.
    pub fn begin_shutdown(&self) {
        tracing::info!(target: "sigma::startup", "Shutting down; closing open streams");
        self.shutdown.cancel();
    }
}
