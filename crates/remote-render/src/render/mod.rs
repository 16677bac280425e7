//! Render backend boundary.
//!
//! The lifecycle controller submits a job once and then polls the returned
//! handle on every tick until the backend reports a terminal outcome.

pub mod simulated;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::RenderError;

pub use simulated::SimulatedBackend;

/// What the backend needs to know to start a render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSpec {
    pub job_id: String,
    pub file_name: String,
    pub file_type: String,
}

/// Opaque reference to a render running on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RenderHandle(pub String);

impl std::fmt::Display for RenderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend answer to one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderPoll {
    InProgress {
        progress: u8,
    },
    Completed {
        thumbnail_url: String,
        download_url: String,
    },
    /// `progress` is where the render stopped.
    Failed {
        reason: String,
        progress: u8,
    },
}

impl RenderPoll {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RenderPoll::InProgress { .. })
    }
}

#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn submit(&self, spec: &RenderSpec) -> Result<RenderHandle, RenderError>;

    async fn poll(&self, handle: &RenderHandle) -> Result<RenderPoll, RenderError>;

    /// Forgets a render. Called when the job leaves the render phase, whether
    /// it finished or was cancelled.
    fn release(&self, handle: &RenderHandle);

    fn name(&self) -> &'static str;
}

/// Releases a handle when dropped, including when the owning task is aborted.
pub(crate) struct HandleLease {
    backend: Arc<dyn RenderBackend>,
    handle: RenderHandle,
}

impl HandleLease {
    pub(crate) fn new(backend: Arc<dyn RenderBackend>, handle: RenderHandle) -> Self {
        Self { backend, handle }
    }

    pub(crate) fn handle(&self) -> &RenderHandle {
        &self.handle
    }
}

impl Drop for HandleLease {
    fn drop(&mut self) {
        self.backend.release(&self.handle);
    }
}
