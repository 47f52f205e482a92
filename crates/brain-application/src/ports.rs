//! Upstream-process controller port
//!
//! The upstream memory service reads its config file once at startup and
//! never observes in-place edits. After every successful upstream-config
//! write the core invokes this hook; the enclosing server wires it to
//! whatever controls the upstream process (typically: stop the current
//! child instance so the next request spawns a fresh one). Without the
//! signal, writes silently never take effect.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Failure to signal the upstream process
#[derive(Debug, Clone, Error)]
#[error("Failed to signal upstream restart: {0}")]
pub struct UpstreamControlError(pub String);

/// Boundary to the process hosting the upstream service
#[async_trait]
pub trait UpstreamController: Send + Sync {
    /// Ask the upstream process to restart so it re-reads its config file
    /// on the next invocation.
    async fn signal_restart(&self) -> Result<(), UpstreamControlError>;
}

/// Shared reference to an upstream controller
pub type UpstreamControllerRef = Arc<dyn UpstreamController>;

/// No-op controller for tests and for deployments where the enclosing
/// server manages the upstream lifecycle out of band.
pub struct NullUpstreamController;

#[async_trait]
impl UpstreamController for NullUpstreamController {
    async fn signal_restart(&self) -> Result<(), UpstreamControlError> {
        debug!("Null upstream controller: restart signal dropped");
        Ok(())
    }
}
