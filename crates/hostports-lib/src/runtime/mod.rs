//! Container runtime access
//!
//! The reconciler talks to the runtime through two traits: a
//! [`RuntimeConnector`] that dials the runtime, and the [`RuntimeService`]
//! handle it returns. The CRI implementation lives in [`client`].

mod client;

pub use client::{CriConnector, CriConnectorBuilder, CriRuntime, RuntimeEndpoint};

use crate::error::RuntimeError;
use crate::models::{ContainerRecord, PodNetwork};
use std::sync::Arc;

pub use async_trait::async_trait;

/// Default CRI endpoint used by containerd
pub const DEFAULT_RUNTIME_ENDPOINT: &str = "unix:///var/run/containerd/containerd.sock";

/// Environment variable overriding the runtime endpoint
pub const RUNTIME_ENDPOINT_ENV: &str = "CONTAINER_RUNTIME_ENDPOINT";

/// Queries served by an established runtime connection
#[async_trait]
pub trait RuntimeService: Send + Sync {
    /// List the containers currently running on this node
    async fn list_containers(&self) -> Result<Vec<ContainerRecord>, RuntimeError>;

    /// Resolve the network status of a pod sandbox
    async fn pod_network(&self, pod_sandbox_id: &str) -> Result<PodNetwork, RuntimeError>;
}

/// Establishes runtime connections; retry policy belongs to the caller
#[async_trait]
pub trait RuntimeConnector: Send + Sync {
    /// Endpoint this connector dials, for logging
    fn endpoint(&self) -> &str;

    /// Open a new connection
    async fn connect(&self) -> Result<Arc<dyn RuntimeService>, RuntimeError>;
}
