//! Host port forwarding for CRI container runtimes
//!
//! This crate provides the core functionality for:
//! - Listing running containers over the CRI gRPC API
//! - Extracting declared host ports from container annotations
//! - Rendering and applying the nftables DNAT table
//! - The reconciliation loop that keeps the table current
//! - Health checks and observability

pub mod api;
pub mod error;
pub mod health;
pub mod models;
pub mod nft;
pub mod observability;
pub mod ports;
pub mod proto;
pub mod reconciler;
pub mod runtime;

pub use error::{ApplyError, ReconcileError, ReconcileResult, RuntimeError};
pub use health::{
    AppliedRuleset, Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use reconciler::{Reconciler, ReconcilerBuilder};
