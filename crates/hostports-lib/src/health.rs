//! Health tracking for the host port agent
//!
//! The reconciler reports the state of its runtime connection, the rule
//! engine, and the last ruleset it applied; the HTTP API turns this into
//! liveness and readiness responses.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is failing but the agent keeps retrying
    Degraded,
    /// Component has failed and the agent cannot recover on its own
    Unhealthy,
}

impl ComponentStatus {
    /// Returns true if the component is at least partially operational
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Parts of the agent that report health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// Connection to the CRI runtime service
    RuntimeClient,
    /// The `nft` rule engine
    RuleApplier,
}

impl Component {
    pub const ALL: [Component; 2] = [Component::RuntimeClient, Component::RuleApplier];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::RuntimeClient => "runtime_client",
            Component::RuleApplier => "rule_applier",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Information about a component's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the status last changed (Unix seconds)
    pub since: i64,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            since: chrono::Utc::now().timestamp(),
        }
    }
}

/// The ruleset currently installed by this process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRuleset {
    pub fingerprint: String,
    pub tcp_ports: usize,
    pub udp_ports: usize,
    /// Unix seconds
    pub applied_at: i64,
}

impl AppliedRuleset {
    pub fn new(fingerprint: impl Into<String>, tcp_ports: usize, udp_ports: usize) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            tcp_ports,
            udp_ports,
            applied_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Liveness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ruleset: Option<AppliedRuleset>,
}

#[derive(Debug)]
struct HealthState {
    components: HashMap<Component, ComponentHealth>,
    applied: Option<AppliedRuleset>,
}

impl HealthState {
    /// Worst status across all components
    fn overall(&self) -> ComponentStatus {
        self.components
            .values()
            .map(|c| c.status)
            .max_by_key(|status| match status {
                ComponentStatus::Healthy => 0,
                ComponentStatus::Degraded => 1,
                ComponentStatus::Unhealthy => 2,
            })
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Shared, cloneable view of agent health
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Every component starts healthy; nothing is applied yet
    pub fn new() -> Self {
        let components = Component::ALL
            .into_iter()
            .map(|c| (c, ComponentHealth::new(ComponentStatus::Healthy, None)))
            .collect();

        Self {
            state: Arc::new(RwLock::new(HealthState {
                components,
                applied: None,
            })),
        }
    }

    async fn update(&self, component: Component, status: ComponentStatus, message: Option<String>) {
        let mut state = self.state.write().await;
        // Keep `since` stable while the status holds.
        if let Some(current) = state.components.get_mut(&component) {
            if current.status == status {
                current.message = message;
                return;
            }
        }
        state
            .components
            .insert(component, ComponentHealth::new(status, message));
    }

    pub async fn set_healthy(&self, component: Component) {
        self.update(component, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, component: Component, message: impl Into<String>) {
        self.update(component, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, component: Component, message: impl Into<String>) {
        self.update(component, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Record a ruleset that reached the kernel
    pub async fn record_applied(&self, ruleset: AppliedRuleset) {
        self.state.write().await.applied = Some(ruleset);
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: state.overall(),
            components: state
                .components
                .iter()
                .map(|(c, h)| (c.as_str().to_string(), h.clone()))
                .collect(),
        }
    }

    /// Ready once a ruleset is applied and no component has failed
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;

        let reason = if state.applied.is_none() {
            Some("No ruleset reconciled yet")
        } else if state.overall() == ComponentStatus::Unhealthy {
            Some("Critical component unhealthy")
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason: reason.map(str::to_string),
            ruleset: state.applied.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_all_components_start_healthy() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.components.len(), 2);
        assert_eq!(
            health.components["runtime_client"].status,
            ComponentStatus::Healthy
        );
        assert_eq!(
            health.components["rule_applier"].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_disconnected_runtime_degrades_health() {
        let registry = HealthRegistry::new();

        registry
            .set_degraded(Component::RuntimeClient, "connection refused")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert!(health.status.is_operational());
        assert_eq!(
            health.components["runtime_client"].message.as_deref(),
            Some("connection refused")
        );
    }

    #[tokio::test]
    async fn test_failed_applier_is_unhealthy() {
        let registry = HealthRegistry::new();
        registry
            .set_degraded(Component::RuntimeClient, "connection refused")
            .await;
        registry
            .set_unhealthy(Component::RuleApplier, "nft exited with 1")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert!(!health.status.is_operational());
    }

    #[tokio::test]
    async fn test_recovery_clears_message() {
        let registry = HealthRegistry::new();
        registry
            .set_degraded(Component::RuntimeClient, "connection refused")
            .await;
        registry.set_healthy(Component::RuntimeClient).await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components["runtime_client"].message.is_none());
    }

    #[tokio::test]
    async fn test_not_ready_before_first_apply() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness().await;

        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("No ruleset reconciled yet"));
        assert!(readiness.ruleset.is_none());
    }

    #[tokio::test]
    async fn test_ready_reports_applied_ruleset() {
        let registry = HealthRegistry::new();
        registry
            .record_applied(AppliedRuleset::new("e3b0c44298fc1c14", 2, 1))
            .await;

        let readiness = registry.readiness().await;
        assert!(readiness.ready);
        assert!(readiness.reason.is_none());

        let ruleset = readiness.ruleset.unwrap();
        assert_eq!(ruleset.fingerprint, "e3b0c44298fc1c14");
        assert_eq!((ruleset.tcp_ports, ruleset.udp_ports), (2, 1));
    }

    #[tokio::test]
    async fn test_runtime_outage_keeps_readiness() {
        let registry = HealthRegistry::new();
        registry
            .record_applied(AppliedRuleset::new("0000000000000001", 0, 0))
            .await;
        registry
            .set_degraded(Component::RuntimeClient, "connection reset")
            .await;

        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_not_ready_when_unhealthy() {
        let registry = HealthRegistry::new();
        registry
            .record_applied(AppliedRuleset::new("0000000000000001", 0, 0))
            .await;
        registry.set_unhealthy(Component::RuleApplier, "Failed").await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("Critical component unhealthy")
        );
    }
}
