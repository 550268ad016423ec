//! Reconciliation loop
//!
//! Drives one cycle per tick and owns the runtime connection. The loop is
//! strictly sequential: a slow cycle delays the next tick instead of
//! overlapping with it.

use super::{desired_ruleset, ChangeDetector, Fingerprint};
use crate::error::{ReconcileError, ReconcileResult};
use crate::health::{AppliedRuleset, Component, HealthRegistry};
use crate::nft::{RuleApplier, Ruleset};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::runtime::{RuntimeConnector, RuntimeService};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Timing of the reconciliation loop
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Tick period (default: 1 second)
    pub interval: Duration,
    /// Budget for all runtime queries of one cycle (default: 5 seconds)
    pub cycle_timeout: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            cycle_timeout: Duration::from_secs(5),
        }
    }
}

/// Runtime connection state
pub enum Connection {
    Disconnected,
    Connected(Arc<dyn RuntimeService>),
}

impl Connection {
    pub fn is_connected(&self) -> bool {
        matches!(self, Connection::Connected(_))
    }
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No runtime connection could be established
    Disconnected,
    /// The cycle stopped before applying anything
    Aborted,
    /// The desired ruleset is already applied
    Unchanged,
    /// A new ruleset was applied
    Applied,
}

impl TickOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickOutcome::Disconnected => "disconnected",
            TickOutcome::Aborted => "aborted",
            TickOutcome::Unchanged => "unchanged",
            TickOutcome::Applied => "applied",
        }
    }
}

/// Keeps the host's nftables table in sync with running containers
pub struct Reconciler {
    connector: Arc<dyn RuntimeConnector>,
    applier: Arc<dyn RuleApplier>,
    config: ReconcileConfig,
    connection: Connection,
    detector: ChangeDetector,
    health: HealthRegistry,
    metrics: AgentMetrics,
    logger: StructuredLogger,
}

impl Reconciler {
    /// Create a reconciler in the disconnected state
    pub fn new(
        connector: Arc<dyn RuntimeConnector>,
        applier: Arc<dyn RuleApplier>,
        config: ReconcileConfig,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            connector,
            applier,
            config,
            connection: Connection::Disconnected,
            detector: ChangeDetector::new(),
            health,
            metrics: AgentMetrics::new(),
            logger,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Fingerprint of the last ruleset applied by this instance
    pub fn applied_fingerprint(&self) -> Option<Fingerprint> {
        self.detector.applied()
    }

    /// Run until shutdown is signalled or an apply error occurs
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> ReconcileResult<()> {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            cycle_timeout_ms = self.config.cycle_timeout.as_millis() as u64,
            endpoint = %self.connector.endpoint(),
            "Starting reconciliation loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        result = self.tick() => {
                            if let Err(e) = result {
                                error!(error = %e, "Fatal reconciliation error");
                                return Err(e);
                            }
                        }
                        _ = shutdown.recv() => break,
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        info!("Shutting down reconciliation loop");
        Ok(())
    }

    /// Run one tick: connect if needed, then reconcile once.
    ///
    /// Only fatal errors are returned; everything else is logged and
    /// reported through the outcome.
    pub async fn tick(&mut self) -> ReconcileResult<TickOutcome> {
        let start = Instant::now();
        let result = self.reconcile().await;
        self.metrics
            .observe_cycle_duration(start.elapsed().as_secs_f64());

        if let Ok(outcome) = &result {
            self.metrics.inc_cycle(outcome.as_str());
            debug!(
                outcome = outcome.as_str(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Reconciliation cycle complete"
            );
        }

        result
    }

    async fn reconcile(&mut self) -> ReconcileResult<TickOutcome> {
        let Some(runtime) = self.ensure_connected().await else {
            return Ok(TickOutcome::Disconnected);
        };

        let ruleset = match desired_ruleset(runtime.as_ref(), self.config.cycle_timeout).await {
            Ok(ruleset) => ruleset,
            Err(e) => {
                self.abort_cycle(e).await;
                return Ok(TickOutcome::Aborted);
            }
        };

        let fingerprint = Fingerprint::of(ruleset.text());
        if self.detector.is_current(fingerprint) {
            return Ok(TickOutcome::Unchanged);
        }

        self.apply(&ruleset, fingerprint).await?;
        Ok(TickOutcome::Applied)
    }

    async fn apply(&mut self, ruleset: &Ruleset, fingerprint: Fingerprint) -> ReconcileResult<()> {
        debug!(fingerprint = %fingerprint, "Applying ruleset");

        if let Err(e) = self.applier.apply(ruleset.text()).await {
            error!(error = %e, input = %ruleset.text(), "nft failed");
            self.health
                .set_unhealthy(Component::RuleApplier, e.to_string())
                .await;
            return Err(e.into());
        }

        self.detector.record_applied(fingerprint);
        self.metrics
            .record_apply(ruleset.tcp_entries(), ruleset.udp_entries());
        self.logger.log_rules_applied(
            &fingerprint.to_string(),
            ruleset.tcp_entries(),
            ruleset.udp_entries(),
        );
        self.health.set_healthy(Component::RuleApplier).await;
        self.health
            .record_applied(AppliedRuleset::new(
                fingerprint.to_string(),
                ruleset.tcp_entries(),
                ruleset.udp_entries(),
            ))
            .await;

        Ok(())
    }

    /// Return the live connection, dialing if disconnected
    async fn ensure_connected(&mut self) -> Option<Arc<dyn RuntimeService>> {
        if let Connection::Connected(runtime) = &self.connection {
            return Some(Arc::clone(runtime));
        }

        let endpoint = self.connector.endpoint().to_string();
        let result = tokio::time::timeout(self.config.cycle_timeout, self.connector.connect()).await;

        let error = match result {
            Ok(Ok(runtime)) => {
                self.connection = Connection::Connected(Arc::clone(&runtime));
                self.metrics.set_runtime_connected(true);
                self.logger.log_runtime_connection(&endpoint, true, None);
                self.health.set_healthy(Component::RuntimeClient).await;
                return Some(runtime);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("connect timed out after {:?}", self.config.cycle_timeout),
        };

        error!(
            runtime_endpoint = %endpoint,
            error = %error,
            "Failed to connect to CRI container runtime service"
        );
        self.health
            .set_degraded(Component::RuntimeClient, error)
            .await;
        None
    }

    async fn abort_cycle(&mut self, error: ReconcileError) {
        if error.requires_reconnect() {
            self.disconnect(&error).await;
        } else {
            self.logger.log_cycle_aborted(&error.to_string());
        }
    }

    async fn disconnect(&mut self, error: &ReconcileError) {
        // Dropping the handle closes the underlying channel.
        self.connection = Connection::Disconnected;
        self.metrics.set_runtime_connected(false);
        self.logger.log_runtime_connection(
            self.connector.endpoint(),
            false,
            Some(&error.to_string()),
        );
        self.health
            .set_degraded(Component::RuntimeClient, error.to_string())
            .await;
    }
}

/// Builder for creating the reconciler
pub struct ReconcilerBuilder {
    connector: Option<Arc<dyn RuntimeConnector>>,
    applier: Option<Arc<dyn RuleApplier>>,
    config: ReconcileConfig,
    health: Option<HealthRegistry>,
    node_name: String,
}

impl ReconcilerBuilder {
    /// Create a new builder with default timing
    pub fn new() -> Self {
        Self {
            connector: None,
            applier: None,
            config: ReconcileConfig::default(),
            health: None,
            node_name: "unknown".to_string(),
        }
    }

    /// Set the runtime connector
    pub fn connector(mut self, connector: Arc<dyn RuntimeConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Set the rule applier
    pub fn applier(mut self, applier: Arc<dyn RuleApplier>) -> Self {
        self.applier = Some(applier);
        self
    }

    /// Set the tick period
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the per-cycle query deadline
    pub fn cycle_timeout(mut self, timeout: Duration) -> Self {
        self.config.cycle_timeout = timeout;
        self
    }

    /// Share a health registry with the API server
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Node name attached to structured log events
    pub fn node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    /// Build the reconciler
    pub fn build(self) -> anyhow::Result<Reconciler> {
        let connector = self
            .connector
            .ok_or_else(|| anyhow::anyhow!("Runtime connector is required"))?;
        let applier = self
            .applier
            .ok_or_else(|| anyhow::anyhow!("Rule applier is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Reconcile interval must be non-zero");
        }

        Ok(Reconciler::new(
            connector,
            applier,
            self.config,
            self.health.unwrap_or_default(),
            StructuredLogger::new(self.node_name),
        ))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
