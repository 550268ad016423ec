//! Observability infrastructure for the host port agent
//!
//! Provides:
//! - Prometheus metrics (cycle latency, outcomes, applies, forwarded ports, runtime connection)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for cycle latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct AgentMetricsInner {
    cycle_duration_seconds: Histogram,
    cycles_total: IntCounterVec,
    rule_applies_total: IntCounter,
    forwarded_ports: IntGaugeVec,
    runtime_connected: IntGauge,
    runtime_connects_total: IntCounter,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "cri_hostports_cycle_duration_seconds",
                "Time spent in one reconciliation cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            cycles_total: register_int_counter_vec!(
                "cri_hostports_cycles_total",
                "Reconciliation cycles by outcome",
                &["outcome"]
            )
            .expect("Failed to register cycles_total"),

            rule_applies_total: register_int_counter!(
                "cri_hostports_rule_applies_total",
                "Number of rulesets handed to nft"
            )
            .expect("Failed to register rule_applies_total"),

            forwarded_ports: register_int_gauge_vec!(
                "cri_hostports_forwarded_ports",
                "Host ports forwarded by the applied ruleset",
                &["protocol"]
            )
            .expect("Failed to register forwarded_ports"),

            runtime_connected: register_int_gauge!(
                "cri_hostports_runtime_connected",
                "Whether the agent holds a runtime connection (1) or not (0)"
            )
            .expect("Failed to register runtime_connected"),

            runtime_connects_total: register_int_counter!(
                "cri_hostports_runtime_connects_total",
                "Successful runtime connection attempts"
            )
            .expect("Failed to register runtime_connects_total"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record how long a cycle took
    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner().cycle_duration_seconds.observe(duration_secs);
    }

    /// Count a finished cycle under its outcome label
    pub fn inc_cycle(&self, outcome: &str) {
        self.inner().cycles_total.with_label_values(&[outcome]).inc();
    }

    /// Record a successful apply and the resulting port counts
    pub fn record_apply(&self, tcp_ports: usize, udp_ports: usize) {
        let inner = self.inner();
        inner.rule_applies_total.inc();
        inner
            .forwarded_ports
            .with_label_values(&["tcp"])
            .set(tcp_ports as i64);
        inner
            .forwarded_ports
            .with_label_values(&["udp"])
            .set(udp_ports as i64);
    }

    /// Update the connection gauge
    pub fn set_runtime_connected(&self, connected: bool) {
        self.inner().runtime_connected.set(i64::from(connected));
        if connected {
            self.inner().runtime_connects_total.inc();
        }
    }
}

/// Structured logger for agent events
///
/// Emits event-typed lines so log pipelines can filter on `event`.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, runtime_endpoint: &str) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            runtime_endpoint = %runtime_endpoint,
            "Host port agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Host port agent shutting down"
        );
    }

    /// Log a runtime connection change
    pub fn log_runtime_connection(&self, endpoint: &str, connected: bool, error: Option<&str>) {
        if connected {
            info!(
                event = "runtime_connected",
                node = %self.node_name,
                endpoint = %endpoint,
                "Runtime connection established"
            );
        } else {
            error!(
                event = "runtime_disconnected",
                node = %self.node_name,
                endpoint = %endpoint,
                error = error.unwrap_or("unknown"),
                "Runtime connection lost"
            );
        }
    }

    /// Log a ruleset that reached the kernel
    pub fn log_rules_applied(&self, fingerprint: &str, tcp_ports: usize, udp_ports: usize) {
        info!(
            event = "rules_applied",
            node = %self.node_name,
            fingerprint = %fingerprint,
            tcp_ports = tcp_ports,
            udp_ports = udp_ports,
            "New nft rules applied"
        );
    }

    /// Log an aborted cycle
    pub fn log_cycle_aborted(&self, reason: &str) {
        warn!(
            event = "cycle_aborted",
            node = %self.node_name,
            reason = %reason,
            "Reconciliation cycle aborted, keeping current rules"
        );
    }
}
