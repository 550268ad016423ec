//! Port-mapping extraction
//!
//! Turns a container record into the DNAT entries it needs: declared ports
//! come from the kubelet ports annotation, the target address from the
//! owning pod sandbox's network status.

use crate::error::{ReconcileError, ReconcileResult};
use crate::models::{ContainerRecord, HostPortEntry, PortMapping, Protocol};
use crate::runtime::RuntimeService;
use tracing::{debug, error};

/// Annotation kubelet uses to record a container's declared ports
pub const PORTS_ANNOTATION: &str = "io.kubernetes.container.ports";

/// Parse the declared ports of a container.
///
/// Returns `Ok(None)` when the annotation is absent, empty, or holds an
/// empty list.
pub fn declared_ports(container: &ContainerRecord) -> ReconcileResult<Option<Vec<PortMapping>>> {
    let raw = match container.annotations.get(PORTS_ANNOTATION) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(None),
    };

    let ports: Vec<PortMapping> =
        serde_json::from_str(raw).map_err(|source| ReconcileError::InvalidPorts {
            container_id: container.id.clone(),
            source,
        })?;

    if ports.is_empty() {
        return Ok(None);
    }

    Ok(Some(ports))
}

/// Resolve all forwarding entries for one container.
///
/// An unparsable annotation or a failed pod status query is an error; the
/// caller aborts the whole cycle rather than building a partial ruleset.
pub async fn extract_entries(
    runtime: &dyn RuntimeService,
    container: &ContainerRecord,
) -> ReconcileResult<Vec<HostPortEntry>> {
    let ports = match declared_ports(container) {
        Ok(Some(ports)) => ports,
        Ok(None) => return Ok(Vec::new()),
        Err(e) => {
            error!(
                container_id = %container.id,
                container_name = %container.name,
                error = %e,
                "Invalid container ports"
            );
            return Err(e);
        }
    };

    let network = match runtime.pod_network(&container.pod_sandbox_id).await {
        Ok(network) => network,
        Err(e) => {
            error!(
                container_id = %container.id,
                container_name = %container.name,
                pod_sandbox_id = %container.pod_sandbox_id,
                error = %e,
                "Failed to get pod status"
            );
            return Err(e.into());
        }
    };

    let Some(pod_ip) = network.ipv4() else {
        debug!(
            container_id = %container.id,
            pod_sandbox_id = %container.pod_sandbox_id,
            "Pod has no IPv4 address, skipping"
        );
        return Ok(Vec::new());
    };

    Ok(ports
        .iter()
        .filter(|port| port.protocol != Protocol::Unsupported)
        .map(|port| HostPortEntry {
            protocol: port.protocol,
            host_port: port.effective_host_port(),
            pod_ip,
            container_port: port.container_port,
        })
        .collect())
}
