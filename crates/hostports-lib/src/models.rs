//! Core data models for the host port agent

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

use crate::proto;

/// Snapshot of a container as reported by the runtime for one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
    pub pod_sandbox_id: String,
    /// Creation time in nanoseconds since the epoch
    pub created_at: i64,
    pub annotations: HashMap<String, String>,
}

impl From<proto::Container> for ContainerRecord {
    fn from(container: proto::Container) -> Self {
        Self {
            name: container.metadata.map(|m| m.name).unwrap_or_default(),
            id: container.id,
            pod_sandbox_id: container.pod_sandbox_id,
            created_at: container.created_at,
            annotations: container.annotations,
        }
    }
}

/// Network identity of a pod sandbox
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodNetwork {
    /// Primary address followed by any additional addresses
    pub ips: Vec<String>,
}

impl PodNetwork {
    /// First address that parses as IPv4, if any
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.ips.iter().find_map(|ip| ip.parse::<Ipv4Addr>().ok())
    }
}

impl From<proto::PodSandboxStatusResponse> for PodNetwork {
    fn from(response: proto::PodSandboxStatusResponse) -> Self {
        let Some(network) = response.status.and_then(|s| s.network) else {
            return Self::default();
        };

        let mut ips = Vec::with_capacity(1 + network.additional_ips.len());
        if !network.ip.is_empty() {
            ips.push(network.ip);
        }
        ips.extend(
            network
                .additional_ips
                .into_iter()
                .map(|p| p.ip)
                .filter(|ip| !ip.is_empty()),
        );

        Self { ips }
    }
}

/// Transport protocol of a declared port
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
    /// SCTP, or no protocol at all; never forwarded
    #[default]
    #[serde(other)]
    Unsupported,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A port declared by a container, as serialized by kubelet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    #[serde(rename = "HostPort", alias = "hostPort", default)]
    pub host_port: u16,
    #[serde(rename = "ContainerPort", alias = "containerPort", default)]
    pub container_port: u16,
    #[serde(rename = "Protocol", alias = "protocol", default)]
    pub protocol: Protocol,
}

impl PortMapping {
    /// Host port to listen on; zero means "same as the container port"
    pub fn effective_host_port(&self) -> u16 {
        if self.host_port == 0 {
            self.container_port
        } else {
            self.host_port
        }
    }
}

/// One DNAT map element: `host_port -> pod_ip:container_port`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostPortEntry {
    pub protocol: Protocol,
    pub host_port: u16,
    pub pod_ip: Ipv4Addr,
    pub container_port: u16,
}
