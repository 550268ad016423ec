//! nftables ruleset generation and application
//!
//! The whole `container-hostports` table is regenerated from scratch every
//! cycle and replaced in a single `nft -f` transaction. The text begins by
//! declaring and deleting the table, so nothing from a previous revision can
//! survive even if the table layout changes.

mod applier;

pub use applier::{NftApplier, RuleApplier};

use crate::models::{ContainerRecord, HostPortEntry, Protocol};
use std::collections::HashSet;
use std::fmt::Write;
use tracing::warn;

/// Name of the nftables table owned by the agent
pub const TABLE_NAME: &str = "container-hostports";

/// Sort containers into canonical order: creation time, then id
pub fn sort_containers(containers: &mut [ContainerRecord]) {
    containers.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// A rendered ruleset plus per-protocol entry counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ruleset {
    text: String,
    tcp_entries: usize,
    udp_entries: usize,
}

impl Ruleset {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tcp_entries(&self) -> usize {
        self.tcp_entries
    }

    pub fn udp_entries(&self) -> usize {
        self.udp_entries
    }
}

/// Accumulates DNAT entries in insertion order
#[derive(Debug, Default)]
pub struct RulesetBuilder {
    tcp: Vec<HostPortEntry>,
    udp: Vec<HostPortEntry>,
    claimed: HashSet<(Protocol, u16)>,
}

impl RulesetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. A host port already claimed for the same protocol is
    /// dropped: nft rejects duplicate map keys.
    pub fn push(&mut self, entry: HostPortEntry) {
        let list = match entry.protocol {
            Protocol::Tcp => &mut self.tcp,
            Protocol::Udp => &mut self.udp,
            Protocol::Unsupported => return,
        };

        if !self.claimed.insert((entry.protocol, entry.host_port)) {
            warn!(
                protocol = %entry.protocol,
                host_port = entry.host_port,
                pod_ip = %entry.pod_ip,
                container_port = entry.container_port,
                "Host port already forwarded, ignoring duplicate"
            );
            return;
        }

        list.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = HostPortEntry>) {
        for entry in entries {
            self.push(entry);
        }
    }

    /// Render the ruleset text
    pub fn build(&self) -> Ruleset {
        let mut text = String::with_capacity(512 + 48 * (self.tcp.len() + self.udp.len()));

        // `table ... {}` first so the delete cannot fail on a fresh host.
        let _ = writeln!(text, "table {} {{}}", TABLE_NAME);
        let _ = writeln!(text, "delete table {};", TABLE_NAME);
        let _ = writeln!(text, "table {} {{", TABLE_NAME);
        text.push_str("  chain prerouting {\n");
        text.push_str("    type nat hook prerouting priority filter; policy accept;\n");
        for (protocol, entries) in self.maps() {
            if !entries.is_empty() {
                let _ = writeln!(
                    text,
                    "    fib daddr type local dnat to {} dport map @{};",
                    protocol,
                    map_name(protocol)
                );
            }
        }
        text.push_str("  }\n");

        for (protocol, entries) in self.maps() {
            if entries.is_empty() {
                continue;
            }
            let _ = writeln!(text, "  map {} {{", map_name(protocol));
            text.push_str("    type inet_service : ipv4_addr . inet_service;\n");
            text.push_str("    elements = {\n");
            for entry in entries {
                let _ = writeln!(
                    text,
                    "      {} : {} . {},",
                    entry.host_port, entry.pod_ip, entry.container_port
                );
            }
            text.push_str("    }\n");
            text.push_str("  }\n");
        }

        text.push_str("}\n");

        Ruleset {
            text,
            tcp_entries: self.tcp.len(),
            udp_entries: self.udp.len(),
        }
    }

    fn maps(&self) -> [(Protocol, &[HostPortEntry]); 2] {
        [
            (Protocol::Tcp, self.tcp.as_slice()),
            (Protocol::Udp, self.udp.as_slice()),
        ]
    }
}

fn map_name(protocol: Protocol) -> String {
    format!("host-ports-{}", protocol)
}
