use std::collections::BTreeMap;

use crate::error::{FleetError, Result};
use crate::templates::{RuntimeTemplate, REWARDER_PORT, VNC_PORT};

use super::{Descriptor, PortBinding, ServiceSpec, DESCRIPTOR_VERSION, REPLICA_LABEL, RUNTIME_LABEL};

/// Container-side ports every replica exposes, in binding order: VNC
/// control, VNC, rewarder control, rewarder. The allocator hands out host
/// ports four at a time to line up with this.
pub const REPLICA_CONTAINER_PORTS: [u16; 4] =
    [VNC_PORT - 1, VNC_PORT, REWARDER_PORT - 1, REWARDER_PORT];

/// Relative CPU weight for runtimes whose template carries no hint.
pub const DEFAULT_CPU_SHARES: u32 = 4;

/// Expand a runtime template into a multi-service descriptor, one service
/// per replica. `host_ports` must hold exactly four ascending ports per
/// replica; replica `i` consumes `host_ports[4*i..4*i+4]` in order.
pub fn build(
    runtime: &str,
    template: &RuntimeTemplate,
    replicas: usize,
    host_ports: &[u16],
) -> Result<Descriptor> {
    let wanted = replicas * REPLICA_CONTAINER_PORTS.len();
    if host_ports.len() != wanted {
        return Err(FleetError::InsufficientPorts {
            requested: wanted,
            found: host_ports.len(),
        });
    }

    let cpu_shares = template
        .cpu_share_hint
        .map(|hint| hint.ceil() as u32)
        .unwrap_or(DEFAULT_CPU_SHARES);

    let mut services = BTreeMap::new();
    for (index, chunk) in host_ports.chunks_exact(REPLICA_CONTAINER_PORTS.len()).enumerate() {
        let ports = chunk
            .iter()
            .zip(REPLICA_CONTAINER_PORTS)
            .map(|(&host, container)| PortBinding { host, container })
            .collect();

        let mut labels = BTreeMap::new();
        labels.insert(RUNTIME_LABEL.to_string(), runtime.to_string());
        labels.insert(REPLICA_LABEL.to_string(), index.to_string());

        services.insert(
            format!("{}-{}", runtime, index),
            ServiceSpec {
                image: template.image.to_string(),
                command: template.command.map(str::to_string),
                cap_add: template.capabilities.iter().map(|s| s.to_string()).collect(),
                ipc: template.ipc_mode.map(str::to_string),
                cpu_shares,
                ports,
                labels,
            },
        );
    }

    Ok(Descriptor {
        version: DESCRIPTOR_VERSION.to_string(),
        services,
    })
}
