//! Correlates live containers with cloud inventory to produce the
//! externally dialable endpoint of every replica.

use std::collections::HashMap;
use std::fmt;

use reqwest::Client;

use crate::cloud::{self, Stack, WorkerInstance};
use crate::docker::{self, ContainerRecord};
use crate::error::Result;
use crate::templates::{REWARDER_PORT, VNC_PORT};

/// Scheme endpoints are printed with.
pub const ENDPOINT_SCHEME: &str = "vnc";

/// Where one replica can be reached from outside the fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub public_host: String,
    pub vnc_port: u16,
    pub rewarder_port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{}+{}",
            ENDPOINT_SCHEME, self.public_host, self.vnc_port, self.rewarder_port
        )
    }
}

/// Resolve every replica of a runtime into an endpoint: list its containers
/// through the tunnel, map the fleet's private addresses to public ones,
/// and join the two.
pub async fn resolve(
    client: &Client,
    docker_port: u16,
    stack: &Stack,
    runtime: &str,
) -> Result<Vec<Endpoint>> {
    let records = docker::runtime_containers(client, docker_port, runtime).await?;
    log::debug!("{} containers labeled runtime '{}'", records.len(), runtime);
    let fleet = cloud::running_instances(stack).await?;
    log::debug!("{} running workers in group '{}'", fleet.len(), stack.fleet_group);
    Ok(correlate(records, &fleet))
}

/// Join container records against the fleet map. A container that lacks one
/// of the two required ports, carries no origin address, or landed on an
/// unknown or address-less instance costs only its own endpoint: it is
/// warned about and skipped, the rest still resolve. Output order follows
/// the input records.
pub fn correlate(
    records: Vec<ContainerRecord>,
    fleet: &HashMap<String, WorkerInstance>,
) -> Vec<Endpoint> {
    let mut endpoints = Vec::with_capacity(records.len());
    for record in records {
        let Some(vnc_port) = record.host_port_for(VNC_PORT) else {
            log::warn!(
                "container '{}' publishes no VNC port, skipping",
                record.service_name
            );
            continue;
        };
        let Some(rewarder_port) = record.host_port_for(REWARDER_PORT) else {
            log::warn!(
                "container '{}' publishes no rewarder port, skipping",
                record.service_name
            );
            continue;
        };
        let Some(origin) = record.origin_host.as_deref() else {
            log::warn!(
                "container '{}' carries no origin address, skipping",
                record.service_name
            );
            continue;
        };
        let Some(instance) = fleet.get(origin) else {
            log::warn!(
                "container '{}' on {} matches no running fleet instance, skipping",
                record.service_name,
                origin
            );
            continue;
        };
        let Some(public_host) = instance.public_ip.clone() else {
            log::warn!(
                "instance {} ({}) has no public address, skipping container '{}'",
                instance.instance_id,
                origin,
                record.service_name
            );
            continue;
        };
        endpoints.push(Endpoint {
            public_host,
            vnc_port,
            rewarder_port,
        });
    }
    endpoints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::PublishedPort;

    fn record(service: &str, origin: Option<&str>, ports: &[(u16, u16)]) -> ContainerRecord {
        ContainerRecord {
            service_name: service.to_string(),
            labels: Default::default(),
            ports: ports
                .iter()
                .map(|&(container, host)| PublishedPort { container, host })
                .collect(),
            origin_host: origin.map(str::to_string),
        }
    }

    fn worker(id: &str, private_ip: &str, public_ip: Option<&str>) -> (String, WorkerInstance) {
        (
            private_ip.to_string(),
            WorkerInstance {
                instance_id: id.to_string(),
                private_ip: private_ip.to_string(),
                public_ip: public_ip.map(str::to_string),
            },
        )
    }

    #[test]
    fn replicas_resolve_to_public_addresses_in_input_order() {
        let fleet: HashMap<_, _> = [
            worker("i-0abc", "172.31.12.13", Some("54.210.9.7")),
            worker("i-0def", "172.31.12.14", Some("54.210.9.8")),
        ]
        .into_iter()
        .collect();

        let records = vec![
            record(
                "flashgames-1",
                Some("172.31.12.14"),
                &[(5899, 5004), (5900, 5005), (15899, 5006), (15900, 5007)],
            ),
            record(
                "flashgames-0",
                Some("172.31.12.13"),
                &[(5899, 5000), (5900, 5001), (15899, 5002), (15900, 5003)],
            ),
        ];

        let endpoints = correlate(records, &fleet);
        assert_eq!(
            endpoints,
            vec![
                Endpoint {
                    public_host: "54.210.9.8".to_string(),
                    vnc_port: 5005,
                    rewarder_port: 5007,
                },
                Endpoint {
                    public_host: "54.210.9.7".to_string(),
                    vnc_port: 5001,
                    rewarder_port: 5003,
                },
            ]
        );
    }

    #[test]
    fn missing_rewarder_port_skips_only_that_container() {
        let fleet: HashMap<_, _> = [worker("i-0abc", "172.31.12.13", Some("54.210.9.7"))]
            .into_iter()
            .collect();

        let records = vec![
            record("flashgames-0", Some("172.31.12.13"), &[(5900, 5001)]),
            record(
                "flashgames-1",
                Some("172.31.12.13"),
                &[(5900, 5005), (15900, 5007)],
            ),
        ];

        let endpoints = correlate(records, &fleet);
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].vnc_port, 5005);
    }

    #[test]
    fn unknown_origin_address_is_an_orphan_not_a_failure() {
        let fleet: HashMap<_, _> = [worker("i-0abc", "172.31.12.13", Some("54.210.9.7"))]
            .into_iter()
            .collect();

        let records = vec![
            // Landed on a node the inventory no longer reports.
            record(
                "flashgames-0",
                Some("172.31.99.99"),
                &[(5900, 5001), (15900, 5003)],
            ),
            record("flashgames-1", None, &[(5900, 5005), (15900, 5007)]),
            record(
                "flashgames-2",
                Some("172.31.12.13"),
                &[(5900, 5008), (15900, 5009)],
            ),
        ];

        let endpoints = correlate(records, &fleet);
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].public_host, "54.210.9.7");
    }

    #[test]
    fn instance_without_a_public_address_is_skipped() {
        let fleet: HashMap<_, _> = [worker("i-0abc", "172.31.12.13", None)]
            .into_iter()
            .collect();

        let records = vec![record(
            "flashgames-0",
            Some("172.31.12.13"),
            &[(5900, 5001), (15900, 5003)],
        )];

        assert!(correlate(records, &fleet).is_empty());
    }

    #[test]
    fn endpoints_print_as_vnc_uris() {
        let endpoint = Endpoint {
            public_host: "54.210.9.7".to_string(),
            vnc_port: 5001,
            rewarder_port: 5003,
        };
        assert_eq!(endpoint.to_string(), "vnc://54.210.9.7:5001+5003");
    }
}
