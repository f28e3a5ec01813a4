//! Docker Engine API client, spoken through the tunneled local port.
//!
//! Fleet hosts run Swarm-style names of the form
//! `/ip-a-b-c-d/<project>_<service>_<n>`: the first segment is the EC2
//! internal hostname of the node the container landed on, which is how we
//! recover its private address without asking the cloud API per container.

use std::collections::HashMap;

use reqwest::Client;
use serde::Deserialize;

use crate::descriptor::RUNTIME_LABEL;
use crate::error::{FleetError, Result};

/// Label compose stamps on every container it creates.
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

/// A running container, reduced to what provisioning needs.
#[derive(Debug, Clone)]
pub struct ContainerRecord {
    pub service_name: String,
    pub labels: HashMap<String, String>,
    pub ports: Vec<PublishedPort>,
    /// Private address of the node this container runs on, when the
    /// container name carries one.
    pub origin_host: Option<String>,
}

/// A container port that is actually published on its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedPort {
    pub container: u16,
    pub host: u16,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerSummary {
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    labels: HashMap<String, String>,
    #[serde(default)]
    ports: Vec<PortSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PortSummary {
    private_port: u16,
    #[serde(default)]
    public_port: Option<u16>,
}

/// Every running container on the fleet, regardless of who started it.
/// Port allocation scans these so we never collide with another tenant.
pub async fn running_containers(client: &Client, docker_port: u16) -> Result<Vec<ContainerRecord>> {
    query(client, docker_port, None).await
}

/// Running containers belonging to one runtime, selected by label.
pub async fn runtime_containers(
    client: &Client,
    docker_port: u16,
    runtime: &str,
) -> Result<Vec<ContainerRecord>> {
    query(client, docker_port, Some(runtime)).await
}

async fn query(
    client: &Client,
    docker_port: u16,
    runtime: Option<&str>,
) -> Result<Vec<ContainerRecord>> {
    let url = format!("http://127.0.0.1:{}/containers/json", docker_port);
    let mut request = client.get(&url);
    if let Some(runtime) = runtime {
        let filters = serde_json::json!({
            "label": [format!("{}={}", RUNTIME_LABEL, runtime)],
        });
        request = request.query(&[("filters", filters.to_string())]);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(FleetError::Docker { status, detail });
    }

    let summaries: Vec<ContainerSummary> = response.json().await?;
    Ok(summaries.into_iter().map(ContainerRecord::from).collect())
}

impl ContainerRecord {
    /// Host port this container publishes `container_port` on, if any.
    pub fn host_port_for(&self, container_port: u16) -> Option<u16> {
        self.ports
            .iter()
            .find(|port| port.container == container_port)
            .map(|port| port.host)
    }
}

impl From<ContainerSummary> for ContainerRecord {
    fn from(summary: ContainerSummary) -> Self {
        let name = summary.names.first().map(String::as_str).unwrap_or("");
        let origin_host = origin_from_name(name);
        let service_name = summary
            .labels
            .get(COMPOSE_SERVICE_LABEL)
            .cloned()
            .unwrap_or_else(|| name.rsplit('/').next().unwrap_or(name).to_string());
        let ports = summary
            .ports
            .into_iter()
            .filter_map(|port| {
                port.public_port.map(|host| PublishedPort {
                    container: port.private_port,
                    host,
                })
            })
            .collect();

        ContainerRecord {
            service_name,
            labels: summary.labels,
            ports,
            origin_host,
        }
    }
}

/// Extract the node's private address from a container name whose first
/// segment is an EC2 internal hostname, e.g. `/ip-172-31-12-13/...`.
fn origin_from_name(name: &str) -> Option<String> {
    let node = name.trim_start_matches('/').split('/').next()?;
    let octets = node.strip_prefix("ip-")?;
    let parts: Vec<&str> = octets.split('-').collect();
    if parts.len() != 4 || parts.iter().any(|part| part.parse::<u8>().is_err()) {
        return None;
    }
    Some(parts.join("."))
}
