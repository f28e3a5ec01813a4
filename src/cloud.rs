//! Cloud inventory, read through the `aws` CLI.
//!
//! Two lookups feed provisioning: the stack description, whose outputs name
//! the control host and the worker autoscaling group, and the running
//! instances of that group, which map private addresses to public ones.

use std::collections::HashMap;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use crate::error::{FleetError, Result};

/// Binary cloud inventory is queried with.
pub const AWS_BINARY: &str = "aws";
/// Stack output naming the public address of the Docker control host.
pub const CONTROL_HOST_OUTPUT: &str = "ControlHostAddress";
/// Stack output naming the autoscaling group the worker fleet lives in.
pub const FLEET_GROUP_OUTPUT: &str = "FleetAutoScalingGroup";

/// One provisioned fleet stack. Parsed from a single stack description and
/// read-only for the rest of the invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack {
    pub name: String,
    pub control_host: String,
    pub fleet_group: String,
}

/// One running worker, keyed by private address in the fleet map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInstance {
    pub instance_id: String,
    pub private_ip: String,
    pub public_ip: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStacks {
    #[serde(default)]
    stacks: Vec<StackDescription>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackDescription {
    #[serde(default)]
    outputs: Vec<StackOutput>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackOutput {
    output_key: String,
    output_value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstances {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<InstanceDescription>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceDescription {
    instance_id: String,
    #[serde(default)]
    private_ip_address: Option<String>,
    #[serde(default)]
    public_ip_address: Option<String>,
}

/// Look a stack up by name. A stack the inventory does not know is fatal
/// before any remote session opens.
pub async fn describe_stack(name: &str) -> Result<Stack> {
    let output = aws(&["cloudformation", "describe-stacks", "--stack-name", name]).await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("does not exist") {
            return Err(FleetError::StackNotFound(name.to_string()));
        }
        return Err(FleetError::Inventory(format!(
            "describe-stacks failed ({}): {}",
            output.status,
            stderr.trim()
        )));
    }
    parse_stack(&String::from_utf8_lossy(&output.stdout), name)
}

/// Running members of the stack's worker group, keyed by private address.
/// Rebuilt fresh on every call; instances still booting (no private address
/// assigned yet) are left out.
pub async fn running_instances(stack: &Stack) -> Result<HashMap<String, WorkerInstance>> {
    let group_filter = format!(
        "Name=tag:aws:autoscaling:groupName,Values={}",
        stack.fleet_group
    );
    let output = aws(&[
        "ec2",
        "describe-instances",
        "--filters",
        &group_filter,
        "Name=instance-state-name,Values=running",
    ])
    .await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FleetError::Inventory(format!(
            "describe-instances failed ({}): {}",
            output.status,
            stderr.trim()
        )));
    }
    parse_instances(&String::from_utf8_lossy(&output.stdout))
}

async fn aws(args: &[&str]) -> Result<std::process::Output> {
    log::debug!("{} {} --output json", AWS_BINARY, args.join(" "));
    let output = Command::new(AWS_BINARY)
        .args(args)
        .args(["--output", "json"])
        .stdin(Stdio::null())
        .output()
        .await?;
    Ok(output)
}

fn parse_stack(raw: &str, name: &str) -> Result<Stack> {
    let response: DescribeStacks = serde_json::from_str(raw)?;
    let description = response
        .stacks
        .into_iter()
        .next()
        .ok_or_else(|| FleetError::StackNotFound(name.to_string()))?;
    Ok(Stack {
        name: name.to_string(),
        control_host: stack_output(&description, name, CONTROL_HOST_OUTPUT)?,
        fleet_group: stack_output(&description, name, FLEET_GROUP_OUTPUT)?,
    })
}

fn stack_output(description: &StackDescription, name: &str, key: &str) -> Result<String> {
    description
        .outputs
        .iter()
        .find(|output| output.output_key == key)
        .map(|output| output.output_value.clone())
        .ok_or_else(|| FleetError::Inventory(format!("stack '{name}' has no {key} output")))
}

fn parse_instances(raw: &str) -> Result<HashMap<String, WorkerInstance>> {
    let response: DescribeInstances = serde_json::from_str(raw)?;
    let mut fleet = HashMap::new();
    for reservation in response.reservations {
        for instance in reservation.instances {
            let Some(private_ip) = instance.private_ip_address else {
                log::debug!("instance {} has no private address yet", instance.instance_id);
                continue;
            };
            fleet.insert(
                private_ip.clone(),
                WorkerInstance {
                    instance_id: instance.instance_id,
                    private_ip,
                    public_ip: instance.public_ip_address,
                },
            );
        }
    }
    Ok(fleet)
}
