use std::path::PathBuf;

use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use console::Emoji;
use reqwest::Client;

use crate::cloud::{self, Stack};
use crate::descriptor;
use crate::docker;
use crate::driver;
use crate::endpoints::{self, Endpoint};
use crate::error::FleetError;
use crate::ports;
use crate::templates::{self, RuntimeTemplate};
use crate::tunnel::{self, Tunnel};
use crate::{check_binaries, default_spinner};

static ROCKET: Emoji = Emoji("🚀 ", "");
static GLOBE: Emoji = Emoji("🌐 ", "");
static LINK: Emoji = Emoji("🔗 ", "");

/// External tools `start` shells out to.
const REQUIRED_BINARIES: &[&str] = &[tunnel::SSH_BINARY, driver::COMPOSE_BINARY, cloud::AWS_BINARY];

pub fn command() -> Command {
    Command::new("start")
        .about("Provision runtime replicas on a fleet stack and print their endpoints")
        .arg(
            Arg::new("stack")
                .help("Name of the fleet stack to provision onto")
                .required(true),
        )
        .arg(
            Arg::new("runtime")
                .help("Runtime identifier (e.g. 'flashgames')")
                .required(true),
        )
        .arg(
            Arg::new("replicas")
                .help("Number of replicas to provision [1-64]")
                .long("replicas")
                .short('n')
                .value_parser(clap::value_parser!(u8).range(1..=64))
                .allow_negative_numbers(false)
                .default_value("1"),
        )
        .arg(
            Arg::new("local_port")
                .help("Local port the tunnel publishes the remote Docker socket on")
                .long("local-port")
                .short('p')
                .value_parser(clap::value_parser!(u16).range(1024..))
                .default_value("12375"),
        )
        .arg(
            Arg::new("identity")
                .help("Private key file for the tunnel login")
                .long("identity")
                .short('i')
                .value_name("KEY"),
        )
}

pub async fn handle(http_client: &Client, matches: &ArgMatches) -> Result<()> {
    let stack_name = matches
        .get_one::<String>("stack")
        .expect("stack should be required");
    let runtime = matches
        .get_one::<String>("runtime")
        .expect("runtime should be required");
    let replicas = *matches.get_one::<u8>("replicas").unwrap() as usize;
    let local_port = *matches.get_one::<u16>("local_port").unwrap();
    let identity = matches.get_one::<String>("identity").map(PathBuf::from);

    let template = templates::lookup(runtime)
        .ok_or_else(|| FleetError::UnknownRuntime(runtime.clone()))?;
    check_binaries(REQUIRED_BINARIES)?;

    let progress = default_spinner();
    progress.set_prefix("Resolving stack");
    progress.set_message(format!("{GLOBE} Looking up stack '{stack_name}'..."));
    let stack = cloud::describe_stack(stack_name).await;
    progress.finish_and_clear();
    let stack = stack?;
    log::info!(
        "stack '{}' controlled from {}, workers in '{}'",
        stack.name,
        stack.control_host,
        stack.fleet_group
    );

    let progress = default_spinner();
    progress.set_prefix("Opening tunnel");
    progress.set_message(format!(
        "{LINK} Forwarding localhost:{local_port} to {}...",
        stack.control_host
    ));
    let tunnel = Tunnel::open(&stack.control_host, local_port, identity.as_deref()).await;
    progress.finish_and_clear();
    let tunnel = tunnel?;

    // docker-compose inherits our stdio from here on, so its own progress
    // stands in for a spinner. The tunnel must be closed on both paths.
    let result = provision(http_client, &tunnel, &stack, runtime, &template, replicas).await;
    tunnel.close().await;
    let resolved = result?;

    println!(
        "{}{} replica(s) of {} running on {}",
        ROCKET,
        replicas,
        console::style(runtime).bold(),
        console::style(&stack.name).cyan()
    );
    for endpoint in &resolved {
        println!("{endpoint}");
    }
    Ok(())
}

/// Everything that needs the tunnel: snapshot the fleet's containers,
/// allocate ports, build and persist the descriptor, apply it, and resolve
/// the resulting endpoints.
async fn provision(
    http_client: &Client,
    tunnel: &Tunnel,
    stack: &Stack,
    runtime: &str,
    template: &RuntimeTemplate,
    replicas: usize,
) -> crate::error::Result<Vec<Endpoint>> {
    let running = docker::running_containers(http_client, tunnel.local_port()).await?;
    let used = ports::published_ports(&running);
    log::debug!(
        "{} host ports in use across {} containers",
        used.len(),
        running.len()
    );
    let allocated = ports::allocate(&used, replicas * descriptor::REPLICA_CONTAINER_PORTS.len())?;

    let built = descriptor::build(runtime, template, replicas, &allocated)?;
    let path = descriptor::descriptor_path(runtime);
    descriptor::write(&built, &path)?;
    log::info!("descriptor for '{runtime}' written to {}", path.display());

    driver::up(&tunnel.compose_host(), &path).await?;

    endpoints::resolve(http_client, tunnel.local_port(), stack, runtime).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_runtime_is_rejected_before_any_remote_work() {
        let matches = command()
            .try_get_matches_from(["start", "fleet-prod", "minecraft"])
            .expect("arguments should parse");
        let err = handle(&Client::new(), &matches).await.unwrap_err();
        match err.downcast::<FleetError>() {
            Ok(FleetError::UnknownRuntime(runtime)) => assert_eq!(runtime, "minecraft"),
            other => panic!("expected UnknownRuntime, got {other:?}"),
        }
    }
}
