//! Applies and removes deployment descriptors through the external
//! `docker-compose` binary, pointed at the tunnel's control-channel address.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{FleetError, Result};

/// Binary the descriptor is applied with.
pub const COMPOSE_BINARY: &str = "docker-compose";

/// Bring the descriptor's services up, removing services that no longer
/// appear in it.
pub async fn up(compose_host: &str, descriptor: &Path) -> Result<()> {
    apply("up", compose_host, descriptor).await
}

/// Take the descriptor's services down, removing orphans as well.
pub async fn down(compose_host: &str, descriptor: &Path) -> Result<()> {
    apply("down", compose_host, descriptor).await
}

async fn apply(verb: &'static str, compose_host: &str, descriptor: &Path) -> Result<()> {
    let args = compose_args(verb, compose_host, descriptor);
    log::debug!("{} {}", COMPOSE_BINARY, args.join(" "));
    let mut command = Command::new(COMPOSE_BINARY);
    command.args(&args);
    apply_with(command, verb).await?;
    log::info!("docker-compose {verb} finished for {}", descriptor.display());
    Ok(())
}

async fn apply_with(mut command: Command, verb: &'static str) -> Result<()> {
    // Inherited stdio keeps the tool's own diagnostics visible to the
    // operator while it runs.
    let status = command
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await?;

    if !status.success() {
        return Err(FleetError::Apply { verb, status });
    }
    Ok(())
}

fn compose_args(verb: &str, compose_host: &str, descriptor: &Path) -> Vec<String> {
    let mut args = vec![
        "--host".to_string(),
        compose_host.to_string(),
        "--file".to_string(),
        descriptor.display().to_string(),
        verb.to_string(),
    ];
    if verb == "up" {
        args.push("-d".to_string());
    }
    args.push("--remove-orphans".to_string());
    args
}
