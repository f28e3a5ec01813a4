//! The secured remote session: an ssh child forwarding a local port to the
//! Docker control socket on the stack's control host.
//!
//! Fleet hosts are ephemeral autoscaling-group members, so host-key
//! verification is disabled on purpose. The remote command echoes a
//! readiness sentinel and then blocks on `cat`, which holds the session
//! open against our piped stdin until the child is killed.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use crate::error::{FleetError, Result};

/// Binary the tunnel is spawned from.
pub const SSH_BINARY: &str = "ssh";
/// Port the Docker daemon listens on inside the fleet.
const REMOTE_DOCKER_PORT: u16 = 2375;
/// Login user baked into the fleet host images.
const SSH_USER: &str = "ubuntu";
/// Line the remote end prints once the forwarding is live.
const READY_SENTINEL: &str = "TUNNEL_READY";
/// How long to wait for the sentinel before giving up on the tunnel.
const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// A live forwarding session. The child is spawned with `kill_on_drop`, so
/// the process dies on every exit path even if [`Tunnel::close`] is never
/// reached; callers still close explicitly so stderr gets drained.
///
/// Callers must not overlap two sessions on the same local port.
#[derive(Debug)]
pub struct Tunnel {
    child: Child,
    stderr: Option<ChildStderr>,
    local_port: u16,
}

impl Tunnel {
    /// Open a tunnel to `control_host`, publishing the remote Docker socket
    /// on `127.0.0.1:<local_port>`. Returns only once the readiness
    /// sentinel has been observed; a silent or dying ssh process is an
    /// explicit error, never an unbounded wait.
    pub async fn open(control_host: &str, local_port: u16, identity: Option<&Path>) -> Result<Self> {
        let mut command = Command::new(SSH_BINARY);
        command.args(ssh_args(control_host, local_port, identity));
        Self::establish(command, control_host, local_port, READY_TIMEOUT).await
    }

    async fn establish(
        mut command: Command,
        control_host: &str,
        local_port: u16,
        ready_timeout: Duration,
    ) -> Result<Self> {
        log::debug!("spawning tunnel: {command:?}");
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut lines = stdout.map(|s| BufReader::new(s).lines());
        let tunnel = Tunnel {
            child,
            stderr,
            local_port,
        };

        let sentinel = async {
            let Some(lines) = lines.as_mut() else {
                return Ok(false);
            };
            while let Some(line) = lines.next_line().await? {
                if line.trim() == READY_SENTINEL {
                    return Ok(true);
                }
                log::debug!("ssh: {line}");
            }
            Ok::<bool, std::io::Error>(false)
        };

        match tokio::time::timeout(ready_timeout, sentinel).await {
            Ok(Ok(true)) => {
                log::debug!("tunnel to {control_host} ready on 127.0.0.1:{local_port}");
                Ok(tunnel)
            }
            Ok(Ok(false)) => {
                tunnel.close().await;
                Err(FleetError::TunnelClosed)
            }
            Ok(Err(e)) => {
                tunnel.close().await;
                Err(e.into())
            }
            Err(_) => {
                tunnel.close().await;
                Err(FleetError::TunnelTimeout {
                    host: control_host.to_string(),
                    timeout_secs: ready_timeout.as_secs(),
                })
            }
        }
    }

    /// Local port the remote Docker socket is published on.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Control-channel address in the form docker-compose expects.
    pub fn compose_host(&self) -> String {
        format!("tcp://127.0.0.1:{}", self.local_port)
    }

    /// Tear the session down: kill the forwarding process, then surface its
    /// stderr at debug level. ssh noise is diagnostics, never an error.
    pub async fn close(mut self) {
        if let Err(e) = self.child.kill().await {
            log::debug!("failed to kill tunnel process: {e}");
        }
        if let Some(stderr) = self.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::debug!("ssh: {line}");
            }
        }
    }
}

fn ssh_args(control_host: &str, local_port: u16, identity: Option<&Path>) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
        "-L".to_string(),
        format!("{local_port}:127.0.0.1:{REMOTE_DOCKER_PORT}"),
    ];
    if let Some(identity) = identity {
        args.push("-i".to_string());
        args.push(identity.display().to_string());
    }
    args.push(format!("{SSH_USER}@{control_host}"));
    args.push(format!("echo {READY_SENTINEL} && cat"));
    args
}
