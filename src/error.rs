use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Everything that can abort a `start` or `stop` invocation.
///
/// All variants are fatal at this layer and none are retried; partial
/// recovery only happens inside endpoint correlation, which skips and warns
/// instead of erroring.
#[derive(Error, Debug)]
pub enum FleetError {
    #[error("no stack named '{0}' in cloud inventory")]
    StackNotFound(String),

    #[error("unknown runtime '{0}'")]
    UnknownRuntime(String),

    #[error("not enough free host ports on the fleet: needed {requested}, found {found}")]
    InsufficientPorts { requested: usize, found: usize },

    #[error("tunnel to {host} not ready after {timeout_secs}s")]
    TunnelTimeout { host: String, timeout_secs: u64 },

    #[error("tunnel process exited before signalling readiness")]
    TunnelClosed,

    #[error("docker-compose {verb} failed ({status})")]
    Apply { verb: &'static str, status: ExitStatus },

    #[error("failed to write descriptor {}: {source}", .path.display())]
    DescriptorWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no descriptor for runtime '{runtime}' at {} (was it started?)", .path.display())]
    DescriptorMissing { runtime: String, path: PathBuf },

    #[error("required binary '{0}' not found in PATH")]
    MissingBinary(&'static str),

    #[error("cloud inventory query failed: {0}")]
    Inventory(String),

    #[error("container runtime API error ({status}): {detail}")]
    Docker {
        status: reqwest::StatusCode,
        detail: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, FleetError>;
