//! Built-in runtime templates, keyed by runtime identifier.

/// Container-side VNC port every runtime image exposes.
pub const VNC_PORT: u16 = 5900;
/// Container-side rewarder port every runtime image exposes.
pub const REWARDER_PORT: u16 = 15900;

/// Immutable description of one runtime kind: the image to run and the
/// settings every replica of it shares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeTemplate {
    pub image: &'static str,
    pub command: Option<&'static str>,
    pub capabilities: &'static [&'static str],
    pub ipc_mode: Option<&'static str>,
    /// CPU share hint; replicas get the ceiling of this, default 4.
    pub cpu_share_hint: Option<f64>,
}

/// Look up the template for a runtime identifier.
pub fn lookup(runtime: &str) -> Option<RuntimeTemplate> {
    match runtime {
        "flashgames" => Some(RuntimeTemplate {
            image: "quay.io/fleetenv/flashgames:0.20",
            command: None,
            capabilities: &["SYS_ADMIN"],
            ipc_mode: Some("host"),
            cpu_share_hint: None,
        }),
        "world-of-bits" => Some(RuntimeTemplate {
            image: "quay.io/fleetenv/world-of-bits:0.20",
            command: Some("supervisord"),
            capabilities: &["SYS_ADMIN", "NET_ADMIN"],
            ipc_mode: Some("host"),
            cpu_share_hint: Some(1.5),
        }),
        "gym-core" => Some(RuntimeTemplate {
            image: "quay.io/fleetenv/gym-core:0.20",
            command: None,
            capabilities: &[],
            ipc_mode: None,
            cpu_share_hint: Some(1.0),
        }),
        _ => None,
    }
}
