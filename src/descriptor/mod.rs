//! The deployment descriptor: a compose v2 document with one service per
//! replica, persisted per runtime and re-read by `stop`.

mod build;

pub use build::{build, DEFAULT_CPU_SHARES, REPLICA_CONTAINER_PORTS};

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{FleetError, Result};

/// Compose file format version the fleet hosts understand.
pub const DESCRIPTOR_VERSION: &str = "2";
/// File name of the persisted descriptor inside the runtime's state dir.
pub const DESCRIPTOR_FILE: &str = "docker-compose.yml";

/// Label carrying the runtime identifier; the join key between the
/// descriptor, the live containers, and `stop`'s targeting.
pub const RUNTIME_LABEL: &str = "fleetenv.runtime";
/// Label carrying the zero-based replica index.
pub const REPLICA_LABEL: &str = "fleetenv.replica";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub version: String,
    pub services: BTreeMap<String, ServiceSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cap_add: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipc: Option<String>,

    pub cpu_shares: u32,

    pub ports: Vec<PortBinding>,

    pub labels: BTreeMap<String, String>,
}

/// One `host:container` publication, serialized in compose string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortBinding {
    pub host: u16,
    pub container: u16,
}

impl Serialize for PortBinding {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}:{}", self.host, self.container))
    }
}

impl<'de> Deserialize<'de> for PortBinding {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct BindingVisitor;

        impl<'de> Visitor<'de> for BindingVisitor {
            type Value = PortBinding;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a 'host:container' port pair")
            }

            fn visit_str<E>(self, value: &str) -> std::result::Result<PortBinding, E>
            where
                E: de::Error,
            {
                let parts: Vec<&str> = value.splitn(2, ':').collect();
                if parts.len() != 2 {
                    return Err(de::Error::custom("port pair must contain ':'"));
                }
                let host = parts[0].parse::<u16>().map_err(de::Error::custom)?;
                let container = parts[1].parse::<u16>().map_err(de::Error::custom)?;
                Ok(PortBinding { host, container })
            }
        }

        deserializer.deserialize_str(BindingVisitor)
    }
}

/// Root of the per-runtime state directory: `$FLEETENV_HOME` when set,
/// otherwise `~/.fleetenv`.
pub fn state_dir() -> PathBuf {
    if let Ok(home) = std::env::var("FLEETENV_HOME") {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".fleetenv")
}

/// Where the descriptor for a runtime lives. `start` writes this path and
/// `stop` re-derives it; it is the only artifact shared between the two.
pub fn descriptor_path(runtime: &str) -> PathBuf {
    state_dir().join(runtime).join(DESCRIPTOR_FILE)
}

/// Serialize and persist a descriptor, creating the runtime's state
/// directory as needed and overwriting any previous file at `path`.
pub fn write(descriptor: &Descriptor, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| FleetError::DescriptorWrite {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let rendered = serde_yaml::to_string(descriptor)?;
    std::fs::write(path, rendered).map_err(|source| FleetError::DescriptorWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Re-read a previously written descriptor. A missing file means the
/// runtime was never started (or already cleaned up) and is an explicit
/// error rather than whatever the apply tool would make of it.
pub fn load(path: &Path, runtime: &str) -> Result<Descriptor> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FleetError::DescriptorMissing {
                runtime: runtime.to_string(),
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_yaml::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_binding_serializes_as_compose_string() {
        let yaml = serde_yaml::to_string(&PortBinding {
            host: 5000,
            container: 5899,
        })
        .unwrap();
        assert_eq!(serde_yaml::from_str::<String>(&yaml).unwrap(), "5000:5899");
    }

    #[test]
    fn port_binding_parses_back() {
        let binding: PortBinding = serde_yaml::from_str("\"5001:5900\"").unwrap();
        assert_eq!(
            binding,
            PortBinding {
                host: 5001,
                container: 5900
            }
        );
    }

    #[test]
    fn port_binding_rejects_malformed_pairs() {
        assert!(serde_yaml::from_str::<PortBinding>("\"5000\"").is_err());
        assert!(serde_yaml::from_str::<PortBinding>("\"vnc:5900\"").is_err());
        assert!(serde_yaml::from_str::<PortBinding>("\"5000:70000\"").is_err());
    }

    #[test]
    fn descriptor_round_trips_through_yaml() {
        let mut labels = BTreeMap::new();
        labels.insert(RUNTIME_LABEL.to_string(), "flashgames".to_string());
        labels.insert(REPLICA_LABEL.to_string(), "0".to_string());
        let mut services = BTreeMap::new();
        services.insert(
            "flashgames-0".to_string(),
            ServiceSpec {
                image: "quay.io/fleetenv/flashgames:0.20".to_string(),
                command: None,
                cap_add: vec!["SYS_ADMIN".to_string()],
                ipc: Some("host".to_string()),
                cpu_shares: 4,
                ports: vec![
                    PortBinding {
                        host: 5000,
                        container: 5899,
                    },
                    PortBinding {
                        host: 5001,
                        container: 5900,
                    },
                ],
                labels,
            },
        );
        let descriptor = Descriptor {
            version: DESCRIPTOR_VERSION.to_string(),
            services,
        };

        let rendered = serde_yaml::to_string(&descriptor).unwrap();
        let parsed: Descriptor = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(parsed, descriptor);
    }

    #[test]
    fn empty_optionals_are_omitted_from_the_document() {
        let mut services = BTreeMap::new();
        services.insert(
            "gym-core-0".to_string(),
            ServiceSpec {
                image: "quay.io/fleetenv/gym-core:0.20".to_string(),
                command: None,
                cap_add: vec![],
                ipc: None,
                cpu_shares: 1,
                ports: vec![],
                labels: BTreeMap::new(),
            },
        );
        let descriptor = Descriptor {
            version: DESCRIPTOR_VERSION.to_string(),
            services,
        };

        let rendered = serde_yaml::to_string(&descriptor).unwrap();
        assert!(!rendered.contains("cap_add"));
        assert!(!rendered.contains("ipc"));
        assert!(!rendered.contains("command"));
    }

    #[test]
    fn descriptor_path_is_derived_from_the_runtime_id() {
        let path = descriptor_path("flashgames");
        assert!(path.ends_with("flashgames/docker-compose.yml"));
    }
}
