//! podling.toml configuration.
//!
//! Every section is optional; missing keys take the defaults below.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodlingConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub endpoints: EndpointsConfig,
    pub liveness: LivenessConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// Which state store implementation backs the control plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process maps; state is lost on restart.
    #[default]
    Memory,
    /// redb database file under `storage.path`.
    Redb,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
    /// Data directory for the redb backend.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            path: PathBuf::from("/var/lib/podling"),
        }
    }
}

impl StorageConfig {
    pub fn db_file(&self) -> PathBuf {
        self.path.join("podling.redb")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub cluster_cidr: String,
    pub sync_interval_secs: u64,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            cluster_cidr: "10.96.0.0/16".to_string(),
            sync_interval_secs: 10,
        }
    }
}

impl EndpointsConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub timeout_secs: u64,
    pub interval_secs: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 90,
            interval_secs: 30,
        }
    }
}

impl LivenessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Send scheduled workloads to their worker.
    pub enabled: bool,
    pub timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 10,
        }
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PodlingConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: PodlingConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the background loops cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.endpoints.sync_interval_secs == 0 {
            anyhow::bail!("endpoints.sync_interval_secs must be nonzero");
        }
        if self.liveness.interval_secs == 0 {
            anyhow::bail!("liveness.interval_secs must be nonzero");
        }
        if self.liveness.timeout_secs == 0 {
            anyhow::bail!("liveness.timeout_secs must be nonzero");
        }
        Ok(())
    }
}
