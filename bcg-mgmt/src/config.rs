//! Management node configuration, loaded from a TOML file

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Errors raised while loading or saving configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Settings shared by every kind of node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeSection {
    /// Port of the management API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Gossip port
    #[serde(default = "default_cluster_port")]
    pub cluster_port: u16,

    /// Unique node name; generated on first start when empty
    #[serde(default)]
    pub name: String,
}

/// Settings of the replicated store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MgmtSection {
    /// Port peers replicate the store through
    #[serde(default = "default_raft_port")]
    pub raft_port: u16,

    /// Directory for the consensus log and snapshots
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
}

/// Contents of `bcg-mgmt.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MgmtConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub mgmt: MgmtSection,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            cluster_port: default_cluster_port(),
            name: String::new(),
        }
    }
}

impl Default for MgmtSection {
    fn default() -> Self {
        Self {
            raft_port: default_raft_port(),
            storage_dir: default_storage_dir(),
        }
    }
}

impl MgmtConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml_string()?).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the file at `path`, giving the node a name if it has none.
    ///
    /// A generated name is written back so the node keeps its identity
    /// across restarts.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_toml_file(path)?;

        if config.node.name.trim().is_empty() {
            config.node.name = generate_node_name();
            info!(name = %config.node.name, path = %path.display(), "generated node name");
            config.write_to(path)?;
        }

        Ok(config)
    }
}

const ADJECTIVES: &[&str] = &[
    "amber", "brisk", "calm", "dusky", "eager", "fuzzy", "gentle", "hazy", "icy", "jolly",
    "keen", "lucky", "mellow", "nimble", "quiet", "rustic", "sunny", "tidy", "vivid", "witty",
];

const NOUNS: &[&str] = &[
    "badger", "cedar", "dune", "falcon", "glacier", "harbor", "island", "juniper", "kestrel",
    "lagoon", "maple", "otter", "pike", "quarry", "raven", "spruce", "trout", "walrus",
];

/// A readable, practically unique node name such as `mellow-otter-1f3a9c2e`
pub fn generate_node_name() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("quiet");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("otter");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", adjective, noun, &suffix[..8])
}

fn default_api_port() -> u16 {
    7070
}

fn default_cluster_port() -> u16 {
    7946
}

fn default_raft_port() -> u16 {
    7080
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./bcg-data")
}
