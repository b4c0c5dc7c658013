//! System topology and scenario configuration with YAML support

use std::collections::BTreeSet;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::device_info::FlashloaderProtocol;
use crate::error::ConfigError;
use crate::estimator::EstimatorConfig;
use crate::package::{PackageFile, PemFile, UpdateInfo};
use crate::sequence::ScriptedOutcome;

/// Nodes taking part in an update run
///
/// Can be loaded from YAML, JSON, TOML, or constructed programmatically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Logical nodes in flash order
    pub nodes: Vec<NodeConfig>,

    /// Remaining time estimate settings
    #[serde(default)]
    pub estimator: EstimatorConfig,
}

/// One logical node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    /// Sub-nodes in sub-node index order
    pub sub_nodes: Vec<SubNodeConfig>,
}

/// One device of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubNodeConfig {
    /// System-wide node index
    pub node_index: u32,

    pub name: String,

    /// Flashloader of the device, `None` if it cannot be updated
    #[serde(default)]
    pub flashloader: Option<FlashloaderProtocol>,

    /// Take part in the run (default: true)
    #[serde(default = "default_active")]
    pub active: bool,

    /// Update package of the device
    #[serde(default)]
    pub package: UpdateInfo,
}

fn default_active() -> bool {
    true
}

impl SubNodeConfig {
    pub fn new(node_index: u32, name: impl Into<String>, flashloader: Option<FlashloaderProtocol>) -> Self {
        Self {
            node_index,
            name: name.into(),
            flashloader,
            active: default_active(),
            package: UpdateInfo::default(),
        }
    }

    pub fn with_file(mut self, file: PackageFile) -> Self {
        self.package.files.push(file);
        self
    }

    pub fn with_pem_file(mut self, pem_file: PemFile) -> Self {
        self.package.pem_file = Some(pem_file);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Serialization format, picked from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    /// Format of a path; anything unknown is read as YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => ConfigFormat::Json,
            Some("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Yaml,
        }
    }

    fn parse<T: DeserializeOwned>(&self, content: &str) -> Result<T, ConfigError> {
        match self {
            ConfigFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
            }
            ConfigFormat::Json => {
                serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
            }
            ConfigFormat::Toml => {
                toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
            }
        }
    }
}

fn read_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
    ConfigFormat::from_path(path).parse(&content)
}

impl TopologyConfig {
    /// Load a topology from a file, format chosen by extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = read_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a topology from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        ConfigFormat::Yaml.parse(yaml)
    }

    /// Parse a topology from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        ConfigFormat::Json.parse(json)
    }

    /// Parse a topology from a TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        ConfigFormat::Toml.parse(toml)
    }

    /// Serialize the topology to YAML
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Check structural rules: every node has sub-nodes and node indices are unique
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for node in &self.nodes {
            if node.sub_nodes.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "node '{}' has no sub-nodes",
                    node.name
                )));
            }
            for sub in &node.sub_nodes {
                if !seen.insert(sub.node_index) {
                    return Err(ConfigError::Invalid(format!(
                        "node index {} used more than once",
                        sub.node_index
                    )));
                }
            }
        }
        Ok(())
    }

    /// Create a builder for programmatic configuration
    pub fn builder() -> TopologyConfigBuilder {
        TopologyConfigBuilder::default()
    }
}

/// Builder for TopologyConfig
#[derive(Debug, Default)]
pub struct TopologyConfigBuilder {
    config: TopologyConfig,
}

impl TopologyConfigBuilder {
    /// Add a node made of several sub-nodes
    pub fn node(mut self, name: impl Into<String>, sub_nodes: Vec<SubNodeConfig>) -> Self {
        self.config.nodes.push(NodeConfig {
            name: name.into(),
            sub_nodes,
        });
        self
    }

    /// Add a node with a single device, named after it
    pub fn device(mut self, sub_node: SubNodeConfig) -> Self {
        self.config.nodes.push(NodeConfig {
            name: sub_node.name.clone(),
            sub_nodes: vec![sub_node],
        });
        self
    }

    pub fn estimator(mut self, estimator: EstimatorConfig) -> Self {
        self.config.estimator = estimator;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<TopologyConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Topology plus scripted device behaviour, as replayed by the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub topology: TopologyConfig,

    /// Per-device outcomes; devices not listed behave well
    #[serde(default)]
    pub outcomes: Vec<ScriptedOutcome>,
}

impl ScenarioConfig {
    /// Load a scenario from a file, format chosen by extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let scenario: Self = read_file(path.as_ref())?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        ConfigFormat::Yaml.parse(yaml)
    }

    /// Topology rules, and every outcome must address a configured device
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.topology.validate()?;
        let known: BTreeSet<u32> = self
            .topology
            .nodes
            .iter()
            .flat_map(|n| n.sub_nodes.iter().map(|s| s.node_index))
            .collect();
        if let Some(unknown) = self.outcomes.iter().find(|o| !known.contains(&o.node_index)) {
            return Err(ConfigError::Invalid(format!(
                "outcome for unknown node index {}",
                unknown.node_index
            )));
        }
        Ok(())
    }
}
